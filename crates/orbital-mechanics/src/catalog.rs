//! In-memory catalog snapshot.
//!
//! A snapshot maps catalog id to [`ElementSet`] and is treated as immutable
//! for the duration of a screening run: screeners receive a shared handle and
//! uploads replace the whole snapshot, never mutate it in place.

use std::collections::HashMap;

use crate::tle::{parse_tle_text, ElementSet};

#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    objects: HashMap<u32, ElementSet>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_element_sets(sets: impl IntoIterator<Item = ElementSet>) -> Self {
        let mut snapshot = Self::new();
        for set in sets {
            snapshot.insert(set);
        }
        snapshot
    }

    /// Insert an element set, replacing any previous set with the same
    /// catalog id.
    pub fn insert(&mut self, set: ElementSet) {
        self.objects.insert(set.catalog_number, set);
    }

    pub fn get(&self, catalog_number: u32) -> Option<&ElementSet> {
        self.objects.get(&catalog_number)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> impl Iterator<Item = &ElementSet> {
        self.objects.values()
    }

    /// Parse a TLE text block and upsert every set it contains. Returns the
    /// number of sets merged.
    pub fn merge_text(&mut self, text: &str) -> usize {
        let sets = parse_tle_text(text);
        let count = sets.len();
        for set in sets {
            self.insert(set);
        }
        tracing::debug!(merged = count, total = self.len(), "catalog snapshot updated");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS_L1: &str = "1 25544U 98067A   20194.88612269 -.00002218  00000-0 -31515-4 0  9992";
    const ISS_L2: &str = "2 25544  51.6461 221.2784 0001413  89.1723 280.4612 15.49507896236008";

    #[test]
    fn merge_deduplicates_by_catalog_id() {
        let mut snapshot = CatalogSnapshot::new();
        let text = format!("A\n{ISS_L1}\n{ISS_L2}\nB\n{ISS_L1}\n{ISS_L2}\n");
        let merged = snapshot.merge_text(&text);
        assert_eq!(merged, 2);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(25544).unwrap().name, "B");
        assert!(snapshot.get(1).is_none());
    }
}
