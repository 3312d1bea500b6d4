//! Alert generation.
//!
//! Runs after each screening job commits its events. Notification thresholds
//! come from the resolved alert configuration (per-asset, else global, else
//! defaults); escalation tier comparisons use the built-in classifier ladder
//! so tuning notify thresholds cannot reshuffle recorded tiers.

use std::collections::HashMap;

use conjunction_assessment::ThreatLevel;

use crate::store::{AlertRecord, EventRecord, EventStore, NewAlert, StoreResult};

pub const DEFAULT_CRITICAL_THRESHOLD: f64 = 1e-3;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 1e-4;
pub const DEFAULT_MODERATE_THRESHOLD: f64 = 1e-5;

/// Effective notification thresholds for one asset.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedThresholds {
    pub critical: f64,
    pub high: f64,
    pub moderate: f64,
    pub enabled: bool,
}

impl Default for ResolvedThresholds {
    fn default() -> Self {
        Self {
            critical: DEFAULT_CRITICAL_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
            moderate: DEFAULT_MODERATE_THRESHOLD,
            enabled: true,
        }
    }
}

/// Per-asset config if present, else global, else defaults.
pub fn resolve_thresholds(store: &EventStore, asset_id: i64) -> StoreResult<ResolvedThresholds> {
    Ok(match store.resolve_alert_config(asset_id)? {
        Some(config) => ResolvedThresholds {
            critical: config.critical_threshold,
            high: config.high_threshold,
            moderate: config.moderate_threshold,
            enabled: config.enabled,
        },
        None => ResolvedThresholds::default(),
    })
}

/// Generate NEW alerts for freshly inserted events: CRITICAL above the
/// critical threshold, HIGH above the high threshold, nothing below.
pub fn check_and_generate_alerts(
    store: &EventStore,
    events: &[EventRecord],
    asset_id: i64,
    thresholds: &ResolvedThresholds,
) -> StoreResult<Vec<AlertRecord>> {
    if !thresholds.enabled {
        return Ok(Vec::new());
    }

    let mut generated = Vec::new();
    for event in events {
        let Some(pc) = event.collision_probability else {
            continue;
        };

        let (level, reason) = if pc > thresholds.critical {
            (ThreatLevel::Critical, "new_critical")
        } else if pc > thresholds.high {
            (ThreatLevel::High, "new_high")
        } else {
            continue;
        };

        let alert = store.insert_alert(&NewAlert {
            asset_id: Some(asset_id),
            conjunction_id: Some(event.id),
            threat_level: level,
            message: format!(
                "{}: Conjunction with {} at TCA {} - Pc={:.2e}, Miss={:.0}m",
                level.as_str(),
                secondary_label(event),
                event.tca.format("%Y-%m-%d %H:%M UTC"),
                pc,
                event.miss_distance_m,
            ),
            reason: reason.to_string(),
        })?;
        generated.push(alert);
    }

    if !generated.is_empty() {
        tracing::info!(asset_id, alerts = generated.len(), "alerts generated");
    }
    Ok(generated)
}

/// Emit escalation alerts for pairs whose classified tier strictly rose
/// since the previous screening of the same primary.
pub fn check_escalations(
    store: &EventStore,
    prior_pc: &HashMap<u32, f64>,
    events: &[EventRecord],
    asset_id: i64,
) -> StoreResult<Vec<AlertRecord>> {
    let mut generated = Vec::new();
    for event in events {
        let Some(pc) = event.collision_probability else {
            continue;
        };
        let Some(&old_pc) = prior_pc.get(&event.secondary_norad_id) else {
            continue;
        };

        let old_level = ThreatLevel::classify(old_pc);
        let new_level = ThreatLevel::classify(pc);
        if new_level <= old_level {
            continue;
        }

        let alert = store.insert_alert(&NewAlert {
            asset_id: Some(asset_id),
            conjunction_id: Some(event.id),
            threat_level: new_level,
            message: format!(
                "ESCALATION: {} threat increased from {} to {} (Pc: {:.2e} -> {:.2e})",
                secondary_label(event),
                old_level.as_str(),
                new_level.as_str(),
                old_pc,
                pc,
            ),
            reason: "escalation".to_string(),
        })?;
        generated.push(alert);
    }
    Ok(generated)
}

fn secondary_label(event: &EventRecord) -> String {
    event
        .secondary_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("NORAD {}", event.secondary_norad_id))
}
