//! Screening-job supervisor.
//!
//! One background worker per job, drawn from a bounded pool. Workers are
//! CPU-bound (batched SGP4) and run under `spawn_blocking`; the catalog
//! snapshot handle is cloned at worker start so a concurrent upload cannot
//! skew a running screen. Any worker error surfaces as a FAILED job row, and
//! event writes commit in one transaction so status readers never observe
//! partial output.

use std::sync::{Arc, RwLock};
use std::time::{Duration as StdDuration, Instant};

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use tokio::sync::Semaphore;

use conjunction_assessment::{screen_asset, ScreeningConfig};
use orbital_mechanics::tle::parse_element_set;
use orbital_mechanics::CatalogSnapshot;

use crate::alerts::{check_and_generate_alerts, check_escalations, resolve_thresholds};
use crate::store::{EventStore, JobRecord, StoreError, StoreResult};

/// Minimum progress delta written through to the job row.
const PROGRESS_WRITE_DELTA: f64 = 0.01;

/// Progress writes are also allowed through on this wall-clock cadence.
const PROGRESS_WRITE_INTERVAL: StdDuration = StdDuration::from_millis(250);

/// Shared handle to the current catalog snapshot. Writers swap the inner
/// `Arc`; readers clone it.
pub type CatalogHandle = Arc<RwLock<Arc<CatalogSnapshot>>>;

pub struct ScreeningSupervisor {
    store: Arc<EventStore>,
    catalog: CatalogHandle,
    pool: Arc<Semaphore>,
}

impl ScreeningSupervisor {
    pub fn new(store: Arc<EventStore>, catalog: CatalogHandle, pool_size: usize) -> Self {
        Self {
            store,
            catalog,
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    /// Persist one PENDING job per asset and dispatch background workers.
    /// Unknown asset ids are skipped. Returns the created job ids.
    pub async fn run_screening(
        &self,
        asset_ids: &[i64],
        window_days: f64,
        threshold_km: f64,
    ) -> StoreResult<Vec<i64>> {
        let targets: Vec<i64> = if asset_ids.is_empty() {
            self.store.list_assets()?.iter().map(|a| a.id).collect()
        } else {
            asset_ids.to_vec()
        };

        let mut job_ids = Vec::with_capacity(targets.len());
        for asset_id in targets {
            if self.store.get_asset(asset_id)?.is_none() {
                tracing::warn!(asset_id, "skipping screening for unknown asset");
                continue;
            }
            let job = self.store.create_job(asset_id, window_days, threshold_km)?;
            tracing::info!(job_id = job.id, asset_id, "screening job queued");
            self.dispatch(job.id);
            job_ids.push(job.id);
        }
        Ok(job_ids)
    }

    fn dispatch(&self, job_id: i64) {
        let store = self.store.clone();
        let catalog = self.catalog.clone();
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // pool closed at shutdown
            };

            let worker_store = store.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let snapshot = catalog
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                run_screening_job(&worker_store, snapshot, job_id)
            })
            .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(join_error) => Some(format!("screening worker panicked: {join_error}")),
            };
            if let Some(reason) = failure {
                tracing::error!(job_id, "screening job failed: {reason}");
                if let Err(e) = store.mark_job_failed(job_id, &reason) {
                    tracing::error!(job_id, "could not record job failure: {e}");
                }
            }
        });
    }
}

/// The worker body. Every error return is converted to a FAILED row by the
/// dispatch wrapper; the event insert is transactional, so a failure after
/// screening leaves no partial output behind.
fn run_screening_job(
    store: &EventStore,
    catalog: Arc<CatalogSnapshot>,
    job_id: i64,
) -> anyhow::Result<()> {
    let job = store
        .get_job(job_id)?
        .with_context(|| format!("job {job_id} disappeared"))?;
    let asset_id = job.asset_id.context("job has no asset")?;
    let asset = store
        .get_asset(asset_id)?
        .with_context(|| format!("asset {asset_id} disappeared"))?;

    store.mark_job_running(job_id, catalog.len())?;

    // Canonical element set: prefer the (fresher) catalog snapshot over the
    // lines stored with the asset.
    let element_set = match catalog.get(asset.norad_id) {
        Some(set) => set.clone(),
        None => parse_element_set(&asset.name, &asset.tle_line1, &asset.tle_line2)
            .map_err(|e| anyhow!("failed to parse asset element set: {e}"))?,
    };

    let screenable = catalog.len() - usize::from(catalog.get(asset.norad_id).is_some());
    if screenable == 0 {
        bail!("empty catalog - upload element sets before screening");
    }

    tracing::info!(
        job_id,
        asset = %asset.name,
        norad_id = asset.norad_id,
        catalog_size = catalog.len(),
        "screening job running"
    );

    let mut last_written = -1.0f64;
    let mut last_write_at = Instant::now();
    let progress = |pct: f64, candidates: usize, conjunctions: usize| {
        let now = Instant::now();
        let due = pct >= 1.0
            || pct - last_written >= PROGRESS_WRITE_DELTA
            || now.duration_since(last_write_at) >= PROGRESS_WRITE_INTERVAL;
        if !due {
            return;
        }
        last_written = pct;
        last_write_at = now;
        if let Err(e) = store.update_job_progress(job_id, pct, candidates, conjunctions) {
            tracing::warn!(job_id, "progress write failed: {e}");
        }
    };

    let config = ScreeningConfig {
        time_window_days: job.time_window_days,
        distance_threshold_km: job.distance_threshold_km,
        asset_radius_m: asset.hard_body_radius_m,
    };
    let result = screen_asset(&element_set, &catalog, Utc::now(), &config, progress);

    // Prior Pc per pair is read before this job's events land, then the
    // whole batch commits at once.
    let prior = store.latest_pc_for_pairs(asset_id, job_id)?;
    store.insert_events_for_job(job_id, asset_id, &result.conjunctions)?;
    let events = store.events_for_job(job_id)?;

    let thresholds = resolve_thresholds(store, asset_id)?;
    check_and_generate_alerts(store, &events, asset_id, &thresholds)?;
    check_escalations(store, &prior, &events, asset_id)?;

    let note = if !result.conjunctions.is_empty() {
        None
    } else if let Some(note) = result.note {
        Some(note)
    } else if result.closest_miss_km.is_finite() {
        Some(format!(
            "Closest approach: {:.1} km ({}) - all above {} km threshold",
            result.closest_miss_km, result.closest_miss_object, job.distance_threshold_km
        ))
    } else {
        Some("no candidates within the screening envelope".to_string())
    };
    store.mark_job_completed(job_id, result.conjunctions.len(), note.as_deref())?;

    tracing::info!(
        job_id,
        conjunctions = result.conjunctions.len(),
        closest_miss_km = result.closest_miss_km,
        "screening job complete"
    );
    Ok(())
}

/// Poll a job until it reaches a terminal state or the timeout expires.
/// Returns the last observed row either way.
pub async fn wait_for_job(
    store: &EventStore,
    job_id: i64,
    timeout: StdDuration,
) -> StoreResult<JobRecord> {
    let deadline = Instant::now() + timeout;
    loop {
        let job = store.get_job(job_id)?.ok_or(StoreError::NotFound("screening job"))?;
        if job.status.is_terminal() || Instant::now() >= deadline {
            return Ok(job);
        }
        tokio::time::sleep(StdDuration::from_millis(50)).await;
    }
}
