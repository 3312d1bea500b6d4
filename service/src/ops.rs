//! Transport-agnostic operations facade.
//!
//! Everything an RPC layer would expose lives here as typed methods on
//! [`SentinelService`]: asset CRUD, catalog upload, screening dispatch and
//! status, conjunction queries, on-demand Monte Carlo, maneuver planning and
//! alert handling. Domain errors stay classified (not-found vs bad input vs
//! internal) so a thin handler can map them to status codes.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use conjunction_assessment::{
    compute_avoidance_maneuvers, run_monte_carlo, covariance_ric_to_eci, default_covariance_ric,
    estimate_hard_body_radius, maneuver::DEFAULT_TARGET_PC, ManeuverRequest, MonteCarloResult,
    ObjectType,
};
use orbital_mechanics::tle::{parse_element_set, ElementSet};
use orbital_mechanics::{CatalogSnapshot, Propagator};

use crate::jobs::{CatalogHandle, ScreeningSupervisor};
use crate::store::{
    AlertConfigRecord, AlertRecord, AlertStatus, AssetPatch, AssetRecord, EventFilter,
    EventRecord, EventStore, JobRecord, ManeuverOptionRecord, NewAsset, StoreError,
};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what.to_string()),
            StoreError::Conflict(msg) => Self::InvalidInput(msg),
            StoreError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Inputs for registering a protected asset: an existing catalog id, or an
/// explicit canonical line pair (which is also merged into the snapshot).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddAssetRequest {
    pub catalog_number: Option<u32>,
    pub name: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub mass_kg: Option<f64>,
    pub cross_section_m2: Option<f64>,
    pub hard_body_radius_m: Option<f64>,
    pub maneuverable: bool,
    pub delta_v_budget_ms: Option<f64>,
}

/// Current propagated position attached to asset reads.
#[derive(Debug, Clone, Serialize)]
pub struct AssetPosition {
    pub timestamp: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub speed_km_s: f64,
    pub in_shadow: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetDetail {
    pub asset: AssetRecord,
    pub position: Option<AssetPosition>,
}

/// Six one-sigma values stored with an event, meters.
#[derive(Debug, Clone, Serialize)]
pub struct UncertaintyBlock {
    pub primary_sigma_radial_m: Option<f64>,
    pub primary_sigma_in_track_m: Option<f64>,
    pub primary_sigma_cross_track_m: Option<f64>,
    pub secondary_sigma_radial_m: Option<f64>,
    pub secondary_sigma_in_track_m: Option<f64>,
    pub secondary_sigma_cross_track_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConjunctionDetail {
    pub event: EventRecord,
    pub maneuver_options: Vec<ManeuverOptionRecord>,
    pub uncertainty: UncertaintyBlock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfigUpdate {
    pub asset_id: Option<i64>,
    pub critical_threshold: f64,
    pub high_threshold: f64,
    pub moderate_threshold: f64,
    pub min_distance_km: Option<f64>,
    pub enabled: bool,
}

/// The service facade owning the store, the catalog handle and the job
/// supervisor.
pub struct SentinelService {
    store: Arc<EventStore>,
    catalog: CatalogHandle,
    supervisor: ScreeningSupervisor,
}

impl SentinelService {
    pub fn new(store: EventStore, pool_size: usize) -> Self {
        let store = Arc::new(store);
        let catalog: CatalogHandle = Arc::new(RwLock::new(Arc::new(CatalogSnapshot::new())));
        let supervisor = ScreeningSupervisor::new(store.clone(), catalog.clone(), pool_size);
        Self {
            store,
            catalog,
            supervisor,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    // ---- Catalog ----

    /// Merge a TLE text block into the catalog. Builds a new snapshot and
    /// swaps it in; running screens keep the handle they captured.
    pub fn load_catalog_text(&self, text: &str) -> usize {
        let mut next = self.snapshot().as_ref().clone();
        let merged = next.merge_text(text);
        self.swap_snapshot(next);
        merged
    }

    pub fn catalog_len(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.catalog
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap_snapshot(&self, next: CatalogSnapshot) {
        let mut guard = self
            .catalog
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(next);
    }

    // ---- Assets ----

    pub fn add_asset(&self, req: &AddAssetRequest) -> ServiceResult<AssetRecord> {
        let element_set = self.resolve_element_set_for_add(req)?;

        let orbit_type = Propagator::new(&element_set)
            .and_then(|prop| prop.orbital_elements(element_set.epoch))
            .map(|el| el.orbit_class.to_string())
            .ok();

        let record = self.store.insert_asset(&NewAsset {
            norad_id: element_set.catalog_number,
            name: req.name.clone().unwrap_or_else(|| element_set.name.clone()),
            tle_line1: element_set.line1.clone(),
            tle_line2: element_set.line2.clone(),
            tle_epoch: Some(element_set.epoch),
            mass_kg: req.mass_kg,
            cross_section_m2: req.cross_section_m2,
            hard_body_radius_m: req.hard_body_radius_m.unwrap_or(1.0),
            maneuverable: req.maneuverable,
            delta_v_budget_ms: req.delta_v_budget_ms,
            orbit_type,
        })?;

        tracing::info!(asset_id = record.id, norad_id = record.norad_id, "asset registered");
        Ok(record)
    }

    fn resolve_element_set_for_add(&self, req: &AddAssetRequest) -> ServiceResult<ElementSet> {
        if let (Some(line1), Some(line2)) = (&req.line1, &req.line2) {
            let name = req.name.as_deref().unwrap_or("");
            let set = parse_element_set(name, line1, line2)
                .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
            // Explicit uploads also refresh the snapshot.
            let mut next = self.snapshot().as_ref().clone();
            next.insert(set.clone());
            self.swap_snapshot(next);
            return Ok(set);
        }

        let catalog_number = req.catalog_number.ok_or_else(|| {
            ServiceError::InvalidInput(
                "either a catalog id or an explicit line pair is required".into(),
            )
        })?;
        self.snapshot()
            .get(catalog_number)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("catalog object {catalog_number}")))
    }

    pub fn list_assets(&self) -> ServiceResult<Vec<AssetRecord>> {
        Ok(self.store.list_assets()?)
    }

    pub fn get_asset(&self, asset_id: i64) -> ServiceResult<AssetDetail> {
        let asset = self
            .store
            .get_asset(asset_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("asset {asset_id}")))?;
        let position = self.current_position(&asset);
        Ok(AssetDetail { asset, position })
    }

    fn current_position(&self, asset: &AssetRecord) -> Option<AssetPosition> {
        let set = self.canonical_element_set(asset).ok()?;
        let sample = Propagator::new(&set).ok()?.propagate(Utc::now()).ok()?;
        Some(AssetPosition {
            timestamp: sample.datetime_utc,
            latitude_deg: sample.latitude_deg,
            longitude_deg: sample.longitude_deg,
            altitude_km: sample.altitude_km,
            speed_km_s: sample.speed_km_s,
            in_shadow: sample.in_shadow,
        })
    }

    /// Catalog set when present (fresher), else the lines stored with the
    /// asset row.
    fn canonical_element_set(&self, asset: &AssetRecord) -> ServiceResult<ElementSet> {
        if let Some(set) = self.snapshot().get(asset.norad_id) {
            return Ok(set.clone());
        }
        parse_element_set(&asset.name, &asset.tle_line1, &asset.tle_line2)
            .map_err(|e| ServiceError::Internal(format!("stored element set unusable: {e}")))
    }

    pub fn update_asset_properties(
        &self,
        asset_id: i64,
        patch: &AssetPatch,
    ) -> ServiceResult<AssetRecord> {
        self.store
            .update_asset(asset_id, patch)?
            .ok_or_else(|| ServiceError::NotFound(format!("asset {asset_id}")))
    }

    pub fn delete_asset(&self, asset_id: i64) -> ServiceResult<()> {
        if self.store.delete_asset(asset_id)? {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!("asset {asset_id}")))
        }
    }

    // ---- Screening ----

    pub async fn run_screening(
        &self,
        asset_ids: &[i64],
        window_days: f64,
        threshold_km: f64,
    ) -> ServiceResult<Vec<i64>> {
        if window_days <= 0.0 {
            return Err(ServiceError::InvalidInput(
                "time window must be positive".into(),
            ));
        }
        if threshold_km <= 0.0 {
            return Err(ServiceError::InvalidInput(
                "distance threshold must be positive".into(),
            ));
        }
        let jobs = self
            .supervisor
            .run_screening(asset_ids, window_days, threshold_km)
            .await?;
        if jobs.is_empty() {
            return Err(ServiceError::InvalidInput("no assets to screen".into()));
        }
        Ok(jobs)
    }

    pub fn job_status(&self, job_id: i64) -> ServiceResult<JobRecord> {
        self.store
            .get_job(job_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("screening job {job_id}")))
    }

    pub fn job_results(&self, job_id: i64) -> ServiceResult<Vec<EventRecord>> {
        self.job_status(job_id)?;
        Ok(self.store.events_for_job(job_id)?)
    }

    // ---- Conjunctions ----

    pub fn list_conjunctions(&self, filter: &EventFilter) -> ServiceResult<Vec<EventRecord>> {
        Ok(self.store.list_events(filter)?)
    }

    pub fn conjunction_detail(&self, event_id: i64) -> ServiceResult<ConjunctionDetail> {
        let event = self.get_event(event_id)?;
        let maneuver_options = self.store.maneuver_options_for_event(event_id)?;
        let uncertainty = UncertaintyBlock {
            primary_sigma_radial_m: event.primary_sigma_radial_m,
            primary_sigma_in_track_m: event.primary_sigma_in_track_m,
            primary_sigma_cross_track_m: event.primary_sigma_cross_track_m,
            secondary_sigma_radial_m: event.secondary_sigma_radial_m,
            secondary_sigma_in_track_m: event.secondary_sigma_in_track_m,
            secondary_sigma_cross_track_m: event.secondary_sigma_cross_track_m,
        };
        Ok(ConjunctionDetail {
            event,
            maneuver_options,
            uncertainty,
        })
    }

    fn get_event(&self, event_id: i64) -> ServiceResult<EventRecord> {
        self.store
            .get_event(event_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("conjunction {event_id}")))
    }

    /// Re-derive the encounter geometry for a stored event and run the
    /// sampling cross-check. `seed` makes the draw reproducible.
    pub fn monte_carlo(
        &self,
        event_id: i64,
        n_samples: usize,
        seed: Option<u64>,
    ) -> ServiceResult<MonteCarloResult> {
        let event = self.get_event(event_id)?;
        let (asset, primary_set, secondary_set) = self.event_element_sets(&event)?;

        let primary = Propagator::new(&primary_set)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let secondary = Propagator::new(&secondary_set)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let jd = orbital_mechanics::time::datetime_to_jd(event.tca);
        let (r1, v1) = primary
            .propagate_jd(&jd)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let (r2, v2) = secondary
            .propagate_jd(&jd)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let cov1 = covariance_ric_to_eci(
            &default_covariance_ric(primary_set.age_hours(event.tca), ObjectType::Payload),
            &r1,
            &v1,
        );
        let cov2 = covariance_ric_to_eci(
            &default_covariance_ric(secondary_set.age_hours(event.tca), ObjectType::Unknown),
            &r2,
            &v2,
        );

        Ok(run_monte_carlo(
            &r1,
            &r2,
            &cov1,
            &cov2,
            asset.hard_body_radius_m,
            estimate_hard_body_radius(None, ObjectType::Unknown),
            n_samples,
            seed,
        ))
    }

    /// Plan avoidance maneuvers for an event and persist the options.
    pub fn compute_maneuvers(
        &self,
        event_id: i64,
        target_pc: Option<f64>,
    ) -> ServiceResult<Vec<ManeuverOptionRecord>> {
        let target_pc = target_pc.unwrap_or(DEFAULT_TARGET_PC);
        if !(0.0..1.0).contains(&target_pc) || target_pc <= 0.0 {
            return Err(ServiceError::InvalidInput(
                "target Pc must be in (0, 1)".into(),
            ));
        }

        let event = self.get_event(event_id)?;
        let (asset, primary_set, secondary_set) = self.event_element_sets(&event)?;

        let options = compute_avoidance_maneuvers(&ManeuverRequest {
            asset: &primary_set,
            secondary: &secondary_set,
            tca: event.tca,
            current_miss_m: event.miss_distance_m,
            current_pc: event.collision_probability.unwrap_or(0.0),
            asset_radius_m: asset.hard_body_radius_m,
            delta_v_budget_ms: asset.delta_v_budget_ms,
            target_pc,
            now: Utc::now(),
        })
        .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(self.store.replace_maneuver_options(event_id, &options)?)
    }

    fn event_element_sets(
        &self,
        event: &EventRecord,
    ) -> ServiceResult<(AssetRecord, ElementSet, ElementSet)> {
        let asset = self
            .store
            .get_asset(event.primary_asset_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("asset {}", event.primary_asset_id)))?;
        let primary_set = self.canonical_element_set(&asset)?;
        let secondary_set = self
            .snapshot()
            .get(event.secondary_norad_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "catalog object {} (secondary no longer in snapshot)",
                    event.secondary_norad_id
                ))
            })?;
        Ok((asset, primary_set, secondary_set))
    }

    // ---- Alerts ----

    pub fn list_alerts(
        &self,
        asset_id: Option<i64>,
        status: Option<AlertStatus>,
    ) -> ServiceResult<Vec<AlertRecord>> {
        Ok(self.store.list_alerts(asset_id, status)?)
    }

    pub fn acknowledge_alert(&self, alert_id: i64) -> ServiceResult<AlertRecord> {
        self.set_alert_status(alert_id, AlertStatus::Acknowledged)
    }

    pub fn set_alert_status(
        &self,
        alert_id: i64,
        status: AlertStatus,
    ) -> ServiceResult<AlertRecord> {
        if !self.store.update_alert_status(alert_id, status)? {
            return Err(ServiceError::NotFound(format!("alert {alert_id}")));
        }
        self.store
            .get_alert(alert_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("alert {alert_id}")))
    }

    pub fn configure_alerts(&self, update: &AlertConfigUpdate) -> ServiceResult<AlertConfigRecord> {
        if update.critical_threshold <= update.high_threshold
            || update.high_threshold <= update.moderate_threshold
        {
            return Err(ServiceError::InvalidInput(
                "thresholds must be ordered critical > high > moderate".into(),
            ));
        }
        if let Some(asset_id) = update.asset_id {
            if self.store.get_asset(asset_id)?.is_none() {
                return Err(ServiceError::NotFound(format!("asset {asset_id}")));
            }
        }
        Ok(self.store.upsert_alert_config(
            update.asset_id,
            update.critical_threshold,
            update.high_threshold,
            update.moderate_threshold,
            update.min_distance_km,
            update.enabled,
        )?)
    }
}
