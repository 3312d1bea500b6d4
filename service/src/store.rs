//! Persistent event store.
//!
//! A single SQLite database holds assets, screening jobs, conjunction
//! events, maneuver options, alerts and alert configuration. WAL journal
//! mode with foreign keys on; ownership is expressed through cascading
//! foreign keys (asset -> events -> options, asset -> alerts). Readers poll
//! job rows concurrently with worker writes, so the connection sits behind a
//! mutex and every event batch for a job commits in one transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use conjunction_assessment::{ConjunctionCandidate, ManeuverOption, ThreatLevel};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---- Row types ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Active,
    Acknowledged,
    Mitigated,
    Resolved,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::Mitigated => "MITIGATED",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ACKNOWLEDGED" => Self::Acknowledged,
            "MITIGATED" => Self::Mitigated,
            "RESOLVED" => Self::Resolved,
            _ => Self::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    New,
    Acknowledged,
    ActionTaken,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::ActionTaken => "ACTION_TAKEN",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ACKNOWLEDGED" => Self::Acknowledged,
            "ACTION_TAKEN" => Self::ActionTaken,
            "RESOLVED" => Self::Resolved,
            _ => Self::New,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    pub norad_id: u32,
    pub name: String,
    pub tle_line1: String,
    pub tle_line2: String,
    pub tle_epoch: Option<DateTime<Utc>>,
    pub mass_kg: Option<f64>,
    pub cross_section_m2: Option<f64>,
    pub hard_body_radius_m: f64,
    pub maneuverable: bool,
    pub delta_v_budget_ms: Option<f64>,
    pub orbit_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub norad_id: u32,
    pub name: String,
    pub tle_line1: String,
    pub tle_line2: String,
    pub tle_epoch: Option<DateTime<Utc>>,
    pub mass_kg: Option<f64>,
    pub cross_section_m2: Option<f64>,
    pub hard_body_radius_m: f64,
    pub maneuverable: bool,
    pub delta_v_budget_ms: Option<f64>,
    pub orbit_type: Option<String>,
}

/// Partial update; `None` leaves a field unchanged. The budget is doubly
/// optional so it can be cleared back to unlimited.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetPatch {
    pub name: Option<String>,
    pub mass_kg: Option<f64>,
    pub cross_section_m2: Option<f64>,
    pub hard_body_radius_m: Option<f64>,
    pub maneuverable: Option<bool>,
    pub delta_v_budget_ms: Option<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub asset_id: Option<i64>,
    pub status: JobStatus,
    pub progress: f64,
    pub total_objects: i64,
    pub candidates_found: i64,
    pub conjunctions_found: i64,
    pub time_window_days: f64,
    pub distance_threshold_km: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub result_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub primary_asset_id: i64,
    pub secondary_norad_id: u32,
    pub secondary_name: Option<String>,
    pub tca: DateTime<Utc>,
    pub miss_distance_m: f64,
    pub radial_m: Option<f64>,
    pub in_track_m: Option<f64>,
    pub cross_track_m: Option<f64>,
    pub relative_velocity_kms: Option<f64>,
    pub collision_probability: Option<f64>,
    pub combined_hard_body_radius_m: Option<f64>,
    pub threat_level: ThreatLevel,
    pub primary_sigma_radial_m: Option<f64>,
    pub primary_sigma_in_track_m: Option<f64>,
    pub primary_sigma_cross_track_m: Option<f64>,
    pub secondary_sigma_radial_m: Option<f64>,
    pub secondary_sigma_in_track_m: Option<f64>,
    pub secondary_sigma_cross_track_m: Option<f64>,
    pub status: EventStatus,
    pub screening_job_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub asset_id: Option<i64>,
    pub threat_level: Option<ThreatLevel>,
    pub status: Option<EventStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManeuverOptionRecord {
    pub id: i64,
    pub conjunction_id: i64,
    pub label: String,
    pub direction: String,
    pub delta_v_ms: f64,
    pub timing_before_tca_orbits: f64,
    pub burn_time: Option<DateTime<Utc>>,
    pub new_miss_distance_m: Option<f64>,
    pub new_collision_probability: Option<f64>,
    pub fuel_cost_pct: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub asset_id: Option<i64>,
    pub conjunction_id: Option<i64>,
    pub threat_level: ThreatLevel,
    pub message: String,
    pub reason: Option<String>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub asset_id: Option<i64>,
    pub conjunction_id: Option<i64>,
    pub threat_level: ThreatLevel,
    pub message: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfigRecord {
    pub id: i64,
    /// `None` marks the single global configuration row.
    pub asset_id: Option<i64>,
    pub critical_threshold: f64,
    pub high_threshold: f64,
    pub moderate_threshold: f64,
    pub min_distance_km: Option<f64>,
    pub enabled: bool,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    norad_id INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL,
    tle_line1 TEXT NOT NULL,
    tle_line2 TEXT NOT NULL,
    tle_epoch TEXT,
    mass_kg REAL,
    cross_section_m2 REAL,
    hard_body_radius_m REAL NOT NULL DEFAULT 1.0,
    maneuverable INTEGER NOT NULL DEFAULT 0,
    delta_v_budget_ms REAL,
    orbit_type TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS screening_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_id INTEGER REFERENCES assets(id) ON DELETE SET NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    progress REAL NOT NULL DEFAULT 0.0,
    total_objects INTEGER NOT NULL DEFAULT 0,
    candidates_found INTEGER NOT NULL DEFAULT 0,
    conjunctions_found INTEGER NOT NULL DEFAULT 0,
    time_window_days REAL NOT NULL,
    distance_threshold_km REAL NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    result_note TEXT
);

CREATE TABLE IF NOT EXISTS conjunction_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    primary_asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
    secondary_norad_id INTEGER NOT NULL,
    secondary_name TEXT,
    tca TEXT NOT NULL,
    miss_distance_m REAL NOT NULL,
    radial_m REAL,
    in_track_m REAL,
    cross_track_m REAL,
    relative_velocity_kms REAL,
    collision_probability REAL,
    combined_hard_body_radius_m REAL,
    threat_level TEXT NOT NULL DEFAULT 'NONE',
    primary_sigma_radial_m REAL,
    primary_sigma_in_track_m REAL,
    primary_sigma_cross_track_m REAL,
    secondary_sigma_radial_m REAL,
    secondary_sigma_in_track_m REAL,
    secondary_sigma_cross_track_m REAL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    screening_job_id INTEGER REFERENCES screening_jobs(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_asset ON conjunction_events(primary_asset_id);
CREATE INDEX IF NOT EXISTS idx_events_job ON conjunction_events(screening_job_id);
CREATE INDEX IF NOT EXISTS idx_events_secondary ON conjunction_events(secondary_norad_id);

CREATE TABLE IF NOT EXISTS maneuver_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conjunction_id INTEGER NOT NULL REFERENCES conjunction_events(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    direction TEXT NOT NULL,
    delta_v_ms REAL NOT NULL,
    timing_before_tca_orbits REAL NOT NULL,
    burn_time TEXT,
    new_miss_distance_m REAL,
    new_collision_probability REAL,
    fuel_cost_pct REAL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_id INTEGER REFERENCES assets(id) ON DELETE CASCADE,
    conjunction_id INTEGER REFERENCES conjunction_events(id) ON DELETE CASCADE,
    threat_level TEXT NOT NULL,
    message TEXT NOT NULL,
    reason TEXT,
    status TEXT NOT NULL DEFAULT 'NEW',
    created_at TEXT NOT NULL,
    acknowledged_at TEXT
);

CREATE TABLE IF NOT EXISTS alert_configs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_id INTEGER UNIQUE REFERENCES assets(id) ON DELETE CASCADE,
    critical_threshold REAL NOT NULL DEFAULT 1e-3,
    high_threshold REAL NOT NULL DEFAULT 1e-4,
    moderate_threshold REAL NOT NULL DEFAULT 1e-5,
    min_distance_km REAL,
    enabled INTEGER NOT NULL DEFAULT 1
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_alert_configs_global
    ON alert_configs(ifnull(asset_id, -1)) WHERE asset_id IS NULL;
"#;

/// The SQLite-backed event store. All access goes through one mutex-guarded
/// connection; event batches commit transactionally per job.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        // journal_mode returns a result row, so it cannot go through
        // execute_batch.
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        Self::init(conn)
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- Assets ----

    pub fn insert_asset(&self, asset: &NewAsset) -> StoreResult<AssetRecord> {
        let now = Utc::now();
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO assets (norad_id, name, tle_line1, tle_line2, tle_epoch, mass_kg,
                 cross_section_m2, hard_body_radius_m, maneuverable, delta_v_budget_ms,
                 orbit_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                asset.norad_id,
                asset.name,
                asset.tle_line1,
                asset.tle_line2,
                asset.tle_epoch,
                asset.mass_kg,
                asset.cross_section_m2,
                asset.hard_body_radius_m,
                asset.maneuverable,
                asset.delta_v_budget_ms,
                asset.orbit_type,
                now,
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::Conflict(format!(
                    "asset with catalog id {} already exists",
                    asset.norad_id
                )));
            }
            Err(e) => return Err(e.into()),
        }
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_asset(id)?.ok_or(StoreError::NotFound("asset"))
    }

    pub fn get_asset(&self, id: i64) -> StoreResult<Option<AssetRecord>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM assets WHERE id = ?1",
                params![id],
                asset_from_row,
            )
            .optional()?)
    }

    pub fn get_asset_by_norad(&self, norad_id: u32) -> StoreResult<Option<AssetRecord>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM assets WHERE norad_id = ?1",
                params![norad_id],
                asset_from_row,
            )
            .optional()?)
    }

    pub fn list_assets(&self) -> StoreResult<Vec<AssetRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM assets ORDER BY id")?;
        let rows = stmt
            .query_map([], asset_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update_asset(&self, id: i64, patch: &AssetPatch) -> StoreResult<Option<AssetRecord>> {
        {
            let conn = self.conn();
            let now = Utc::now();
            if let Some(name) = &patch.name {
                conn.execute(
                    "UPDATE assets SET name = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, name, now],
                )?;
            }
            if let Some(mass) = patch.mass_kg {
                conn.execute(
                    "UPDATE assets SET mass_kg = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, mass, now],
                )?;
            }
            if let Some(cs) = patch.cross_section_m2 {
                conn.execute(
                    "UPDATE assets SET cross_section_m2 = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, cs, now],
                )?;
            }
            if let Some(hbr) = patch.hard_body_radius_m {
                conn.execute(
                    "UPDATE assets SET hard_body_radius_m = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, hbr, now],
                )?;
            }
            if let Some(m) = patch.maneuverable {
                conn.execute(
                    "UPDATE assets SET maneuverable = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, m, now],
                )?;
            }
            if let Some(budget) = &patch.delta_v_budget_ms {
                conn.execute(
                    "UPDATE assets SET delta_v_budget_ms = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, budget, now],
                )?;
            }
        }
        self.get_asset(id)
    }

    /// Delete an asset; conjunctions, their options and alerts go with it.
    pub fn delete_asset(&self, id: i64) -> StoreResult<bool> {
        let n = self
            .conn()
            .execute("DELETE FROM assets WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ---- Screening jobs ----

    pub fn create_job(
        &self,
        asset_id: i64,
        time_window_days: f64,
        distance_threshold_km: f64,
    ) -> StoreResult<JobRecord> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO screening_jobs (asset_id, status, time_window_days,
                 distance_threshold_km, created_at)
             VALUES (?1, 'PENDING', ?2, ?3, ?4)",
            params![asset_id, time_window_days, distance_threshold_km, Utc::now()],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_job(id)?.ok_or(StoreError::NotFound("screening job"))
    }

    pub fn get_job(&self, id: i64) -> StoreResult<Option<JobRecord>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM screening_jobs WHERE id = ?1",
                params![id],
                job_from_row,
            )
            .optional()?)
    }

    pub fn mark_job_running(&self, id: i64, total_objects: usize) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE screening_jobs
                 SET status = 'RUNNING', started_at = ?2, total_objects = ?3
                 WHERE id = ?1",
            params![id, Utc::now(), total_objects as i64],
        )?;
        Ok(())
    }

    /// Non-transactional progress write; safe under concurrent status reads.
    pub fn update_job_progress(
        &self,
        id: i64,
        progress: f64,
        candidates_found: usize,
        conjunctions_found: usize,
    ) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE screening_jobs
                 SET progress = ?2, candidates_found = ?3, conjunctions_found = ?4
                 WHERE id = ?1",
            params![id, progress, candidates_found as i64, conjunctions_found as i64],
        )?;
        Ok(())
    }

    pub fn mark_job_completed(
        &self,
        id: i64,
        conjunctions_found: usize,
        result_note: Option<&str>,
    ) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE screening_jobs
                 SET status = 'COMPLETED', progress = 1.0, conjunctions_found = ?2,
                     completed_at = ?3, result_note = ?4
                 WHERE id = ?1",
            params![id, conjunctions_found as i64, Utc::now(), result_note],
        )?;
        Ok(())
    }

    pub fn mark_job_failed(&self, id: i64, reason: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE screening_jobs
                 SET status = 'FAILED', completed_at = ?2, result_note = ?3
                 WHERE id = ?1",
            params![id, Utc::now(), reason],
        )?;
        Ok(())
    }

    // ---- Conjunction events ----

    /// Persist every candidate of a finished job inside one transaction so
    /// status readers never observe partial job output.
    pub fn insert_events_for_job(
        &self,
        job_id: i64,
        asset_id: i64,
        candidates: &[ConjunctionCandidate],
    ) -> StoreResult<Vec<i64>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(candidates.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO conjunction_events (primary_asset_id, secondary_norad_id,
                     secondary_name, tca, miss_distance_m, radial_m, in_track_m,
                     cross_track_m, relative_velocity_kms, collision_probability,
                     combined_hard_body_radius_m, threat_level,
                     primary_sigma_radial_m, primary_sigma_in_track_m,
                     primary_sigma_cross_track_m, secondary_sigma_radial_m,
                     secondary_sigma_in_track_m, secondary_sigma_cross_track_m,
                     status, screening_job_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, 'ACTIVE', ?19, ?20)",
            )?;
            for c in candidates {
                stmt.execute(params![
                    asset_id,
                    c.secondary.catalog_number,
                    c.secondary.name,
                    c.tca,
                    c.miss_distance_m,
                    c.radial_m,
                    c.in_track_m,
                    c.cross_track_m,
                    c.relative_velocity_km_s,
                    c.collision_probability,
                    c.combined_hard_body_radius_m,
                    c.threat_level.as_str(),
                    c.primary_sigmas.radial_m,
                    c.primary_sigmas.in_track_m,
                    c.primary_sigmas.cross_track_m,
                    c.secondary_sigmas.radial_m,
                    c.secondary_sigmas.in_track_m,
                    c.secondary_sigmas.cross_track_m,
                    job_id,
                    now,
                ])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    pub fn get_event(&self, id: i64) -> StoreResult<Option<EventRecord>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM conjunction_events WHERE id = ?1",
                params![id],
                event_from_row,
            )
            .optional()?)
    }

    pub fn events_for_job(&self, job_id: i64) -> StoreResult<Vec<EventRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM conjunction_events WHERE screening_job_id = ?1
             ORDER BY collision_probability DESC",
        )?;
        let rows = stmt
            .query_map(params![job_id], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<EventRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM conjunction_events
             WHERE (?1 IS NULL OR primary_asset_id = ?1)
               AND (?2 IS NULL OR threat_level = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY collision_probability DESC
             LIMIT ?4 OFFSET ?5",
        )?;
        let rows = stmt
            .query_map(
                params![
                    filter.asset_id,
                    filter.threat_level.map(|l| l.as_str()),
                    filter.status.map(|s| s.as_str()),
                    filter.limit.unwrap_or(100),
                    filter.offset.unwrap_or(0),
                ],
                event_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update_event_status(&self, id: i64, status: EventStatus) -> StoreResult<bool> {
        let n = self.conn().execute(
            "UPDATE conjunction_events SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Ok(n > 0)
    }

    /// Latest known Pc per secondary for an asset, ignoring events written by
    /// `exclude_job_id`. Feeds the escalation check.
    pub fn latest_pc_for_pairs(
        &self,
        asset_id: i64,
        exclude_job_id: i64,
    ) -> StoreResult<HashMap<u32, f64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT secondary_norad_id, collision_probability FROM conjunction_events
             WHERE primary_asset_id = ?1
               AND (screening_job_id IS NULL OR screening_job_id <> ?2)
               AND collision_probability IS NOT NULL
             ORDER BY id ASC",
        )?;
        let mut map = HashMap::new();
        let rows = stmt.query_map(params![asset_id, exclude_job_id], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, f64>(1)?))
        })?;
        for row in rows {
            let (norad, pc) = row?;
            map.insert(norad, pc);
        }
        Ok(map)
    }

    // ---- Maneuver options ----

    /// Replace the stored options for an event with a freshly planned set.
    pub fn replace_maneuver_options(
        &self,
        conjunction_id: i64,
        options: &[ManeuverOption],
    ) -> StoreResult<Vec<ManeuverOptionRecord>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM maneuver_options WHERE conjunction_id = ?1",
            params![conjunction_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO maneuver_options (conjunction_id, label, direction, delta_v_ms,
                     timing_before_tca_orbits, burn_time, new_miss_distance_m,
                     new_collision_probability, fuel_cost_pct, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            let now = Utc::now();
            for opt in options {
                stmt.execute(params![
                    conjunction_id,
                    opt.label,
                    opt.direction.as_str(),
                    opt.delta_v_ms,
                    opt.timing_before_tca_orbits,
                    opt.burn_time,
                    opt.new_miss_distance_m,
                    opt.new_collision_probability,
                    opt.fuel_cost_pct,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        drop(conn);
        self.maneuver_options_for_event(conjunction_id)
    }

    pub fn maneuver_options_for_event(
        &self,
        conjunction_id: i64,
    ) -> StoreResult<Vec<ManeuverOptionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM maneuver_options WHERE conjunction_id = ?1 ORDER BY delta_v_ms ASC",
        )?;
        let rows = stmt
            .query_map(params![conjunction_id], option_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- Alerts ----

    pub fn insert_alert(&self, alert: &NewAlert) -> StoreResult<AlertRecord> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO alerts (asset_id, conjunction_id, threat_level, message, reason,
                 status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'NEW', ?6)",
            params![
                alert.asset_id,
                alert.conjunction_id,
                alert.threat_level.as_str(),
                alert.message,
                alert.reason,
                Utc::now(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_alert(id)?.ok_or(StoreError::NotFound("alert"))
    }

    pub fn get_alert(&self, id: i64) -> StoreResult<Option<AlertRecord>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT * FROM alerts WHERE id = ?1",
                params![id],
                alert_from_row,
            )
            .optional()?)
    }

    pub fn list_alerts(
        &self,
        asset_id: Option<i64>,
        status: Option<AlertStatus>,
    ) -> StoreResult<Vec<AlertRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM alerts
             WHERE (?1 IS NULL OR asset_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map(
                params![asset_id, status.map(|s| s.as_str())],
                alert_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update_alert_status(&self, id: i64, status: AlertStatus) -> StoreResult<bool> {
        let acknowledged_at = match status {
            AlertStatus::Acknowledged => Some(Utc::now()),
            _ => None,
        };
        let n = self.conn().execute(
            "UPDATE alerts
                 SET status = ?2,
                     acknowledged_at = COALESCE(?3, acknowledged_at)
                 WHERE id = ?1",
            params![id, status.as_str(), acknowledged_at],
        )?;
        Ok(n > 0)
    }

    // ---- Alert configuration ----

    /// Effective configuration for an asset: per-asset row if present, else
    /// the global row.
    pub fn resolve_alert_config(&self, asset_id: i64) -> StoreResult<Option<AlertConfigRecord>> {
        let conn = self.conn();
        let per_asset = conn
            .query_row(
                "SELECT * FROM alert_configs WHERE asset_id = ?1",
                params![asset_id],
                config_from_row,
            )
            .optional()?;
        if per_asset.is_some() {
            return Ok(per_asset);
        }
        Ok(conn
            .query_row(
                "SELECT * FROM alert_configs WHERE asset_id IS NULL",
                [],
                config_from_row,
            )
            .optional()?)
    }

    /// Create or update the config row for an asset (or the global row when
    /// `asset_id` is `None`).
    pub fn upsert_alert_config(
        &self,
        asset_id: Option<i64>,
        critical: f64,
        high: f64,
        moderate: f64,
        min_distance_km: Option<f64>,
        enabled: bool,
    ) -> StoreResult<AlertConfigRecord> {
        let conn = self.conn();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM alert_configs
                 WHERE (?1 IS NULL AND asset_id IS NULL) OR asset_id = ?1",
                params![asset_id],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE alert_configs
                         SET critical_threshold = ?2, high_threshold = ?3,
                             moderate_threshold = ?4, min_distance_km = ?5, enabled = ?6
                         WHERE id = ?1",
                    params![id, critical, high, moderate, min_distance_km, enabled],
                )?;
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO alert_configs (asset_id, critical_threshold, high_threshold,
                         moderate_threshold, min_distance_km, enabled)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![asset_id, critical, high, moderate, min_distance_km, enabled],
                )?;
                conn.last_insert_rowid()
            }
        };

        let found = conn
            .query_row(
                "SELECT * FROM alert_configs WHERE id = ?1",
                params![id],
                config_from_row,
            )
            .optional()?;
        found.ok_or(StoreError::NotFound("alert config"))
    }
}

// ---- Row mappers ----

fn threat_from_column(row: &Row<'_>, idx: &str) -> rusqlite::Result<ThreatLevel> {
    let raw: String = row.get(idx)?;
    Ok(raw.parse().unwrap_or(ThreatLevel::None))
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<AssetRecord> {
    Ok(AssetRecord {
        id: row.get("id")?,
        norad_id: row.get("norad_id")?,
        name: row.get("name")?,
        tle_line1: row.get("tle_line1")?,
        tle_line2: row.get("tle_line2")?,
        tle_epoch: row.get("tle_epoch")?,
        mass_kg: row.get("mass_kg")?,
        cross_section_m2: row.get("cross_section_m2")?,
        hard_body_radius_m: row.get("hard_body_radius_m")?,
        maneuverable: row.get("maneuverable")?,
        delta_v_budget_ms: row.get("delta_v_budget_ms")?,
        orbit_type: row.get("orbit_type")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let status: String = row.get("status")?;
    Ok(JobRecord {
        id: row.get("id")?,
        asset_id: row.get("asset_id")?,
        status: JobStatus::from_str(&status),
        progress: row.get("progress")?,
        total_objects: row.get("total_objects")?,
        candidates_found: row.get("candidates_found")?,
        conjunctions_found: row.get("conjunctions_found")?,
        time_window_days: row.get("time_window_days")?,
        distance_threshold_km: row.get("distance_threshold_km")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        result_note: row.get("result_note")?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let status: String = row.get("status")?;
    Ok(EventRecord {
        id: row.get("id")?,
        primary_asset_id: row.get("primary_asset_id")?,
        secondary_norad_id: row.get("secondary_norad_id")?,
        secondary_name: row.get("secondary_name")?,
        tca: row.get("tca")?,
        miss_distance_m: row.get("miss_distance_m")?,
        radial_m: row.get("radial_m")?,
        in_track_m: row.get("in_track_m")?,
        cross_track_m: row.get("cross_track_m")?,
        relative_velocity_kms: row.get("relative_velocity_kms")?,
        collision_probability: row.get("collision_probability")?,
        combined_hard_body_radius_m: row.get("combined_hard_body_radius_m")?,
        threat_level: threat_from_column(row, "threat_level")?,
        primary_sigma_radial_m: row.get("primary_sigma_radial_m")?,
        primary_sigma_in_track_m: row.get("primary_sigma_in_track_m")?,
        primary_sigma_cross_track_m: row.get("primary_sigma_cross_track_m")?,
        secondary_sigma_radial_m: row.get("secondary_sigma_radial_m")?,
        secondary_sigma_in_track_m: row.get("secondary_sigma_in_track_m")?,
        secondary_sigma_cross_track_m: row.get("secondary_sigma_cross_track_m")?,
        status: EventStatus::from_str(&status),
        screening_job_id: row.get("screening_job_id")?,
        created_at: row.get("created_at")?,
    })
}

fn option_from_row(row: &Row<'_>) -> rusqlite::Result<ManeuverOptionRecord> {
    Ok(ManeuverOptionRecord {
        id: row.get("id")?,
        conjunction_id: row.get("conjunction_id")?,
        label: row.get("label")?,
        direction: row.get("direction")?,
        delta_v_ms: row.get("delta_v_ms")?,
        timing_before_tca_orbits: row.get("timing_before_tca_orbits")?,
        burn_time: row.get("burn_time")?,
        new_miss_distance_m: row.get("new_miss_distance_m")?,
        new_collision_probability: row.get("new_collision_probability")?,
        fuel_cost_pct: row.get("fuel_cost_pct")?,
        created_at: row.get("created_at")?,
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    let status: String = row.get("status")?;
    Ok(AlertRecord {
        id: row.get("id")?,
        asset_id: row.get("asset_id")?,
        conjunction_id: row.get("conjunction_id")?,
        threat_level: threat_from_column(row, "threat_level")?,
        message: row.get("message")?,
        reason: row.get("reason")?,
        status: AlertStatus::from_str(&status),
        created_at: row.get("created_at")?,
        acknowledged_at: row.get("acknowledged_at")?,
    })
}

fn config_from_row(row: &Row<'_>) -> rusqlite::Result<AlertConfigRecord> {
    Ok(AlertConfigRecord {
        id: row.get("id")?,
        asset_id: row.get("asset_id")?,
        critical_threshold: row.get("critical_threshold")?,
        high_threshold: row.get("high_threshold")?,
        moderate_threshold: row.get("moderate_threshold")?,
        min_distance_km: row.get("min_distance_km")?,
        enabled: row.get("enabled")?,
    })
}
