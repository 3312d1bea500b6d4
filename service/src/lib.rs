//! SentinelSpace service layer.
//!
//! Ties the screening pipeline to persistence: the SQLite event store, the
//! background screening-job supervisor, the alert engine and the
//! transport-agnostic operations facade.

pub mod alerts;
pub mod jobs;
pub mod ops;
pub mod store;

pub use jobs::{wait_for_job, CatalogHandle, ScreeningSupervisor};
pub use ops::{
    AddAssetRequest, AlertConfigUpdate, AssetDetail, ConjunctionDetail, SentinelService,
    ServiceError, ServiceResult,
};
pub use store::{EventFilter, EventStore, JobStatus};
