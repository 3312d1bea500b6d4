//! Conjunction Assessment Library
//!
//! The numerical risk pipeline of SentinelSpace: catalog screening for close
//! approaches, Foster/Alfano collision probability with a Monte-Carlo
//! cross-check, the parametric uncertainty model feeding both, and avoidance
//! maneuver planning.

use thiserror::Error;

pub mod maneuver;
pub mod monte_carlo;
pub mod probability;
pub mod screener;
pub mod uncertainty;

pub use maneuver::{compute_avoidance_maneuvers, ManeuverDirection, ManeuverOption, ManeuverRequest};
pub use monte_carlo::{run_monte_carlo, DistancePercentiles, MonteCarloResult};
pub use probability::{compute_collision_probability, PcResult, ThreatLevel};
pub use screener::{screen_asset, ConjunctionCandidate, ScreeningConfig, ScreeningResult};
pub use uncertainty::{
    covariance_ric_to_eci, default_covariance_ric, estimate_hard_body_radius, gps_covariance,
    ObjectType, RicSigmas,
};

#[derive(Error, Debug)]
pub enum AssessmentError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Maneuver not feasible: {0}")]
    ManeuverNotFeasible(String),
}

impl From<orbital_mechanics::OrbitalError> for AssessmentError {
    fn from(e: orbital_mechanics::OrbitalError) -> Self {
        AssessmentError::PropagationFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssessmentError>;
