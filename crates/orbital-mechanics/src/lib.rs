//! Orbital Mechanics Library
//!
//! Time systems, frame transforms, TLE parsing and SGP4 propagation for
//! SentinelSpace conjunction assessment. All positions are ECI (TEME) km and
//! all velocities km/s unless a name says otherwise.

use thiserror::Error;

pub mod catalog;
pub mod elements;
pub mod frames;
pub mod propagator;
pub mod time;
pub mod tle;

pub use catalog::CatalogSnapshot;
pub use elements::{classify_orbit, elements_from_state, ClassicalElements, OrbitClass};
pub use propagator::{BatchStates, GroundTrackPoint, PropagationSample, Propagator};
pub use time::JulianDate;
pub use tle::{parse_element_set, parse_tle_text, validate_checksum, ElementSet};

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Earth gravitational parameter, km^3/s^2.
pub const MU_EARTH: f64 = 398600.4418;

/// Mean Earth radius, km. Used by the cylindrical shadow model.
pub const R_EARTH: f64 = 6371.0;

/// WGS84 semi-major axis, km.
pub const R_EARTH_EQUATORIAL: f64 = 6378.137;

/// WGS84 semi-minor axis, km.
pub const R_EARTH_POLAR: f64 = 6356.752314245;

/// WGS84 flattening.
pub const FLATTENING: f64 = 1.0 / 298.257223563;

/// WGS84 first eccentricity squared.
pub const ECCENTRICITY_SQ: f64 = FLATTENING * (2.0 - FLATTENING);

pub const SECONDS_PER_DAY: f64 = 86400.0;
pub const SIDEREAL_DAY_SECONDS: f64 = 86164.0905;
pub const TWO_PI: f64 = 2.0 * std::f64::consts::PI;
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// 1 astronomical unit, km.
pub const AU_KM: f64 = 149_597_870.7;

/// Orbit classification thresholds, km.
pub const LEO_MAX_ALT: f64 = 2000.0;
pub const GEO_ALT: f64 = 35786.0;
