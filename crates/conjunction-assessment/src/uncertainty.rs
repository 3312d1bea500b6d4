//! Parametric position uncertainty and hard-body sizing.
//!
//! Operational covariance data is rarely available for secondaries, so the
//! model grows a diagonal RIC covariance linearly with element-set age. The
//! in-track term dominates: mean-motion error accumulates along-track.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use orbital_mechanics::frames::ric_basis;

/// Broad object category used for uncertainty growth and hard-body defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Payload,
    RocketBody,
    Debris,
    Unknown,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payload => "payload",
            Self::RocketBody => "rocket_body",
            Self::Debris => "debris",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "payload" => Ok(Self::Payload),
            "rocket_body" => Ok(Self::RocketBody),
            "debris" => Ok(Self::Debris),
            "unknown" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

/// One-sigma RIC uncertainties in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RicSigmas {
    pub radial_m: f64,
    pub in_track_m: f64,
    pub cross_track_m: f64,
}

/// One-sigma values (meters) of the age-growth model at `age` hours.
///
/// Typical SSN two-line-element accuracy: a fresh payload set carries ~200 m
/// radial, ~500 m in-track; at 24 h the in-track term is already ~5 km.
pub fn ric_sigmas(tle_age_hours: f64, object_type: ObjectType) -> RicSigmas {
    let age = tle_age_hours.max(0.0);
    let (radial_m, in_track_m, cross_track_m) = match object_type {
        ObjectType::Payload => (200.0 + 12.0 * age, 500.0 + 200.0 * age, 200.0 + 12.0 * age),
        ObjectType::RocketBody => (400.0 + 25.0 * age, 1000.0 + 400.0 * age, 400.0 + 25.0 * age),
        ObjectType::Debris => (500.0 + 30.0 * age, 1500.0 + 500.0 * age, 500.0 + 30.0 * age),
        ObjectType::Unknown => (300.0 + 20.0 * age, 800.0 + 300.0 * age, 300.0 + 20.0 * age),
    };
    RicSigmas {
        radial_m,
        in_track_m,
        cross_track_m,
    }
}

/// Diagonal RIC covariance (km^2) from the age-growth model.
pub fn default_covariance_ric(tle_age_hours: f64, object_type: ObjectType) -> Matrix3<f64> {
    let s = ric_sigmas(tle_age_hours, object_type);
    let r_km = s.radial_m / 1000.0;
    let i_km = s.in_track_m / 1000.0;
    let c_km = s.cross_track_m / 1000.0;
    Matrix3::from_diagonal(&Vector3::new(r_km * r_km, i_km * i_km, c_km * c_km))
}

/// Rotate a RIC covariance into ECI at the given state. Degenerate states
/// (|r| -> 0 or |r x v| -> 0) return the input unchanged.
pub fn covariance_ric_to_eci(
    cov_ric: &Matrix3<f64>,
    r_eci: &Vector3<f64>,
    v_eci: &Vector3<f64>,
) -> Matrix3<f64> {
    match ric_basis(r_eci, v_eci) {
        Some(rot) => rot * cov_ric * rot.transpose(),
        None => *cov_ric,
    }
}

/// Hard-body radius (meters) from radar cross-section when available, else a
/// per-type default.
pub fn estimate_hard_body_radius(rcs_m2: Option<f64>, object_type: ObjectType) -> f64 {
    if let Some(rcs) = rcs_m2 {
        return if rcs < 0.01 {
            0.05
        } else if rcs < 0.1 {
            0.15
        } else if rcs < 1.0 {
            0.5
        } else if rcs < 10.0 {
            1.5
        } else {
            3.0
        };
    }

    match object_type {
        ObjectType::Payload => 3.0,
        ObjectType::RocketBody => 3.5,
        ObjectType::Debris => 0.3,
        ObjectType::Unknown => 1.0,
    }
}

/// Covariance for owner-operated satellites carrying GPS receivers: ~10 m
/// isotropic, km^2.
pub fn gps_covariance() -> Matrix3<f64> {
    let sigma_km = 0.01;
    Matrix3::from_diagonal(&Vector3::repeat(sigma_km * sigma_km))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fresh_payload_sigmas() {
        let s = ric_sigmas(0.0, ObjectType::Payload);
        assert_abs_diff_eq!(s.radial_m, 200.0);
        assert_abs_diff_eq!(s.in_track_m, 500.0);
        assert_abs_diff_eq!(s.cross_track_m, 200.0);
    }

    #[test]
    fn in_track_grows_fastest() {
        for ty in [
            ObjectType::Payload,
            ObjectType::RocketBody,
            ObjectType::Debris,
            ObjectType::Unknown,
        ] {
            let fresh = ric_sigmas(0.0, ty);
            let day_old = ric_sigmas(24.0, ty);
            let in_track_growth = day_old.in_track_m - fresh.in_track_m;
            let radial_growth = day_old.radial_m - fresh.radial_m;
            assert!(in_track_growth > radial_growth, "{ty:?}");
        }
    }

    #[test]
    fn negative_age_is_floored() {
        assert_eq!(
            ric_sigmas(-5.0, ObjectType::Debris),
            ric_sigmas(0.0, ObjectType::Debris)
        );
    }

    #[test]
    fn covariance_diagonal_is_sigma_squared_km() {
        let cov = default_covariance_ric(24.0, ObjectType::Unknown);
        // sigma_i at 24 h for unknown: 800 + 300 * 24 = 8000 m = 8 km.
        assert_abs_diff_eq!(cov[(1, 1)], 64.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cov[(0, 1)], 0.0);
    }

    #[test]
    fn ric_rotation_preserves_trace_and_symmetry() {
        let cov = default_covariance_ric(12.0, ObjectType::Payload);
        let r = Vector3::new(6871.0, 120.0, -45.0);
        let v = Vector3::new(-0.1, 7.4, 1.2);
        let eci = covariance_ric_to_eci(&cov, &r, &v);

        assert_abs_diff_eq!(eci.trace(), cov.trace(), epsilon = 1e-9);
        assert_abs_diff_eq!((eci - eci.transpose()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_state_returns_input() {
        let cov = default_covariance_ric(1.0, ObjectType::Payload);
        let out = covariance_ric_to_eci(&cov, &Vector3::zeros(), &Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(out, cov);
    }

    #[test]
    fn hard_body_piecewise_and_defaults() {
        assert_abs_diff_eq!(estimate_hard_body_radius(Some(0.005), ObjectType::Unknown), 0.05);
        assert_abs_diff_eq!(estimate_hard_body_radius(Some(0.05), ObjectType::Unknown), 0.15);
        assert_abs_diff_eq!(estimate_hard_body_radius(Some(0.5), ObjectType::Unknown), 0.5);
        assert_abs_diff_eq!(estimate_hard_body_radius(Some(5.0), ObjectType::Unknown), 1.5);
        assert_abs_diff_eq!(estimate_hard_body_radius(Some(50.0), ObjectType::Debris), 3.0);

        assert_abs_diff_eq!(estimate_hard_body_radius(None, ObjectType::Payload), 3.0);
        assert_abs_diff_eq!(estimate_hard_body_radius(None, ObjectType::RocketBody), 3.5);
        assert_abs_diff_eq!(estimate_hard_body_radius(None, ObjectType::Debris), 0.3);
        assert_abs_diff_eq!(estimate_hard_body_radius(None, ObjectType::Unknown), 1.0);
    }
}
