//! Classical Keplerian elements and orbit classification.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    GEO_ALT, LEO_MAX_ALT, MU_EARTH, RAD_TO_DEG, R_EARTH_EQUATORIAL, SIDEREAL_DAY_SECONDS, TWO_PI,
};

/// Osculating classical elements computed from an ECI state vector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassicalElements {
    pub semi_major_axis_km: f64,
    pub eccentricity: f64,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub arg_perigee_deg: f64,
    pub true_anomaly_deg: f64,
    pub period_seconds: f64,
    pub apogee_altitude_km: f64,
    pub perigee_altitude_km: f64,
    pub specific_energy: f64,
    pub angular_momentum: f64,
    pub speed_km_s: f64,
    pub orbit_class: OrbitClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitClass {
    Leo,
    Meo,
    Geo,
    Gso,
    Heo,
    Sso,
    Molniya,
    Other,
}

impl std::fmt::Display for OrbitClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Leo => "LEO",
            Self::Meo => "MEO",
            Self::Geo => "GEO",
            Self::Gso => "GSO",
            Self::Heo => "HEO",
            Self::Sso => "SSO",
            Self::Molniya => "Molniya",
            Self::Other => "OTHER",
        };
        f.write_str(s)
    }
}

fn clamp_unit(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}

/// Classical elements from ECI position (km) and velocity (km/s), with the
/// circular and equatorial special cases resolved the conventional way
/// (angles measured from the node or the x-axis as applicable).
pub fn elements_from_state(r: &Vector3<f64>, v: &Vector3<f64>) -> ClassicalElements {
    let mu = MU_EARTH;
    let r_mag = r.norm();
    let v_mag = v.norm();

    let h = r.cross(v);
    let h_mag = h.norm();

    let k_hat = Vector3::new(0.0, 0.0, 1.0);
    let n = k_hat.cross(&h);
    let n_mag = n.norm();

    let e_vec = (r * (v_mag * v_mag - mu / r_mag) - v * r.dot(v)) / mu;
    let ecc = e_vec.norm();

    let energy = v_mag * v_mag / 2.0 - mu / r_mag;
    let sma = if (1.0 - ecc).abs() > 1e-10 {
        -mu / (2.0 * energy)
    } else {
        f64::INFINITY
    };

    let inc_rad = clamp_unit(h.z / h_mag).acos();

    let raan_rad = if n_mag > 1e-10 {
        let raw = clamp_unit(n.x / n_mag).acos();
        if n.y < 0.0 { TWO_PI - raw } else { raw }
    } else {
        0.0
    };

    let aop_rad = if n_mag > 1e-10 && ecc > 1e-10 {
        let raw = clamp_unit(n.dot(&e_vec) / (n_mag * ecc)).acos();
        if e_vec.z < 0.0 { TWO_PI - raw } else { raw }
    } else if ecc > 1e-10 {
        let raw = clamp_unit(e_vec.x / ecc).acos();
        if e_vec.y < 0.0 { TWO_PI - raw } else { raw }
    } else {
        0.0
    };

    let ta_rad = if ecc > 1e-10 {
        let raw = clamp_unit(e_vec.dot(r) / (ecc * r_mag)).acos();
        if r.dot(v) < 0.0 { TWO_PI - raw } else { raw }
    } else if n_mag > 1e-10 {
        let raw = clamp_unit(n.dot(r) / (n_mag * r_mag)).acos();
        if r.z < 0.0 { TWO_PI - raw } else { raw }
    } else {
        let raw = clamp_unit(r.x / r_mag).acos();
        if r.y < 0.0 { TWO_PI - raw } else { raw }
    };

    let (period, apogee_alt, perigee_alt) = if sma.is_finite() && sma > 0.0 {
        (
            TWO_PI * (sma.powi(3) / mu).sqrt(),
            sma * (1.0 + ecc) - R_EARTH_EQUATORIAL,
            sma * (1.0 - ecc) - R_EARTH_EQUATORIAL,
        )
    } else {
        (f64::INFINITY, f64::INFINITY, f64::INFINITY)
    };

    let inc_deg = inc_rad * RAD_TO_DEG;
    let orbit_class = classify_orbit(sma, ecc, inc_deg, period);

    ClassicalElements {
        semi_major_axis_km: sma,
        eccentricity: ecc,
        inclination_deg: inc_deg,
        raan_deg: raan_rad * RAD_TO_DEG,
        arg_perigee_deg: aop_rad * RAD_TO_DEG,
        true_anomaly_deg: ta_rad * RAD_TO_DEG,
        period_seconds: period,
        apogee_altitude_km: apogee_alt,
        perigee_altitude_km: perigee_alt,
        specific_energy: energy,
        angular_momentum: h_mag,
        speed_km_s: v_mag,
        orbit_class,
    }
}

/// Classify an orbit from semi-major axis, eccentricity, inclination and
/// period. Thresholds follow common catalog conventions.
pub fn classify_orbit(
    semi_major_axis_km: f64,
    eccentricity: f64,
    inclination_deg: f64,
    period_seconds: f64,
) -> OrbitClass {
    if !semi_major_axis_km.is_finite() || semi_major_axis_km <= 0.0 {
        return OrbitClass::Other;
    }

    let alt = semi_major_axis_km - R_EARTH_EQUATORIAL;

    if (period_seconds - SIDEREAL_DAY_SECONDS).abs() < 1800.0 && eccentricity < 0.01 {
        if inclination_deg < 1.0 {
            return OrbitClass::Geo;
        }
        return OrbitClass::Gso;
    }

    if (62.0..=64.0).contains(&inclination_deg)
        && eccentricity > 0.6
        && (43000.0..=43800.0).contains(&period_seconds)
    {
        return OrbitClass::Molniya;
    }

    let apogee_alt = semi_major_axis_km * (1.0 + eccentricity) - R_EARTH_EQUATORIAL;
    if eccentricity > 0.25 && apogee_alt > GEO_ALT {
        return OrbitClass::Heo;
    }

    if (96.0..=102.0).contains(&inclination_deg) && alt > 200.0 && alt < 1000.0 {
        return OrbitClass::Sso;
    }

    if (LEO_MAX_ALT..=GEO_ALT).contains(&alt) {
        return OrbitClass::Meo;
    }

    if alt < LEO_MAX_ALT {
        return OrbitClass::Leo;
    }

    OrbitClass::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn circular_equatorial_leo() {
        let r = Vector3::<f64>::new(6878.137, 0.0, 0.0);
        let v_circ = (MU_EARTH / r.norm()).sqrt();
        let v = Vector3::new(0.0, v_circ, 0.0);
        let el = elements_from_state(&r, &v);

        assert_abs_diff_eq!(el.semi_major_axis_km, 6878.137, epsilon = 1e-6);
        assert_abs_diff_eq!(el.eccentricity, 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(el.inclination_deg, 0.0, epsilon = 1e-10);
        assert_eq!(el.orbit_class, OrbitClass::Leo);
        assert!((el.period_seconds / 60.0 - 94.6).abs() < 0.5);
    }

    #[test]
    fn inclined_eccentric_orbit_recovers_elements() {
        // Perigee of a 0.1-eccentricity orbit inclined 51.6 degrees, with the
        // node on the x-axis and perigee at the node.
        let sma: f64 = 8000.0;
        let ecc = 0.1;
        let rp = sma * (1.0 - ecc);
        let vp = (MU_EARTH * (2.0 / rp - 1.0 / sma)).sqrt();
        let inc = 51.6f64.to_radians();

        let r = Vector3::new(rp, 0.0, 0.0);
        let v = Vector3::new(0.0, vp * inc.cos(), vp * inc.sin());
        let el = elements_from_state(&r, &v);

        assert_abs_diff_eq!(el.semi_major_axis_km, sma, epsilon = 1e-6);
        assert_abs_diff_eq!(el.eccentricity, ecc, epsilon = 1e-9);
        assert_abs_diff_eq!(el.inclination_deg, 51.6, epsilon = 1e-9);
        assert_abs_diff_eq!(el.true_anomaly_deg.min(360.0 - el.true_anomaly_deg), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn geo_classification() {
        let sma = 42164.0;
        assert_eq!(
            classify_orbit(sma, 0.0003, 0.05, SIDEREAL_DAY_SECONDS),
            OrbitClass::Geo
        );
        assert_eq!(
            classify_orbit(sma, 0.0003, 5.0, SIDEREAL_DAY_SECONDS),
            OrbitClass::Gso
        );
    }

    #[test]
    fn molniya_and_sso_classification() {
        assert_eq!(
            classify_orbit(26560.0, 0.72, 63.4, 43200.0),
            OrbitClass::Molniya
        );
        assert_eq!(classify_orbit(R_EARTH_EQUATORIAL + 700.0, 0.001, 98.2, 5900.0), OrbitClass::Sso);
    }
}
