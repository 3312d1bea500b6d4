//! Reference frame transforms.
//!
//! ECI (TEME) <-> ECEF is a z-axis rotation through GMST. ECEF <-> geodetic
//! uses the WGS84 ellipsoid with Bowring's iteration. The RIC basis is the
//! local orbital frame used for covariance work and miss decomposition.

use nalgebra::{Matrix3, Vector3};

use crate::{DEG_TO_RAD, ECCENTRICITY_SQ, RAD_TO_DEG, R_EARTH_EQUATORIAL, R_EARTH_POLAR};

/// Rotate an ECI position into ECEF through the given GMST (radians).
pub fn eci_to_ecef(r_eci: &Vector3<f64>, gmst: f64) -> Vector3<f64> {
    let (sin_g, cos_g) = gmst.sin_cos();
    Vector3::new(
        cos_g * r_eci.x + sin_g * r_eci.y,
        -sin_g * r_eci.x + cos_g * r_eci.y,
        r_eci.z,
    )
}

/// Inverse of [`eci_to_ecef`] at the same GMST.
pub fn ecef_to_eci(r_ecef: &Vector3<f64>, gmst: f64) -> Vector3<f64> {
    let (sin_g, cos_g) = gmst.sin_cos();
    Vector3::new(
        cos_g * r_ecef.x - sin_g * r_ecef.y,
        sin_g * r_ecef.x + cos_g * r_ecef.y,
        r_ecef.z,
    )
}

/// Rotate a batch of ECI positions into ECEF with aligned GMST values.
pub fn eci_to_ecef_batch(positions: &[Vector3<f64>], gmst: &[f64]) -> Vec<Vector3<f64>> {
    positions
        .iter()
        .zip(gmst.iter())
        .map(|(r, &g)| eci_to_ecef(r, g))
        .collect()
}

/// ECEF (km) to WGS84 geodetic (lat deg, lon deg, alt km) via Bowring's
/// iteration. Five passes land below 1e-12 rad for all terrestrial and
/// orbital altitudes.
pub fn ecef_to_geodetic(r_ecef: &Vector3<f64>) -> (f64, f64, f64) {
    let a = R_EARTH_EQUATORIAL;
    let b = R_EARTH_POLAR;
    let e2 = ECCENTRICITY_SQ;
    let ep2 = e2 / (1.0 - e2);

    let x = r_ecef.x;
    let y = r_ecef.y;
    let z = r_ecef.z;

    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();

    let mut beta = (z * a).atan2(p * b);
    let mut lat = 0.0;
    for _ in 0..5 {
        let sin_b = beta.sin();
        let cos_b = beta.cos();
        lat = (z + ep2 * b * sin_b.powi(3)).atan2(p - e2 * a * cos_b.powi(3));
        beta = (b * lat.sin()).atan2(a * lat.cos());
    }

    let sin_lat = lat.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let alt = if lat.cos().abs() > 1e-10 {
        p / lat.cos() - n
    } else {
        z / sin_lat - n * (1.0 - e2)
    };

    (lat * RAD_TO_DEG, lon * RAD_TO_DEG, alt)
}

/// WGS84 geodetic (lat deg, lon deg, alt km) to ECEF (km).
pub fn geodetic_to_ecef(lat_deg: f64, lon_deg: f64, alt_km: f64) -> Vector3<f64> {
    let lat = lat_deg * DEG_TO_RAD;
    let lon = lon_deg * DEG_TO_RAD;
    let sin_lat = lat.sin();
    let n = R_EARTH_EQUATORIAL / (1.0 - ECCENTRICITY_SQ * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (n + alt_km) * lat.cos() * lon.cos(),
        (n + alt_km) * lat.cos() * lon.sin(),
        (n * (1.0 - ECCENTRICITY_SQ) + alt_km) * sin_lat,
    )
}

/// RIC basis at a state: columns are (radial, in-track, cross-track) unit
/// vectors expressed in ECI. Returns `None` when |r| or |r x v| vanishes.
pub fn ric_basis(r: &Vector3<f64>, v: &Vector3<f64>) -> Option<Matrix3<f64>> {
    let r_mag = r.norm();
    if r_mag < 1e-10 {
        return None;
    }
    let e_r = r / r_mag;

    let h = r.cross(v);
    let h_mag = h.norm();
    if h_mag < 1e-10 {
        return None;
    }
    let e_c = h / h_mag;
    let e_i = e_c.cross(&e_r);

    Some(Matrix3::from_columns(&[e_r, e_i, e_c]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn eci_ecef_round_trip() {
        let r = Vector3::new(6524.834, 1327.117, 3411.902);
        let gmst = 3.217;
        let back = ecef_to_eci(&eci_to_ecef(&r, gmst), gmst);
        assert_abs_diff_eq!((back - r).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn geodetic_round_trip() {
        for &(lat, lon, alt) in &[
            (0.0, 0.0, 0.0),
            (45.0, -120.0, 420.0),
            (-33.5, 151.2, 550.0),
            (89.0, 10.0, 800.0),
            (-89.5, -170.0, 35786.0),
        ] {
            let ecef = geodetic_to_ecef(lat, lon, alt);
            let (lat2, lon2, alt2) = ecef_to_geodetic(&ecef);
            assert_abs_diff_eq!(lat2, lat, epsilon = 1e-8);
            assert_abs_diff_eq!(lon2, lon, epsilon = 1e-8);
            assert_abs_diff_eq!(alt2, alt, epsilon = 1e-6);
        }
    }

    #[test]
    fn equatorial_point_has_zero_latitude() {
        let (lat, lon, alt) = ecef_to_geodetic(&Vector3::new(R_EARTH_EQUATORIAL + 500.0, 0.0, 0.0));
        assert_abs_diff_eq!(lat, 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(lon, 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(alt, 500.0, epsilon = 1e-6);
    }

    #[test]
    fn ric_basis_is_right_handed_orthonormal() {
        let r = Vector3::new(6871.0, 102.5, -33.0);
        let v = Vector3::new(-0.2, 7.41, 1.1);
        let basis = ric_basis(&r, &v).unwrap();

        let e_r = basis.column(0);
        let e_i = basis.column(1);
        let e_c = basis.column(2);

        assert_abs_diff_eq!(e_r.norm(), 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(e_i.norm(), 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(e_c.norm(), 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(e_r.dot(&e_i), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(e_r.dot(&e_c), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(e_i.dot(&e_c), 0.0, epsilon = 1e-10);

        // r_hat x i_hat = c_hat closes the right-handed triad.
        let cross = Vector3::new(e_r[0], e_r[1], e_r[2]).cross(&Vector3::new(e_i[0], e_i[1], e_i[2]));
        assert_abs_diff_eq!((cross - Vector3::new(e_c[0], e_c[1], e_c[2])).norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn ric_basis_rejects_degenerate_states() {
        assert!(ric_basis(&Vector3::zeros(), &Vector3::new(1.0, 0.0, 0.0)).is_none());
        let r = Vector3::new(7000.0, 0.0, 0.0);
        assert!(ric_basis(&r, &(r * 1e-3)).is_none());
    }
}
