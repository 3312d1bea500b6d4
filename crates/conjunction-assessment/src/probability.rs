//! Foster/Alfano 2D collision probability.
//!
//! Projects the encounter onto the conjunction plane (perpendicular to the
//! relative velocity at TCA) and integrates the combined position Gaussian
//! over the combined hard-body disk with polar Gauss-Legendre quadrature.

use nalgebra::{Matrix2, Matrix2x3, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use orbital_mechanics::frames::ric_basis;

/// Eigenvalue floor for the projected covariance, m^2. The parametric age
/// model produces numerically singular matrices at exactly zero age; the
/// floor corresponds to a 10 m sigma.
const EIGENVALUE_FLOOR_M2: f64 = 100.0;

/// Below this relative speed (m/s) the encounter-plane construction is
/// undefined and Pc is reported as zero.
const MIN_RELATIVE_SPEED_MS: f64 = 1e-6;

const N_RADIAL_NODES: usize = 50;
const N_ANGULAR_STEPS: usize = 100;

/// Threat tier derived from collision probability. `None` marks an
/// unassessed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatLevel {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl ThreatLevel {
    /// Classify a probability. Thresholds are strict greater-than: exactly
    /// 1e-3 is HIGH, not CRITICAL.
    pub fn classify(pc: f64) -> Self {
        if pc > 1e-3 {
            Self::Critical
        } else if pc > 1e-4 {
            Self::High
        } else if pc > 1e-5 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Moderate => "MODERATE",
            Self::Low => "LOW",
            Self::None => "NONE",
        }
    }
}

impl std::str::FromStr for ThreatLevel {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CRITICAL" => Ok(Self::Critical),
            "HIGH" => Ok(Self::High),
            "MODERATE" => Ok(Self::Moderate),
            "LOW" => Ok(Self::Low),
            "NONE" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a collision probability computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PcResult {
    pub collision_probability: f64,
    pub miss_distance_m: f64,
    pub radial_m: f64,
    pub in_track_m: f64,
    pub cross_track_m: f64,
    pub relative_velocity_km_s: f64,
    pub combined_hard_body_radius_m: f64,
    /// Projected miss in the conjunction plane, meters.
    pub conjunction_plane_miss: (f64, f64),
}

/// Compute the 2D Foster/Alfano collision probability.
///
/// Positions are ECI km, velocities km/s, covariances km^2 in ECI, hard-body
/// radii meters. Degenerate relative geometry yields Pc = 0 rather than an
/// error so one bad pair can never abort a screening run.
pub fn compute_collision_probability(
    r1: &Vector3<f64>,
    v1: &Vector3<f64>,
    r2: &Vector3<f64>,
    v2: &Vector3<f64>,
    cov1_km2: &Matrix3<f64>,
    cov2_km2: &Matrix3<f64>,
    radius1_m: f64,
    radius2_m: f64,
) -> PcResult {
    let delta_r_m = (r2 - r1) * 1000.0;
    let delta_v_ms = (v2 - v1) * 1000.0;
    let rel_speed = delta_v_ms.norm();
    let combined_radius = radius1_m + radius2_m;
    let miss_distance_m = delta_r_m.norm();

    if rel_speed < MIN_RELATIVE_SPEED_MS {
        return PcResult {
            collision_probability: 0.0,
            miss_distance_m,
            radial_m: 0.0,
            in_track_m: 0.0,
            cross_track_m: 0.0,
            relative_velocity_km_s: 0.0,
            combined_hard_body_radius_m: combined_radius,
            conjunction_plane_miss: (0.0, 0.0),
        };
    }

    let ric = decompose_ric(&(r1 * 1000.0), &(v1 * 1000.0), &delta_r_m);

    // Conjunction plane basis perpendicular to the relative velocity. The
    // auxiliary axis is +z unless the relative velocity is nearly polar.
    let e_along = delta_v_ms / rel_speed;
    let aux = if e_along.z.abs() < 0.9 {
        Vector3::new(0.0, 0.0, 1.0)
    } else {
        Vector3::new(1.0, 0.0, 0.0)
    };
    let e_x = e_along.cross(&aux).normalize();
    let e_y = e_along.cross(&e_x).normalize();

    let projection = Matrix2x3::from_rows(&[e_x.transpose(), e_y.transpose()]);

    let miss_2d = projection * delta_r_m;
    let cov_combined_m2 = (cov1_km2 + cov2_km2) * 1e6;
    let cov_2d = projection * cov_combined_m2 * projection.transpose();

    let pc = integrate_plane_gaussian(&miss_2d, &cov_2d, combined_radius);

    PcResult {
        collision_probability: pc.clamp(0.0, 1.0),
        miss_distance_m,
        radial_m: ric.x,
        in_track_m: ric.y,
        cross_track_m: ric.z,
        relative_velocity_km_s: rel_speed / 1000.0,
        combined_hard_body_radius_m: combined_radius,
        conjunction_plane_miss: (miss_2d.x, miss_2d.y),
    }
}

/// Decompose a relative position into (radial, in-track, cross-track)
/// components of the primary's frame. Units follow the inputs.
pub fn decompose_ric(
    r_primary: &Vector3<f64>,
    v_primary: &Vector3<f64>,
    delta_r: &Vector3<f64>,
) -> Vector3<f64> {
    match ric_basis(r_primary, v_primary) {
        Some(basis) => basis.transpose() * delta_r,
        None => Vector3::new(delta_r.norm(), 0.0, 0.0),
    }
}

/// Integrate the zero-mean axis-aligned bivariate Gaussian over a disk of
/// radius `hard_body_radius_m` centered at the projected miss.
///
/// Principal axes come from an eigendecomposition of the 2x2 covariance with
/// both eigenvalues floored at [`EIGENVALUE_FLOOR_M2`]; the quadrature is
/// Gauss-Legendre radially and midpoint angularly, with the exponent masked
/// below -500 against underflow.
fn integrate_plane_gaussian(
    miss_2d: &Vector2<f64>,
    cov_2d: &Matrix2<f64>,
    hard_body_radius_m: f64,
) -> f64 {
    // Symmetrize before decomposing; projection arithmetic leaves
    // femto-scale asymmetry.
    let sym = (cov_2d + cov_2d.transpose()) * 0.5;
    let eigen = sym.symmetric_eigen();

    let sigma_x_sq = eigen.eigenvalues[0].max(EIGENVALUE_FLOOR_M2);
    let sigma_y_sq = eigen.eigenvalues[1].max(EIGENVALUE_FLOOR_M2);
    let sigma_x = sigma_x_sq.sqrt();
    let sigma_y = sigma_y_sq.sqrt();

    let rotated = eigen.eigenvectors.transpose() * miss_2d;
    let xm = rotated.x;
    let ym = rotated.y;

    let radius = hard_body_radius_m;
    if radius <= 0.0 {
        return 0.0;
    }

    let (nodes, weights) = gauss_legendre(N_RADIAL_NODES);

    let inv_2sx2 = 0.5 / sigma_x_sq;
    let inv_2sy2 = 0.5 / sigma_y_sq;
    let norm_factor = 1.0 / (2.0 * std::f64::consts::PI * sigma_x * sigma_y);

    let d_theta = 2.0 * std::f64::consts::PI / N_ANGULAR_STEPS as f64;
    let angles: Vec<(f64, f64)> = (0..N_ANGULAR_STEPS)
        .map(|i| {
            let theta = (i as f64 + 0.5) * d_theta;
            theta.sin_cos()
        })
        .collect();

    let mut total = 0.0;
    for i in 0..N_RADIAL_NODES {
        // Map the Legendre node from [-1, 1] to [0, R].
        let r = 0.5 * radius * (nodes[i] + 1.0);
        let w_r = 0.5 * radius * weights[i];

        let mut ring_sum = 0.0;
        for &(sin_t, cos_t) in &angles {
            let x = xm + r * cos_t;
            let y = ym + r * sin_t;
            let exponent = -(x * x) * inv_2sx2 - (y * y) * inv_2sy2;
            if exponent > -500.0 {
                ring_sum += exponent.exp();
            }
        }

        // Jacobian r for the polar element.
        total += ring_sum * d_theta * w_r * r;
    }

    total * norm_factor
}

/// Gauss-Legendre nodes and weights on [-1, 1], by Newton iteration on the
/// Legendre recurrence.
fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];

    for i in 0..n {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();

        let mut dp = 0.0;
        for _ in 0..100 {
            let mut p0 = 1.0;
            let mut p1 = x;
            for k in 2..=n {
                let kf = k as f64;
                let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
                p0 = p1;
                p1 = p2;
            }
            dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
            let delta = p1 / dp;
            x -= delta;
            if delta.abs() < 1e-15 {
                break;
            }
        }

        nodes[i] = x;
        weights[i] = 2.0 / ((1.0 - x * x) * dp * dp);
    }

    (nodes, weights)
}
