//! Monte-Carlo cross-check for the 2D probability integral.
//!
//! Samples the relative position from the combined covariance and counts
//! hard-body penetrations. Used to validate Foster/Alfano output on demand;
//! never on the screening hot path.

use nalgebra::{Cholesky, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Default sample count; callers enforcing wall-time budgets pass their own.
pub const DEFAULT_SAMPLES: usize = 10_000;

/// Distribution summary of sampled miss distances, meters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DistancePercentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub collision_probability: f64,
    pub n_samples: usize,
    pub n_collisions: usize,
    /// 95% Wilson score interval.
    pub confidence_interval: (f64, f64),
    pub distances: DistancePercentiles,
}

/// Estimate Pc by sampling the relative position from N(delta_r, cov1+cov2).
///
/// Inputs are ECI km / km^2; radii are meters. A singular combined covariance
/// is jittered by 1e-12 km^2 on the diagonal before sampling. Pass a seed for
/// reproducible draws.
pub fn run_monte_carlo(
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    cov1_km2: &Matrix3<f64>,
    cov2_km2: &Matrix3<f64>,
    radius1_m: f64,
    radius2_m: f64,
    n_samples: usize,
    seed: Option<u64>,
) -> MonteCarloResult {
    let n_samples = n_samples.max(1);
    let combined_radius_km = (radius1_m + radius2_m) / 1000.0;
    let delta_r_km = r2 - r1;
    let cov_combined = cov1_km2 + cov2_km2;

    let factor = Cholesky::new(cov_combined).or_else(|| {
        tracing::debug!("singular combined covariance, jittering diagonal");
        Cholesky::new(cov_combined + Matrix3::identity() * 1e-12)
    });
    // Non-finite covariance entries defeat even the jitter; degrade to a
    // millimeter-scale spread instead of refusing the estimate.
    let l = match factor {
        Some(chol) => chol.l(),
        None => Matrix3::identity() * 1e-6,
    };

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut distances_m = Vec::with_capacity(n_samples);
    let mut n_collisions = 0usize;
    for _ in 0..n_samples {
        let z = Vector3::new(
            rng.sample::<f64, _>(StandardNormal),
            rng.sample::<f64, _>(StandardNormal),
            rng.sample::<f64, _>(StandardNormal),
        );
        let sample = delta_r_km + &l * z;
        let dist_km = sample.norm();
        if dist_km < combined_radius_km {
            n_collisions += 1;
        }
        distances_m.push(dist_km * 1000.0);
    }

    let pc = n_collisions as f64 / n_samples as f64;
    let confidence_interval = wilson_interval(pc, n_samples);

    distances_m.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mean = distances_m.iter().sum::<f64>() / n_samples as f64;
    let variance =
        distances_m.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n_samples as f64;

    let percentile = |p: f64| -> f64 {
        let idx = ((p / 100.0) * (n_samples - 1) as f64).round() as usize;
        distances_m[idx.min(n_samples - 1)]
    };

    MonteCarloResult {
        collision_probability: pc,
        n_samples,
        n_collisions,
        confidence_interval,
        distances: DistancePercentiles {
            p5: percentile(5.0),
            p25: percentile(25.0),
            p50: percentile(50.0),
            p75: percentile(75.0),
            p95: percentile(95.0),
            min: distances_m[0],
            max: distances_m[n_samples - 1],
            mean,
            std: variance.sqrt(),
        },
    }
}

/// 95% Wilson score interval for a binomial proportion.
fn wilson_interval(p_hat: f64, n: usize) -> (f64, f64) {
    let z = 1.96f64;
    let n = n as f64;
    let denom = 1.0 + z * z / n;
    let center = (p_hat + z * z / (2.0 * n)) / denom;
    let half_width =
        z * ((p_hat * (1.0 - p_hat) + z * z / (4.0 * n)) / n).sqrt() / denom;
    ((center - half_width).max(0.0), (center + half_width).min(1.0))
}
