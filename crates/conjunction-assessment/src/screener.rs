//! Conjunction screening pipeline.
//!
//! Three passes over the catalog: an apogee/perigee overlap filter, a coarse
//! batched distance scan on a 120 s grid, and a fine 10 s refinement around
//! each coarse minimum, finished by a golden-section search for the TCA.
//! Collision probability is evaluated once per surviving pair at the polished
//! TCA.

use chrono::{DateTime, Duration, Utc};
use nalgebra::Vector3;

use orbital_mechanics::time::{datetime_to_jd, generate_time_steps};
use orbital_mechanics::{CatalogSnapshot, ElementSet, Propagator};

use crate::probability::{compute_collision_probability, ThreatLevel};
use crate::uncertainty::{
    covariance_ric_to_eci, default_covariance_ric, estimate_hard_body_radius, ric_sigmas,
    ObjectType, RicSigmas,
};

/// Coarse scan step, seconds.
pub const COARSE_STEP_SECONDS: f64 = 120.0;

/// Fine refinement step, seconds.
pub const FINE_STEP_SECONDS: f64 = 10.0;

/// Hard cap on the coarse grid length.
pub const MAX_COARSE_SAMPLES: usize = 60_000;

/// Worst-case relative speed for the detection envelope, km/s. LEO-on-LEO
/// head-on tops out near 15.5; faster retrograde-HEO geometries are rare
/// enough to accept the documented miss-rate bound instead of inflating
/// every scan.
pub const MAX_RELATIVE_SPEED_KM_S: f64 = 15.0;

/// Altitude-band overlap margin for the geometric filter, km.
pub const ALTITUDE_MARGIN_KM: f64 = 30.0;

/// Golden-section bracket width at which the TCA is accepted, seconds.
const TCA_PRECISION_SECONDS: f64 = 0.1;

/// Screening run parameters.
#[derive(Debug, Clone)]
pub struct ScreeningConfig {
    pub time_window_days: f64,
    pub distance_threshold_km: f64,
    pub asset_radius_m: f64,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            time_window_days: 7.0,
            distance_threshold_km: 5.0,
            asset_radius_m: 1.0,
        }
    }
}

/// A close approach surviving all three passes.
#[derive(Debug, Clone)]
pub struct ConjunctionCandidate {
    pub secondary: ElementSet,
    pub tca: DateTime<Utc>,
    pub miss_distance_m: f64,
    pub radial_m: f64,
    pub in_track_m: f64,
    pub cross_track_m: f64,
    pub relative_velocity_km_s: f64,
    pub collision_probability: f64,
    pub combined_hard_body_radius_m: f64,
    pub threat_level: ThreatLevel,
    pub primary_sigmas: RicSigmas,
    pub secondary_sigmas: RicSigmas,
    pub primary_position_eci: Vector3<f64>,
    pub primary_velocity_eci: Vector3<f64>,
    pub secondary_position_eci: Vector3<f64>,
    pub secondary_velocity_eci: Vector3<f64>,
}

/// Result of one screening run.
#[derive(Debug, Clone, Default)]
pub struct ScreeningResult {
    /// Candidates sorted by collision probability, highest first.
    pub conjunctions: Vec<ConjunctionCandidate>,
    /// Smallest fine-scan miss over every pair reaching pass 3, including
    /// pairs that ended up outside the reporting threshold. Infinite when no
    /// pair got that far.
    pub closest_miss_km: f64,
    pub closest_miss_object: String,
    /// Catalog size after the geometric filter.
    pub candidates_scanned: usize,
    /// Pair count after the coarse scan.
    pub close_approaches: usize,
    /// Set when the run degenerated (e.g. the primary failed to propagate).
    pub note: Option<String>,
}

impl ScreeningResult {
    fn empty() -> Self {
        Self {
            closest_miss_km: f64::INFINITY,
            ..Default::default()
        }
    }
}

/// Screen a protected asset against a catalog snapshot over a forward
/// window starting at `start`.
///
/// `progress` receives (fraction, candidate count, conjunction count) on the
/// fixed schedule 0.05 / 0.10 / 0.10-0.50 / 0.50-1.00.
pub fn screen_asset(
    asset: &ElementSet,
    catalog: &CatalogSnapshot,
    start: DateTime<Utc>,
    config: &ScreeningConfig,
    mut progress: impl FnMut(f64, usize, usize),
) -> ScreeningResult {
    let end = start + Duration::microseconds((config.time_window_days * 86400.0 * 1e6) as i64);
    let threshold_km = config.distance_threshold_km;

    tracing::info!(
        asset = %asset.name,
        catalog_size = catalog.len(),
        window_days = config.time_window_days,
        threshold_km,
        "starting screening"
    );

    // ---- Pass 1: geometric filter ----
    let candidates: Vec<&ElementSet> = catalog
        .objects()
        .filter(|set| set.catalog_number != asset.catalog_number)
        .filter(|set| altitude_bands_overlap(asset, set))
        .collect();
    let candidates_scanned = candidates.len();

    tracing::info!(
        candidates = candidates_scanned,
        total = catalog.len(),
        "geometric filter complete"
    );
    progress(0.05, candidates_scanned, 0);

    if candidates.is_empty() {
        return ScreeningResult {
            candidates_scanned,
            ..ScreeningResult::empty()
        };
    }

    // ---- Coarse grid ----
    let (mut jd_coarse, mut fr_coarse) = generate_time_steps(start, end, COARSE_STEP_SECONDS);
    jd_coarse.truncate(MAX_COARSE_SAMPLES);
    fr_coarse.truncate(MAX_COARSE_SAMPLES);
    let total_seconds = (jd_coarse.len() - 1) as f64 * COARSE_STEP_SECONDS;

    // Any pair whose true closest approach is inside the threshold must show
    // a coarse sample inside this envelope.
    let envelope_km = COARSE_STEP_SECONDS * MAX_RELATIVE_SPEED_KM_S + threshold_km;

    // ---- Primary pre-propagation ----
    let primary_failed = |candidates_scanned| ScreeningResult {
        candidates_scanned,
        note: Some("primary propagation failed".to_string()),
        ..ScreeningResult::empty()
    };

    let primary = match Propagator::new(asset) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(asset = %asset.name, "primary SGP4 init failed: {e}");
            return primary_failed(candidates_scanned);
        }
    };
    let p_coarse = match primary.propagate_batch(&jd_coarse, &fr_coarse) {
        Ok(states) if states.valid_count() > 0 => states,
        _ => {
            tracing::error!(asset = %asset.name, "primary propagation failed on every step");
            return primary_failed(candidates_scanned);
        }
    };
    progress(0.10, candidates_scanned, 0);

    // ---- Pass 2: coarse scan ----
    let mut close_approaches: Vec<(&ElementSet, Propagator, usize)> = Vec::new();
    let report_every = (candidates_scanned / 20).max(1);

    for (idx, secondary) in candidates.iter().enumerate() {
        if let Some(hit) = coarse_scan_pair(
            secondary,
            &p_coarse,
            &jd_coarse,
            &fr_coarse,
            envelope_km,
        ) {
            close_approaches.push(hit);
        }

        if (idx + 1) % report_every == 0 {
            let pct = 0.1 + 0.4 * (idx + 1) as f64 / candidates_scanned as f64;
            progress(pct, candidates_scanned, close_approaches.len());
        }
    }

    tracing::info!(
        close_approaches = close_approaches.len(),
        envelope_km,
        "coarse scan complete"
    );
    progress(0.5, candidates_scanned, close_approaches.len());

    // ---- Pass 3: fine refinement + TCA polish ----
    let mut conjunctions: Vec<ConjunctionCandidate> = Vec::new();
    let mut closest_miss_km = f64::INFINITY;
    let mut closest_miss_object = String::new();
    let n_close = close_approaches.len();

    for (i, (secondary, sec_prop, coarse_idx)) in close_approaches.into_iter().enumerate() {
        if let Some(outcome) = refine_pair(
            asset,
            &primary,
            secondary,
            &sec_prop,
            coarse_idx,
            start,
            end,
            total_seconds,
            config,
        ) {
            if outcome.fine_min_km < closest_miss_km {
                closest_miss_km = outcome.fine_min_km;
                closest_miss_object = if secondary.name.is_empty() {
                    format!("NORAD {}", secondary.catalog_number)
                } else {
                    secondary.name.clone()
                };
            }
            if let Some(candidate) = outcome.candidate {
                tracing::info!(
                    primary = %asset.name,
                    secondary = %secondary.name,
                    miss_m = candidate.miss_distance_m,
                    pc = candidate.collision_probability,
                    tca = %candidate.tca,
                    "conjunction found"
                );
                conjunctions.push(candidate);
            }
        }

        let pct = 0.5 + 0.5 * (i + 1) as f64 / n_close as f64;
        progress(pct, n_close, conjunctions.len());
    }

    progress(1.0, candidates_scanned, conjunctions.len());

    conjunctions.sort_by(|a, b| {
        b.collision_probability
            .partial_cmp(&a.collision_probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    tracing::info!(
        conjunctions = conjunctions.len(),
        closest_miss_km,
        closest_miss_object = %closest_miss_object,
        "screening complete"
    );

    ScreeningResult {
        conjunctions,
        closest_miss_km,
        closest_miss_object,
        candidates_scanned,
        close_approaches: n_close,
        note: None,
    }
}

/// Pass-1 predicate: the two altitude bands overlap within the margin.
fn altitude_bands_overlap(asset: &ElementSet, secondary: &ElementSet) -> bool {
    let margin = ALTITUDE_MARGIN_KM;
    let a_apogee = asset.apogee_altitude_km();
    let a_perigee = asset.perigee_altitude_km();
    let s_apogee = secondary.apogee_altitude_km();
    let s_perigee = secondary.perigee_altitude_km();

    a_perigee - margin <= s_apogee + margin && s_perigee - margin <= a_apogee + margin
}

/// Pass-2 body: batch-propagate one secondary and return it with the index
/// of its coarse minimum if that minimum is inside the envelope. Propagation
/// failures silently drop the secondary.
fn coarse_scan_pair<'a>(
    secondary: &'a ElementSet,
    p_coarse: &orbital_mechanics::BatchStates,
    jd_coarse: &[f64],
    fr_coarse: &[f64],
    envelope_km: f64,
) -> Option<(&'a ElementSet, Propagator, usize)> {
    let sec_prop = Propagator::new(secondary).ok()?;
    let s_coarse = sec_prop.propagate_batch(jd_coarse, fr_coarse).ok()?;

    let mut min_idx = None;
    let mut min_dist = f64::INFINITY;
    for i in 0..s_coarse.len() {
        if !(p_coarse.valid[i] && s_coarse.valid[i]) {
            continue;
        }
        let dist = (p_coarse.positions[i] - s_coarse.positions[i]).norm();
        if dist < min_dist {
            min_dist = dist;
            min_idx = Some(i);
        }
    }

    match min_idx {
        Some(idx) if min_dist < envelope_km => Some((secondary, sec_prop, idx)),
        _ => None,
    }
}

struct RefineOutcome {
    fine_min_km: f64,
    candidate: Option<ConjunctionCandidate>,
}

/// Pass-3 body: fine grid around the coarse minimum, golden-section polish,
/// then probability evaluation at the polished TCA. Any failure demotes the
/// pair, never the run.
#[allow(clippy::too_many_arguments)]
fn refine_pair(
    asset: &ElementSet,
    primary: &Propagator,
    secondary: &ElementSet,
    sec_prop: &Propagator,
    coarse_idx: usize,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    total_seconds: f64,
    config: &ScreeningConfig,
) -> Option<RefineOutcome> {
    let center_sec = coarse_idx as f64 * COARSE_STEP_SECONDS;
    let fine_start_sec = (center_sec - 2.0 * COARSE_STEP_SECONDS).max(0.0);
    let fine_end_sec = (center_sec + 2.0 * COARSE_STEP_SECONDS).min(total_seconds);

    let fine_start = start + Duration::microseconds((fine_start_sec * 1e6) as i64);
    let fine_end = start + Duration::microseconds((fine_end_sec * 1e6) as i64);
    let (jd_fine, fr_fine) = generate_time_steps(fine_start, fine_end, FINE_STEP_SECONDS);

    let p_fine = primary.propagate_batch(&jd_fine, &fr_fine).ok()?;
    let s_fine = sec_prop.propagate_batch(&jd_fine, &fr_fine).ok()?;

    let mut fine_min_idx = None;
    let mut fine_min_km = f64::INFINITY;
    for i in 0..p_fine.len() {
        if !(p_fine.valid[i] && s_fine.valid[i]) {
            continue;
        }
        let dist = (p_fine.positions[i] - s_fine.positions[i]).norm();
        if dist < fine_min_km {
            fine_min_km = dist;
            fine_min_idx = Some(i);
        }
    }
    let fine_min_idx = fine_min_idx?;

    // Golden-section polish around the fine minimum, clamped to the window.
    let approx_tca =
        fine_start + Duration::microseconds((fine_min_idx as f64 * FINE_STEP_SECONDS * 1e6) as i64);
    let bracket_lo = (approx_tca - Duration::seconds(FINE_STEP_SECONDS as i64)).max(start);
    let bracket_hi = (approx_tca + Duration::seconds(FINE_STEP_SECONDS as i64)).min(end);
    let (tca, tca_dist_km) = refine_tca(primary, sec_prop, bracket_lo, bracket_hi);

    if tca_dist_km > config.distance_threshold_km {
        return Some(RefineOutcome {
            fine_min_km,
            candidate: None,
        });
    }

    // States and age-driven covariances at the polished TCA.
    let tca_jd = datetime_to_jd(tca);
    let (r1, v1) = primary.propagate_jd(&tca_jd).ok()?;
    let (r2, v2) = sec_prop.propagate_jd(&tca_jd).ok()?;

    let primary_age = asset.age_hours(tca);
    let secondary_age = secondary.age_hours(tca);
    let primary_sigmas = ric_sigmas(primary_age, ObjectType::Payload);
    let secondary_sigmas = ric_sigmas(secondary_age, ObjectType::Unknown);

    let cov1 = covariance_ric_to_eci(
        &default_covariance_ric(primary_age, ObjectType::Payload),
        &r1,
        &v1,
    );
    let cov2 = covariance_ric_to_eci(
        &default_covariance_ric(secondary_age, ObjectType::Unknown),
        &r2,
        &v2,
    );
    let secondary_radius = estimate_hard_body_radius(None, ObjectType::Unknown);

    let pc = compute_collision_probability(
        &r1,
        &v1,
        &r2,
        &v2,
        &cov1,
        &cov2,
        config.asset_radius_m,
        secondary_radius,
    );

    Some(RefineOutcome {
        fine_min_km,
        candidate: Some(ConjunctionCandidate {
            secondary: secondary.clone(),
            tca,
            miss_distance_m: pc.miss_distance_m,
            radial_m: pc.radial_m,
            in_track_m: pc.in_track_m,
            cross_track_m: pc.cross_track_m,
            relative_velocity_km_s: pc.relative_velocity_km_s,
            collision_probability: pc.collision_probability,
            combined_hard_body_radius_m: pc.combined_hard_body_radius_m,
            threat_level: ThreatLevel::classify(pc.collision_probability),
            primary_sigmas,
            secondary_sigmas,
            primary_position_eci: r1,
            primary_velocity_eci: v1,
            secondary_position_eci: r2,
            secondary_velocity_eci: v2,
        }),
    })
}

/// Golden-section search for the distance minimum between two propagators
/// over [t_lo, t_hi], down to a 0.1 s bracket. Scalar SGP4 calls; a failed
/// point counts as infinitely far.
fn refine_tca(
    prop1: &Propagator,
    prop2: &Propagator,
    t_lo: DateTime<Utc>,
    t_hi: DateTime<Utc>,
) -> (DateTime<Utc>, f64) {
    let golden = (5.0f64.sqrt() - 1.0) / 2.0;

    let distance_at = |offset_sec: f64| -> f64 {
        let t = t_lo + Duration::microseconds((offset_sec * 1e6) as i64);
        let jd = datetime_to_jd(t);
        match (prop1.propagate_jd(&jd), prop2.propagate_jd(&jd)) {
            (Ok((r1, _)), Ok((r2, _))) => (r1 - r2).norm(),
            _ => f64::INFINITY,
        }
    };

    let mut a = 0.0f64;
    let mut b = (t_hi - t_lo).num_milliseconds() as f64 / 1000.0;

    while (b - a) > TCA_PRECISION_SECONDS {
        let c = b - golden * (b - a);
        let d = a + golden * (b - a);
        if distance_at(c) < distance_at(d) {
            b = d;
        } else {
            a = c;
        }
    }

    let mid = (a + b) / 2.0;
    let tca = t_lo + Duration::microseconds((mid * 1e6) as i64);
    (tca, distance_at(mid))
}
