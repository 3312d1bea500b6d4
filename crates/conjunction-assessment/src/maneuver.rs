//! Avoidance maneuver planning.
//!
//! Enumerates direction x timing pairs and bisects on the impulse magnitude
//! until the post-maneuver Pc clears the target. The post-burn coast to TCA
//! is a second-order two-body step; re-fitting an element set and re-running
//! SGP4 would move the error floor, not the search.

use chrono::{DateTime, Duration, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use orbital_mechanics::time::datetime_to_jd;
use orbital_mechanics::{ElementSet, Propagator, MU_EARTH};

use crate::probability::compute_collision_probability;
use crate::uncertainty::{
    covariance_ric_to_eci, default_covariance_ric, estimate_hard_body_radius, ObjectType,
};
use crate::{AssessmentError, Result};

/// Lower end of the initial delta-v bracket, m/s.
const DV_BRACKET_LO_MS: f64 = 0.001;

/// Upper end of the initial delta-v bracket, m/s.
const DV_BRACKET_HI_MS: f64 = 1.0;

/// Expanded ceiling when 1 m/s is insufficient; accepted as-is if still
/// insufficient.
const DV_CEILING_MS: f64 = 5.0;

const BISECTION_MAX_ITERS: usize = 20;
const BRACKET_TOLERANCE_MS: f64 = 1e-4;

/// Burn timings evaluated for every direction, in orbital periods before TCA.
const TIMING_ORBITS: [f64; 3] = [0.5, 1.0, 2.0];

/// Default post-maneuver Pc target.
pub const DEFAULT_TARGET_PC: f64 = 1e-5;

/// Impulse direction in the primary's local frame at burn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverDirection {
    InTrack,
    Radial,
    CrossTrack,
}

impl ManeuverDirection {
    pub const ALL: [Self; 3] = [Self::InTrack, Self::Radial, Self::CrossTrack];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InTrack => "in_track",
            Self::Radial => "radial",
            Self::CrossTrack => "cross_track",
        }
    }

    /// Unit vector in ECI for this direction at the given state.
    fn unit_vector(&self, r: &Vector3<f64>, v: &Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::InTrack => {
                let v_mag = v.norm();
                if v_mag > 1e-10 {
                    v / v_mag
                } else {
                    Vector3::new(1.0, 0.0, 0.0)
                }
            }
            Self::Radial => {
                let r_mag = r.norm();
                if r_mag > 1e-10 {
                    r / r_mag
                } else {
                    Vector3::new(0.0, 0.0, 1.0)
                }
            }
            Self::CrossTrack => {
                let h = r.cross(v);
                let h_mag = h.norm();
                if h_mag > 1e-10 {
                    h / h_mag
                } else {
                    Vector3::new(0.0, 1.0, 0.0)
                }
            }
        }
    }
}

impl std::str::FromStr for ManeuverDirection {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_track" => Ok(Self::InTrack),
            "radial" => Ok(Self::Radial),
            "cross_track" => Ok(Self::CrossTrack),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ManeuverDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One computed avoidance option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManeuverOption {
    pub label: String,
    pub direction: ManeuverDirection,
    pub delta_v_ms: f64,
    pub timing_before_tca_orbits: f64,
    pub burn_time: DateTime<Utc>,
    pub new_miss_distance_m: f64,
    pub new_collision_probability: f64,
    /// Delta-v as percent of the asset budget; zero when no budget is set.
    pub fuel_cost_pct: f64,
    pub original_miss_m: f64,
    pub original_pc: f64,
}

/// Planner inputs for one conjunction event.
#[derive(Debug, Clone)]
pub struct ManeuverRequest<'a> {
    pub asset: &'a ElementSet,
    pub secondary: &'a ElementSet,
    pub tca: DateTime<Utc>,
    pub current_miss_m: f64,
    pub current_pc: f64,
    pub asset_radius_m: f64,
    pub delta_v_budget_ms: Option<f64>,
    pub target_pc: f64,
    /// Burns at or before this instant are discarded.
    pub now: DateTime<Utc>,
}

/// Compute avoidance options for a conjunction, sorted by delta-v ascending.
///
/// Every direction is paired with burn timings of 0.5, 1.0 and 2.0 orbits
/// before TCA; past burn times and options exceeding the delta-v budget are
/// discarded.
pub fn compute_avoidance_maneuvers(req: &ManeuverRequest<'_>) -> Result<Vec<ManeuverOption>> {
    let primary = Propagator::new(req.asset)?;
    let secondary = Propagator::new(req.secondary)?;

    let period_sec = primary.orbital_elements(req.tca)?.period_seconds;
    if !period_sec.is_finite() || period_sec <= 0.0 {
        return Err(AssessmentError::ManeuverNotFeasible(format!(
            "no finite orbital period for {}",
            req.asset.name
        )));
    }

    let mut options = Vec::new();
    let labels = "ABCDEFGHIJKLMNOPQRSTUVWXYZ".as_bytes();
    let mut label_idx = 0usize;

    for direction in ManeuverDirection::ALL {
        for timing_orbits in TIMING_ORBITS {
            let burn_time =
                req.tca - Duration::microseconds((timing_orbits * period_sec * 1e6) as i64);
            if burn_time <= req.now {
                continue;
            }

            let kernel = EvaluationKernel {
                primary: &primary,
                secondary: &secondary,
                request: req,
                burn_time,
                direction,
            };

            let delta_v_ms = bisect_delta_v(&kernel, req.target_pc);
            if delta_v_ms <= 0.0 {
                continue;
            }
            if let Some(budget) = req.delta_v_budget_ms {
                if delta_v_ms > budget {
                    tracing::debug!(
                        direction = direction.as_str(),
                        timing_orbits,
                        delta_v_ms,
                        budget,
                        "option exceeds delta-v budget"
                    );
                    continue;
                }
            }

            let (new_miss_m, new_pc) = kernel.evaluate(delta_v_ms);
            let fuel_cost_pct = req
                .delta_v_budget_ms
                .map(|budget| delta_v_ms / budget * 100.0)
                .unwrap_or(0.0);

            let label = (labels[label_idx % labels.len()] as char).to_string();
            label_idx += 1;

            options.push(ManeuverOption {
                label,
                direction,
                delta_v_ms,
                timing_before_tca_orbits: timing_orbits,
                burn_time,
                new_miss_distance_m: new_miss_m,
                new_collision_probability: new_pc,
                fuel_cost_pct,
                original_miss_m: req.current_miss_m,
                original_pc: req.current_pc,
            });
        }
    }

    options.sort_by(|a, b| {
        a.delta_v_ms
            .partial_cmp(&b.delta_v_ms)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    tracing::info!(
        asset = %req.asset.name,
        options = options.len(),
        target_pc = req.target_pc,
        "maneuver planning complete"
    );
    Ok(options)
}

/// Minimum delta-v whose post-maneuver Pc clears the target, by bisection.
/// Returns the expanded ceiling when even that is insufficient.
fn bisect_delta_v(kernel: &EvaluationKernel<'_>, target_pc: f64) -> f64 {
    let mut dv_lo = DV_BRACKET_LO_MS;
    let mut dv_hi = DV_BRACKET_HI_MS;

    let (_, pc_hi) = kernel.evaluate(dv_hi);
    if pc_hi > target_pc {
        dv_hi = DV_CEILING_MS;
        let (_, pc_ceiling) = kernel.evaluate(dv_hi);
        if pc_ceiling > target_pc {
            return dv_hi;
        }
    }

    for _ in 0..BISECTION_MAX_ITERS {
        let dv_mid = (dv_lo + dv_hi) / 2.0;
        let (_, pc_mid) = kernel.evaluate(dv_mid);
        if pc_mid > target_pc {
            dv_lo = dv_mid;
        } else {
            dv_hi = dv_mid;
        }
        if dv_hi - dv_lo < BRACKET_TOLERANCE_MS {
            break;
        }
    }

    dv_hi
}

/// Applies one impulsive burn and coasts to TCA.
struct EvaluationKernel<'a> {
    primary: &'a Propagator,
    secondary: &'a Propagator,
    request: &'a ManeuverRequest<'a>,
    burn_time: DateTime<Utc>,
    direction: ManeuverDirection,
}

impl EvaluationKernel<'_> {
    /// Post-maneuver (miss m, Pc) at TCA for the given impulse magnitude.
    /// Failures report (0, 1) so the bisection stays conservative.
    fn evaluate(&self, delta_v_ms: f64) -> (f64, f64) {
        match self.try_evaluate(delta_v_ms) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!("maneuver evaluation failed: {e}");
                (0.0, 1.0)
            }
        }
    }

    fn try_evaluate(&self, delta_v_ms: f64) -> Result<(f64, f64)> {
        let req = self.request;

        let burn_jd = datetime_to_jd(self.burn_time);
        let (r_burn, v_burn) = self.primary.propagate_jd(&burn_jd)?;

        // Impulse in ECI, km/s.
        let dv_vec = self.direction.unit_vector(&r_burn, &v_burn) * (delta_v_ms / 1000.0);
        let v_post = v_burn + dv_vec;

        // Second-order two-body coast to TCA.
        let dt = (req.tca - self.burn_time).num_milliseconds() as f64 / 1000.0;
        let (r1_tca, v1_tca) = two_body_step(&r_burn, &v_post, dt);

        let tca_jd = datetime_to_jd(req.tca);
        let (r2_tca, v2_tca) = self.secondary.propagate_jd(&tca_jd)?;

        let primary_age = req.asset.age_hours(req.tca);
        let secondary_age = req.secondary.age_hours(req.tca);
        let cov1 = covariance_ric_to_eci(
            &default_covariance_ric(primary_age, ObjectType::Payload),
            &r1_tca,
            &v1_tca,
        );
        let cov2 = covariance_ric_to_eci(
            &default_covariance_ric(secondary_age, ObjectType::Unknown),
            &r2_tca,
            &v2_tca,
        );
        let secondary_radius = estimate_hard_body_radius(None, ObjectType::Unknown);

        let pc = compute_collision_probability(
            &r1_tca,
            &v1_tca,
            &r2_tca,
            &v2_tca,
            &cov1,
            &cov2,
            req.asset_radius_m,
            secondary_radius,
        );

        Ok((pc.miss_distance_m, pc.collision_probability))
    }
}

/// One second-order two-body step: r' = r + v dt + a dt^2 / 2, v' = v + a dt
/// with a = -mu r / |r|^3.
fn two_body_step(r0: &Vector3<f64>, v0: &Vector3<f64>, dt: f64) -> (Vector3<f64>, Vector3<f64>) {
    let r0_mag = r0.norm();
    if r0_mag < 1e-10 || dt.abs() < 1e-10 {
        return (*r0, *v0);
    }

    let accel = -r0 * (MU_EARTH / r0_mag.powi(3));
    let r_new = r0 + v0 * dt + accel * (0.5 * dt * dt);
    let v_new = v0 + accel * dt;
    (r_new, v_new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use orbital_mechanics::tle::{sma_from_mean_motion, synthesize_element_set, SyntheticElements};
    use orbital_mechanics::RAD_TO_DEG;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn leo(catalog: u32, mean_anomaly_deg: f64) -> ElementSet {
        synthesize_element_set(&SyntheticElements {
            catalog_number: catalog,
            name: format!("SAT-{catalog}"),
            epoch: epoch(),
            inclination_deg: 51.6,
            raan_deg: 120.0,
            eccentricity: 0.001,
            arg_perigee_deg: 0.0,
            mean_anomaly_deg,
            mean_motion_rev_day: 15.2,
        })
        .unwrap()
    }

    fn close_pair() -> (ElementSet, ElementSet) {
        let offset_deg = 0.05 / sma_from_mean_motion(15.2) * RAD_TO_DEG; // ~50 m
        (leo(80001, 0.0), leo(80002, offset_deg))
    }

    fn request<'a>(
        asset: &'a ElementSet,
        secondary: &'a ElementSet,
        tca: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ManeuverRequest<'a> {
        ManeuverRequest {
            asset,
            secondary,
            tca,
            current_miss_m: 50.0,
            current_pc: 2e-3,
            asset_radius_m: 1.0,
            delta_v_budget_ms: None,
            target_pc: DEFAULT_TARGET_PC,
            now,
        }
    }

    #[test]
    fn options_cover_grid_and_sort_by_delta_v() {
        let (asset, secondary) = close_pair();
        let tca = epoch() + Duration::hours(12);
        let req = request(&asset, &secondary, tca, epoch());

        let options = compute_avoidance_maneuvers(&req).unwrap();
        assert_eq!(options.len(), 9);

        for pair in options.windows(2) {
            assert!(pair[0].delta_v_ms <= pair[1].delta_v_ms);
        }
        // Every option either met the target or hit the ceiling.
        for opt in &options {
            assert!(
                opt.new_collision_probability <= DEFAULT_TARGET_PC
                    || (opt.delta_v_ms - DV_CEILING_MS).abs() < 1e-9,
                "option {} pc {} dv {}",
                opt.label,
                opt.new_collision_probability,
                opt.delta_v_ms
            );
            assert!(opt.burn_time > req.now && opt.burn_time < tca);
            assert_abs_diff_eq!(opt.fuel_cost_pct, 0.0);
            assert_abs_diff_eq!(opt.original_pc, 2e-3);
        }

        let mut labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 9, "labels must be unique");
    }

    #[test]
    fn past_burn_times_are_discarded() {
        let (asset, secondary) = close_pair();
        let period = asset.orbital_period_seconds();
        let tca = epoch() + Duration::hours(12);
        // "now" sits 0.8 periods before TCA: only the 0.5-orbit timing fits.
        let now = tca - Duration::microseconds((0.8 * period * 1e6) as i64);
        let req = request(&asset, &secondary, tca, now);

        let options = compute_avoidance_maneuvers(&req).unwrap();
        assert_eq!(options.len(), 3);
        for opt in &options {
            assert_abs_diff_eq!(opt.timing_before_tca_orbits, 0.5);
            assert!(opt.burn_time > now);
        }
    }

    #[test]
    fn budget_filters_and_prices_options() {
        let (asset, secondary) = close_pair();
        let tca = epoch() + Duration::hours(12);

        let mut req = request(&asset, &secondary, tca, epoch());
        req.delta_v_budget_ms = Some(2.0);
        let options = compute_avoidance_maneuvers(&req).unwrap();
        assert!(!options.is_empty());
        for opt in &options {
            assert!(opt.delta_v_ms <= 2.0);
            assert_abs_diff_eq!(opt.fuel_cost_pct, opt.delta_v_ms / 2.0 * 100.0, epsilon = 1e-9);
        }

        // A budget below the smallest bracket step removes everything.
        req.delta_v_budget_ms = Some(1e-5);
        let options = compute_avoidance_maneuvers(&req).unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn in_track_option_clears_critical_event() {
        let (asset, secondary) = close_pair();
        let tca = epoch() + Duration::hours(12);
        let req = request(&asset, &secondary, tca, epoch());

        let options = compute_avoidance_maneuvers(&req).unwrap();
        let in_track_late = options.iter().find(|o| {
            o.direction == ManeuverDirection::InTrack
                && (o.timing_before_tca_orbits == 1.0 || o.timing_before_tca_orbits == 2.0)
        });

        let opt = in_track_late.expect("an in-track option at 1 or 2 orbits");
        assert!(opt.new_collision_probability < 1e-5, "pc {}", opt.new_collision_probability);
        assert!(opt.delta_v_ms < 0.5, "dv {}", opt.delta_v_ms);
        assert!(opt.new_miss_distance_m > req.current_miss_m);
    }

    #[test]
    fn two_body_step_is_second_order_consistent() {
        let r0 = Vector3::new(6878.0, 0.0, 0.0);
        let v_circ = (MU_EARTH / 6878.0f64).sqrt();
        let v0 = Vector3::new(0.0, v_circ, 0.0);

        // Over a short step the quadratic model tracks the circular orbit.
        let (r1, v1) = two_body_step(&r0, &v0, 10.0);
        assert_abs_diff_eq!(r1.norm(), 6878.0, epsilon = 0.01);
        assert_abs_diff_eq!(v1.norm(), v_circ, epsilon = 1e-3);

        // Degenerate inputs pass through.
        let (r2, v2) = two_body_step(&r0, &v0, 0.0);
        assert_eq!(r2, r0);
        assert_eq!(v2, v0);
    }
}
