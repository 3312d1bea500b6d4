//! SGP4 propagation wrapper.
//!
//! Wraps the `sgp4` crate behind an [`ElementSet`]-driven API: scalar
//! propagation with geodetic conversion and shadow state, the batched grid
//! path the screener runs on, and osculating element extraction. SGP4
//! constants are rebuilt from the element set per call; initialization is
//! validated once in [`Propagator::new`] so later failures are genuine
//! propagation conditions (decay, eccentricity bounds), not bad input.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::elements::{elements_from_state, ClassicalElements};
use crate::frames::{ecef_to_geodetic, eci_to_ecef};
use crate::time::{
    datetime_to_jd, generate_time_steps, gmst_batch, gmst_from_jd, jd_to_datetime,
    sun_position_eci_jd, JulianDate,
};
use crate::tle::ElementSet;
use crate::{OrbitalError, Result, R_EARTH};

/// Complete state of a satellite at one instant.
#[derive(Debug, Clone)]
pub struct PropagationSample {
    pub datetime_utc: DateTime<Utc>,
    pub position_eci: Vector3<f64>,
    pub velocity_eci: Vector3<f64>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub speed_km_s: f64,
    pub in_shadow: bool,
}

/// One point on a ground track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroundTrackPoint {
    pub datetime_utc: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub in_shadow: bool,
}

/// Result of a batched propagation over an aligned (jd, fr) grid. Positions
/// and velocities are only meaningful where `valid` is true; failed steps are
/// demoted individually.
#[derive(Debug, Clone)]
pub struct BatchStates {
    pub valid: Vec<bool>,
    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
}

impl BatchStates {
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }
}

/// SGP4 propagation engine for one element set.
pub struct Propagator {
    set: ElementSet,
    elements: sgp4::Elements,
    epoch_jd: JulianDate,
}

impl Propagator {
    /// Validate the element set through SGP4 initialization and build the
    /// propagator. The `sgp4::Elements` value is constructed directly from
    /// the parsed fields rather than re-parsing the raw lines.
    pub fn new(set: &ElementSet) -> Result<Self> {
        let elements = sgp4::Elements {
            object_name: Some(set.name.clone()),
            international_designator: Some(set.international_designator.clone()),
            norad_id: set.catalog_number as u64,
            classification: match set.classification.as_str() {
                "C" => sgp4::Classification::Classified,
                "S" => sgp4::Classification::Secret,
                _ => sgp4::Classification::Unclassified,
            },
            datetime: set.epoch.naive_utc(),
            mean_motion_dot: set.mean_motion_dot,
            mean_motion_ddot: set.mean_motion_ddot,
            drag_term: set.bstar,
            element_set_number: set.element_set_number as u64,
            inclination: set.inclination,
            right_ascension: set.raan,
            eccentricity: set.eccentricity,
            argument_of_perigee: set.arg_perigee,
            mean_anomaly: set.mean_anomaly,
            mean_motion: set.mean_motion,
            revolution_number: set.revolution_number as u64,
            ephemeris_type: set.ephemeris_type,
        };

        // Surface init failures (bad eccentricity, sub-orbital elements)
        // here rather than on the first propagation call.
        sgp4::Constants::from_elements(&elements).map_err(|e| {
            OrbitalError::PropagationFailed(format!("SGP4 init failed for {}: {:?}", set.name, e))
        })?;

        Ok(Self {
            set: set.clone(),
            elements,
            epoch_jd: datetime_to_jd(set.epoch),
        })
    }

    pub fn element_set(&self) -> &ElementSet {
        &self.set
    }

    fn constants(&self) -> Result<sgp4::Constants> {
        sgp4::Constants::from_elements(&self.elements).map_err(|e| {
            OrbitalError::PropagationFailed(format!(
                "SGP4 init failed for {}: {:?}",
                self.set.name, e
            ))
        })
    }

    /// Propagate to a single instant: ECI state, geodetic position, speed and
    /// umbra state.
    pub fn propagate(&self, t: DateTime<Utc>) -> Result<PropagationSample> {
        let jd = datetime_to_jd(t);
        let (position, velocity) = self.propagate_jd(&jd)?;

        let gmst = gmst_from_jd(jd.jd, jd.fr);
        let ecef = eci_to_ecef(&position, gmst);
        let (latitude_deg, longitude_deg, altitude_km) = ecef_to_geodetic(&ecef);

        let sun = sun_position_eci_jd(jd.jd, jd.fr);
        Ok(PropagationSample {
            datetime_utc: t,
            position_eci: position,
            velocity_eci: velocity,
            latitude_deg,
            longitude_deg,
            altitude_km,
            speed_km_s: velocity.norm(),
            in_shadow: is_in_shadow(&position, &sun),
        })
    }

    /// Raw ECI state at a split Julian date. The cheapest scalar path; used
    /// by the TCA golden-section polish.
    pub fn propagate_jd(&self, jd: &JulianDate) -> Result<(Vector3<f64>, Vector3<f64>)> {
        let constants = self.constants()?;
        let minutes = jd.minutes_since(&self.epoch_jd);
        let prediction = constants.propagate(minutes).map_err(|e| {
            OrbitalError::PropagationFailed(format!(
                "SGP4 propagation failed for {}: {:?}",
                self.set.name, e
            ))
        })?;

        Ok((
            Vector3::from(prediction.position),
            Vector3::from(prediction.velocity),
        ))
    }

    /// Batched propagation over aligned (jd, fr) arrays — the screener hot
    /// path. One SGP4 initialization serves the whole grid; failed steps are
    /// flagged and skipped, they never abort the batch.
    pub fn propagate_batch(&self, jd: &[f64], fr: &[f64]) -> Result<BatchStates> {
        debug_assert_eq!(jd.len(), fr.len());
        let constants = self.constants()?;

        let n = jd.len();
        let mut valid = Vec::with_capacity(n);
        let mut positions = Vec::with_capacity(n);
        let mut velocities = Vec::with_capacity(n);
        let mut failures = 0usize;

        for i in 0..n {
            let minutes =
                ((jd[i] - self.epoch_jd.jd) + (fr[i] - self.epoch_jd.fr)) * 1440.0;
            match constants.propagate(minutes) {
                Ok(prediction) => {
                    valid.push(true);
                    positions.push(Vector3::from(prediction.position));
                    velocities.push(Vector3::from(prediction.velocity));
                }
                Err(_) => {
                    failures += 1;
                    valid.push(false);
                    positions.push(Vector3::zeros());
                    velocities.push(Vector3::zeros());
                }
            }
        }

        if failures > 0 {
            tracing::debug!(
                satellite = %self.set.name,
                failures,
                total = n,
                "batch propagation steps failed"
            );
        }

        Ok(BatchStates {
            valid,
            positions,
            velocities,
        })
    }

    /// Propagate a time range at a fixed step, returning full samples for
    /// every step that propagated cleanly. Shadow state uses a single sun
    /// position at the window midpoint, which is accurate to well under a
    /// degree for ranges up to a day.
    pub fn propagate_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_seconds: f64,
    ) -> Result<Vec<PropagationSample>> {
        let (jd_arr, fr_arr) = generate_time_steps(start, end, step_seconds);
        let states = self.propagate_batch(&jd_arr, &fr_arr)?;

        if states.valid_count() == 0 {
            tracing::warn!(satellite = %self.set.name, "all propagation steps failed");
            return Ok(Vec::new());
        }

        let gmst = gmst_batch(&jd_arr, &fr_arr);
        let mid = start + (end - start) / 2;
        let mid_jd = datetime_to_jd(mid);
        let sun = sun_position_eci_jd(mid_jd.jd, mid_jd.fr);

        let mut samples = Vec::with_capacity(states.valid_count());
        for i in 0..states.len() {
            if !states.valid[i] {
                continue;
            }
            let position = states.positions[i];
            let velocity = states.velocities[i];
            let ecef = eci_to_ecef(&position, gmst[i]);
            let (latitude_deg, longitude_deg, altitude_km) = ecef_to_geodetic(&ecef);
            samples.push(PropagationSample {
                datetime_utc: jd_to_datetime(JulianDate {
                    jd: jd_arr[i],
                    fr: fr_arr[i],
                }),
                position_eci: position,
                velocity_eci: velocity,
                latitude_deg,
                longitude_deg,
                altitude_km,
                speed_km_s: velocity.norm(),
                in_shadow: is_in_shadow(&position, &sun),
            });
        }

        Ok(samples)
    }

    /// Osculating classical elements at an instant, recomputed from the
    /// propagated state vector.
    pub fn orbital_elements(&self, t: DateTime<Utc>) -> Result<ClassicalElements> {
        let jd = datetime_to_jd(t);
        let (r, v) = self.propagate_jd(&jd)?;
        Ok(elements_from_state(&r, &v))
    }

    /// Ground track over `periods` orbital periods in `steps` samples.
    pub fn ground_track(
        &self,
        start: DateTime<Utc>,
        periods: f64,
        steps: usize,
    ) -> Result<Vec<GroundTrackPoint>> {
        let period_s = self.set.orbital_period_seconds();
        if !period_s.is_finite() {
            return Err(OrbitalError::PropagationFailed(format!(
                "no finite period for {}",
                self.set.name
            )));
        }
        let duration = period_s * periods;
        let step_seconds = duration / steps.max(1) as f64;
        let end = start + chrono::Duration::milliseconds((duration * 1000.0) as i64);

        Ok(self
            .propagate_range(start, end, step_seconds)?
            .into_iter()
            .map(|s| GroundTrackPoint {
                datetime_utc: s.datetime_utc,
                latitude_deg: s.latitude_deg,
                longitude_deg: s.longitude_deg,
                altitude_km: s.altitude_km,
                in_shadow: s.in_shadow,
            })
            .collect())
    }
}

/// Cylindrical umbra model: a point is in shadow iff its projection onto the
/// sun direction is negative and its perpendicular distance from the sun line
/// is under the mean Earth radius.
pub fn is_in_shadow(position_eci: &Vector3<f64>, sun_position: &Vector3<f64>) -> bool {
    let sun_hat = sun_position / sun_position.norm();
    let proj = position_eci.dot(&sun_hat);
    if proj > 0.0 {
        return false;
    }
    let perp = position_eci - sun_hat * proj;
    perp.norm() < R_EARTH
}
