//! Time conversions for orbital propagation.
//!
//! Julian dates are kept split into an integer-day part and a fractional-day
//! part (the form SGP4 batch propagation consumes); collapsing them into one
//! f64 costs ~50 microseconds of resolution at the current epoch, which is
//! visible in TCA refinement.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{AU_KM, DEG_TO_RAD, SECONDS_PER_DAY, TWO_PI};

/// Split Julian Date: `jd` carries the integer day (ending in .5), `fr` the
/// fraction of day in [0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JulianDate {
    pub jd: f64,
    pub fr: f64,
}

impl JulianDate {
    /// Collapsed value. Only for coarse uses (GMST centuries, sun model).
    pub fn full(&self) -> f64 {
        self.jd + self.fr
    }

    /// Signed offset `self - other` in minutes, computed part-wise.
    pub fn minutes_since(&self, other: &JulianDate) -> f64 {
        ((self.jd - other.jd) + (self.fr - other.fr)) * 1440.0
    }
}

/// Convert a UTC datetime to a split Julian date (Vallado `jday`).
pub fn datetime_to_jd(dt: DateTime<Utc>) -> JulianDate {
    let year = dt.year() as i64;
    let month = dt.month() as i64;
    let day = dt.day() as i64;

    let day_number =
        367 * year - (7 * (year + (month + 9) / 12)) / 4 + (275 * month) / 9 + day;
    let jd = day_number as f64 + 1721013.5;

    let seconds = dt.hour() as f64 * 3600.0
        + dt.minute() as f64 * 60.0
        + dt.second() as f64
        + dt.timestamp_subsec_micros() as f64 * 1e-6;

    JulianDate {
        jd,
        fr: seconds / SECONDS_PER_DAY,
    }
}

/// Convert a split Julian date back to a UTC datetime, exact to the
/// microsecond for dates in the Gregorian calendar.
pub fn jd_to_datetime(jd: JulianDate) -> DateTime<Utc> {
    // Work on the integer day and the day fraction separately so the
    // microsecond part survives the conversion.
    let shifted = jd.jd + 0.5;
    let mut z = shifted.floor();
    let mut f = (shifted - z) + jd.fr;
    if f >= 1.0 {
        let carry = f.floor();
        z += carry;
        f -= carry;
    }

    let z = z as i64;
    let a = if z < 2_299_161 {
        z
    } else {
        let alpha = ((z as f64 - 1_867_216.25) / 36524.25).floor() as i64;
        z + 1 + alpha - alpha / 4
    };

    let b = a + 1524;
    let c = ((b as f64 - 122.1) / 365.25).floor() as i64;
    let d = (365.25 * c as f64).floor() as i64;
    let e = ((b - d) as f64 / 30.6001).floor() as i64;

    let day = b - d - (30.6001 * e as f64).floor() as i64;
    let month = if e < 14 { e - 1 } else { e - 13 };
    let year = if month > 2 { c - 4716 } else { c - 4715 };

    let micros_of_day = (f * SECONDS_PER_DAY * 1e6).round() as i64;
    let date =
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).unwrap_or_default();
    let midnight = date.and_time(chrono::NaiveTime::MIN);

    Utc.from_utc_datetime(&(midnight + Duration::microseconds(micros_of_day)))
}

/// Convert a TLE epoch (two-digit year + fractional day of year) to a UTC
/// datetime. Year rule: 00-56 maps to 2000-2056, 57-99 to 1957-1999.
pub fn tle_epoch_to_datetime(epoch_year: i32, epoch_day: f64) -> DateTime<Utc> {
    let full_year = if epoch_year < 57 {
        2000 + epoch_year
    } else {
        1900 + epoch_year
    };

    let jan1 = Utc
        .with_ymd_and_hms(full_year, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    let micros = ((epoch_day - 1.0) * SECONDS_PER_DAY * 1e6).round() as i64;
    jan1 + Duration::microseconds(micros)
}

/// Greenwich Mean Sidereal Time in radians (IAU-1982 model, consistent with
/// the SGP4 TEME frame).
pub fn gmst_from_jd(jd: f64, fr: f64) -> f64 {
    let t_ut1 = (jd + fr - 2_451_545.0) / 36525.0;
    let gmst_sec = 67310.54841
        + (876600.0 * 3600.0 + 8640184.812866) * t_ut1
        + 0.093104 * t_ut1 * t_ut1
        - 6.2e-6 * t_ut1 * t_ut1 * t_ut1;
    let gmst_rad = gmst_sec.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_DAY * TWO_PI;
    gmst_rad.rem_euclid(TWO_PI)
}

/// GMST for a UTC datetime.
pub fn datetime_to_gmst(dt: DateTime<Utc>) -> f64 {
    let jd = datetime_to_jd(dt);
    gmst_from_jd(jd.jd, jd.fr)
}

/// GMST over aligned (jd, fr) arrays.
pub fn gmst_batch(jd: &[f64], fr: &[f64]) -> Vec<f64> {
    jd.iter()
        .zip(fr.iter())
        .map(|(&j, &f)| gmst_from_jd(j, f))
        .collect()
}

/// Build aligned (jd, fr) arrays from `start` to `end` at `step_seconds`,
/// carrying fractional-day overflow into the integer part.
pub fn generate_time_steps(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step_seconds: f64,
) -> (Vec<f64>, Vec<f64>) {
    let start_jd = datetime_to_jd(start);
    let total_seconds = (end - start).num_milliseconds() as f64 / 1000.0;
    let n_steps = ((total_seconds / step_seconds) as usize + 1).max(1);

    let mut jd_arr = Vec::with_capacity(n_steps);
    let mut fr_arr = Vec::with_capacity(n_steps);
    for i in 0..n_steps {
        let offset_days = i as f64 * step_seconds / SECONDS_PER_DAY;
        let mut jd = start_jd.jd;
        let mut fr = start_jd.fr + offset_days;
        if fr >= 1.0 {
            let carry = fr.floor();
            jd += carry;
            fr -= carry;
        }
        jd_arr.push(jd);
        fr_arr.push(fr);
    }

    (jd_arr, fr_arr)
}

/// Approximate Sun position in ECI (km) from a split Julian date.
///
/// First-order ecliptic model: mean longitude, mean anomaly, equation of
/// center to the second harmonic, mean obliquity. Accurate to ~1 degree,
/// which is enough for umbra shadow tests.
pub fn sun_position_eci_jd(jd: f64, fr: f64) -> Vector3<f64> {
    let t = (jd + fr - 2_451_545.0) / 36525.0;

    let l0 = (280.46646 + 36000.76983 * t).rem_euclid(360.0);
    let m = (357.52911 + 35999.05029 * t).rem_euclid(360.0);
    let m_rad = m * DEG_TO_RAD;

    let c = 1.9146 * m_rad.sin() + 0.02 * (2.0 * m_rad).sin();
    let sun_lon = (l0 + c) * DEG_TO_RAD;

    let obliquity = (23.439 - 0.013 * t) * DEG_TO_RAD;
    let dist_km = (1.00014 - 0.01671 * m_rad.cos()) * AU_KM;

    Vector3::new(
        dist_km * sun_lon.cos(),
        dist_km * sun_lon.sin() * obliquity.cos(),
        dist_km * sun_lon.sin() * obliquity.sin(),
    )
}

/// Approximate Sun position in ECI (km) for a UTC datetime.
pub fn sun_position_eci(dt: DateTime<Utc>) -> Vector3<f64> {
    let jd = datetime_to_jd(dt);
    sun_position_eci_jd(jd.jd, jd.fr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn j2000_epoch_julian_date() {
        let dt = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        let jd = datetime_to_jd(dt);
        assert_abs_diff_eq!(jd.jd, 2_451_544.5, epsilon = 1e-9);
        assert_abs_diff_eq!(jd.fr, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn jd_datetime_round_trip_microseconds() {
        let samples = [
            Utc.with_ymd_and_hms(2024, 3, 17, 6, 30, 15).unwrap()
                + Duration::microseconds(123_456),
            Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap()
                + Duration::microseconds(999_999),
            Utc.with_ymd_and_hms(2056, 7, 4, 0, 0, 0).unwrap(),
        ];
        for dt in samples {
            let back = jd_to_datetime(datetime_to_jd(dt));
            assert_eq!(back, dt, "round trip failed for {dt}");
        }
    }

    #[test]
    fn tle_epoch_year_window() {
        let modern = tle_epoch_to_datetime(24, 78.5);
        assert_eq!(modern.year(), 2024);
        assert_eq!(modern.ordinal(), 78);
        assert_eq!(modern.hour(), 12);

        let sputnik_era = tle_epoch_to_datetime(57, 1.0);
        assert_eq!(sputnik_era.year(), 1957);

        let boundary = tle_epoch_to_datetime(56, 1.0);
        assert_eq!(boundary.year(), 2056);
    }

    #[test]
    fn gmst_j2000_reference() {
        // GMST at J2000.0 is 18h 41m 50.548s = 4.894961 rad.
        let g = gmst_from_jd(2_451_544.5, 0.5);
        assert_abs_diff_eq!(g, 4.894961212, epsilon = 1e-6);
    }

    #[test]
    fn gmst_batch_matches_scalar() {
        let (jd, fr) = generate_time_steps(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap(),
            600.0,
        );
        let batch = gmst_batch(&jd, &fr);
        for (i, g) in batch.iter().enumerate() {
            assert_abs_diff_eq!(*g, gmst_from_jd(jd[i], fr[i]), epsilon = 1e-15);
        }
    }

    #[test]
    fn time_steps_carry_day_overflow() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 2, 1, 0, 0).unwrap();
        let (jd, fr) = generate_time_steps(start, end, 120.0);
        assert_eq!(jd.len(), 61);
        for (&j, &f) in jd.iter().zip(fr.iter()) {
            assert!((0.0..1.0).contains(&f), "fr out of range: {f}");
            // jd stays on half-integer boundaries after the carry.
            assert_abs_diff_eq!((j - 0.5).fract(), 0.0, epsilon = 1e-9);
        }
        let last = jd_to_datetime(JulianDate {
            jd: *jd.last().unwrap(),
            fr: *fr.last().unwrap(),
        });
        assert_eq!(last, end);
    }

    #[test]
    fn sun_position_magnitude_is_one_au() {
        let sun = sun_position_eci(Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap());
        let dist = sun.norm();
        assert!((dist - AU_KM).abs() / AU_KM < 0.02, "distance {dist}");
    }
}
