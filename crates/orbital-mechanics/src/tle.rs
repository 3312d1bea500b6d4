//! Two-Line Element set parsing and synthesis.
//!
//! Parses canonical 69-character TLE lines into [`ElementSet`] values and can
//! format checksummed line pairs back out (used for demo catalogs and the
//! scenario test fixtures). Checksum failures are logged, not fatal: live
//! catalog feeds contain a small but steady stream of bad checksums on
//! otherwise usable sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::tle_epoch_to_datetime;
use crate::{OrbitalError, Result, MU_EARTH, R_EARTH, SECONDS_PER_DAY, TWO_PI};

/// One satellite's parsed element set. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSet {
    pub name: String,
    pub catalog_number: u32,
    pub classification: String,
    pub international_designator: String,
    pub epoch_year: i32,
    pub epoch_day: f64,
    pub epoch: DateTime<Utc>,
    pub mean_motion_dot: f64,
    pub mean_motion_ddot: f64,
    pub bstar: f64,
    pub inclination: f64,
    pub raan: f64,
    pub eccentricity: f64,
    pub arg_perigee: f64,
    pub mean_anomaly: f64,
    pub mean_motion: f64,
    pub revolution_number: u32,
    pub element_set_number: u32,
    pub ephemeris_type: u8,
    pub line1: String,
    pub line2: String,
}

impl ElementSet {
    /// Orbital period from mean motion, seconds.
    pub fn orbital_period_seconds(&self) -> f64 {
        if self.mean_motion <= 0.0 {
            return f64::INFINITY;
        }
        SECONDS_PER_DAY / self.mean_motion
    }

    /// Element-set age at `at`, in hours, floored at zero.
    pub fn age_hours(&self, at: DateTime<Utc>) -> f64 {
        ((at - self.epoch).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
    }

    /// Semi-major axis from mean motion, km.
    pub fn semi_major_axis_km(&self) -> f64 {
        sma_from_mean_motion(self.mean_motion)
    }

    /// Apogee altitude above the mean Earth radius, km.
    pub fn apogee_altitude_km(&self) -> f64 {
        self.semi_major_axis_km() * (1.0 + self.eccentricity) - R_EARTH
    }

    /// Perigee altitude above the mean Earth radius, km.
    pub fn perigee_altitude_km(&self) -> f64 {
        self.semi_major_axis_km() * (1.0 - self.eccentricity) - R_EARTH
    }

    /// Launch year from the international designator, 0 when absent.
    pub fn launch_year(&self) -> i32 {
        match self.international_designator.get(0..2).and_then(|s| s.parse::<i32>().ok()) {
            Some(yr) if yr < 57 => yr + 2000,
            Some(yr) => yr + 1900,
            None => 0,
        }
    }
}

/// Semi-major axis (km) from mean motion (rev/day).
pub fn sma_from_mean_motion(mean_motion_rev_day: f64) -> f64 {
    let n_rad_s = mean_motion_rev_day * TWO_PI / SECONDS_PER_DAY;
    if n_rad_s <= 0.0 {
        return R_EARTH + 500.0;
    }
    (MU_EARTH / (n_rad_s * n_rad_s)).cbrt()
}

/// Validate the mod-10 checksum in column 69. Digits count their value,
/// minus signs count one.
pub fn validate_checksum(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() < 69 {
        return false;
    }
    let sum: u32 = bytes[..68]
        .iter()
        .map(|&b| match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'-' => 1,
            _ => 0,
        })
        .sum();
    bytes[68]
        .checked_sub(b'0')
        .map(|digit| sum % 10 == digit as u32)
        .unwrap_or(false)
}

/// Compute the checksum digit over the first 68 characters.
fn checksum_digit(line: &str) -> u8 {
    (line
        .bytes()
        .take(68)
        .map(|b| match b {
            b'0'..=b'9' => (b - b'0') as u16,
            b'-' => 1,
            _ => 0,
        })
        .sum::<u16>()
        % 10) as u8
}

/// Parse TLE modified exponential notation: ` 38792-4` is 3.8792e-5,
/// `-11606-4` is -1.1606e-5, ` 00000-0` is 0.
pub fn parse_modified_exponent(field: &str) -> f64 {
    let s = field.trim();
    if s.is_empty() || s.chars().all(|c| matches!(c, '0' | ' ' | '+' | '-')) {
        return 0.0;
    }

    let (sign, s) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };

    // Exponent separator is the last sign character past the mantissa.
    let exp_pos = s.rfind(|c| c == '+' || c == '-').filter(|&i| i > 0);
    match exp_pos {
        Some(i) => {
            let mantissa = format!("0.{}", &s[..i]).parse::<f64>().unwrap_or(0.0);
            let exponent = s[i..].parse::<i32>().unwrap_or(0);
            sign * mantissa * 10f64.powi(exponent)
        }
        None => format!("0.{s}").parse::<f64>().map(|m| sign * m).unwrap_or(0.0),
    }
}

fn slice(line: &str, range: std::ops::Range<usize>) -> &str {
    line.get(range).unwrap_or("")
}

/// Parse a single element set from its name and two canonical lines.
pub fn parse_element_set(name: &str, line1: &str, line2: &str) -> Result<ElementSet> {
    let name = name.trim().to_string();
    let line1 = line1.trim_end().to_string();
    let line2 = line2.trim_end().to_string();

    if line1.len() < 69 {
        return Err(OrbitalError::InvalidTle(format!(
            "line 1 too short ({} chars) for {name}",
            line1.len()
        )));
    }
    if line2.len() < 69 {
        return Err(OrbitalError::InvalidTle(format!(
            "line 2 too short ({} chars) for {name}",
            line2.len()
        )));
    }

    if !validate_checksum(&line1) {
        tracing::warn!(satellite = %name, "line 1 checksum failed");
    }
    if !validate_checksum(&line2) {
        tracing::warn!(satellite = %name, "line 2 checksum failed");
    }

    let parse_err = |field: &str| OrbitalError::InvalidTle(format!("bad {field} field for {name}"));

    let catalog_number: u32 = slice(&line1, 2..7)
        .trim()
        .parse()
        .map_err(|_| parse_err("catalog number"))?;
    if catalog_number == 0 {
        return Err(parse_err("catalog number"));
    }

    let classification = {
        let c = slice(&line1, 7..8).trim();
        if c.is_empty() { "U".to_string() } else { c.to_string() }
    };
    let international_designator = slice(&line1, 9..17).trim().to_string();

    let epoch_year: i32 = slice(&line1, 18..20)
        .trim()
        .parse()
        .map_err(|_| parse_err("epoch year"))?;
    let epoch_day: f64 = slice(&line1, 20..32)
        .trim()
        .parse()
        .map_err(|_| parse_err("epoch day"))?;
    let epoch = tle_epoch_to_datetime(epoch_year, epoch_day);

    let mm_dot_str = slice(&line1, 33..43).trim();
    let mean_motion_dot: f64 = if mm_dot_str.is_empty() {
        0.0
    } else {
        mm_dot_str.parse().map_err(|_| parse_err("mean motion derivative"))?
    };

    let mean_motion_ddot = parse_modified_exponent(slice(&line1, 44..52));
    let bstar = parse_modified_exponent(slice(&line1, 53..61));

    let ephemeris_type: u8 = slice(&line1, 62..63).trim().parse().unwrap_or(0);
    let element_set_number: u32 = slice(&line1, 64..68).trim().parse().unwrap_or(0);

    let inclination: f64 = slice(&line2, 8..16)
        .trim()
        .parse()
        .map_err(|_| parse_err("inclination"))?;
    let raan: f64 = slice(&line2, 17..25)
        .trim()
        .parse()
        .map_err(|_| parse_err("raan"))?;

    // Eccentricity carries an implied leading decimal point.
    let eccentricity: f64 = format!("0.{}", slice(&line2, 26..33).trim())
        .parse()
        .map_err(|_| parse_err("eccentricity"))?;

    let arg_perigee: f64 = slice(&line2, 34..42)
        .trim()
        .parse()
        .map_err(|_| parse_err("argument of perigee"))?;
    let mean_anomaly: f64 = slice(&line2, 43..51)
        .trim()
        .parse()
        .map_err(|_| parse_err("mean anomaly"))?;
    let mean_motion: f64 = slice(&line2, 52..63)
        .trim()
        .parse()
        .map_err(|_| parse_err("mean motion"))?;
    let revolution_number: u32 = slice(&line2, 63..68).trim().parse().unwrap_or(0);

    Ok(ElementSet {
        name,
        catalog_number,
        classification,
        international_designator,
        epoch_year,
        epoch_day,
        epoch,
        mean_motion_dot,
        mean_motion_ddot,
        bstar,
        inclination,
        raan,
        eccentricity,
        arg_perigee,
        mean_anomaly,
        mean_motion,
        revolution_number,
        element_set_number,
        ephemeris_type,
        line1,
        line2,
    })
}

/// Parse every element set in a block of text. Handles 2-line blocks and
/// 3-line blocks (name line first). Malformed sets are skipped with a
/// warning.
pub fn parse_tle_text(text: &str) -> Vec<ElementSet> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut results = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if lines[i].starts_with("1 ") && lines[i].len() >= 69 {
            if i + 1 < lines.len() && lines[i + 1].starts_with("2 ") {
                let default_name =
                    format!("SAT-{}", slice(lines[i], 2..7).trim());
                match parse_element_set(&default_name, lines[i], lines[i + 1]) {
                    Ok(set) => results.push(set),
                    Err(e) => tracing::warn!(line = i, "skipping bad TLE: {e}"),
                }
                i += 2;
            } else {
                i += 1;
            }
        } else if i + 2 < lines.len()
            && lines[i + 1].starts_with("1 ")
            && lines[i + 2].starts_with("2 ")
        {
            match parse_element_set(lines[i], lines[i + 1], lines[i + 2]) {
                Ok(set) => results.push(set),
                Err(e) => tracing::warn!(line = i, "skipping bad TLE: {e}"),
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    results
}

/// Parameters for synthesizing a canonical line pair. Drag and derivative
/// fields are written as zero, which is what screening fixtures and demo
/// catalogs need.
#[derive(Debug, Clone)]
pub struct SyntheticElements {
    pub catalog_number: u32,
    pub name: String,
    pub epoch: DateTime<Utc>,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub mean_motion_rev_day: f64,
}

/// Format a checksummed 69-character line pair for the given elements.
pub fn format_tle_lines(s: &SyntheticElements) -> (String, String) {
    use chrono::{Datelike, Timelike};

    let epoch_year = (s.epoch.year() % 100) as u8;
    let epoch_day = s.epoch.ordinal() as f64
        + s.epoch.hour() as f64 / 24.0
        + s.epoch.minute() as f64 / 1440.0
        + s.epoch.second() as f64 / 86400.0;

    let line1 = format!(
        "1 {:05}U 00000A   {:02}{:012.8}  .00000000  00000-0  00000-0 0    1",
        s.catalog_number, epoch_year, epoch_day
    );
    let line1 = format!("{}{}", line1, checksum_digit(&line1));

    let ecc_int = (s.eccentricity * 10_000_000.0).round() as u64;
    let line2 = format!(
        "2 {:05} {:>8.4} {:>8.4} {:07} {:>8.4} {:>8.4} {:>11.8}{:05}",
        s.catalog_number,
        s.inclination_deg,
        s.raan_deg,
        ecc_int,
        s.arg_perigee_deg,
        s.mean_anomaly_deg,
        s.mean_motion_rev_day,
        1u32,
    );
    let line2 = format!("{}{}", line2, checksum_digit(&line2));

    (line1, line2)
}

/// Synthesize a full [`ElementSet`] by formatting and re-parsing a line pair.
pub fn synthesize_element_set(s: &SyntheticElements) -> Result<ElementSet> {
    let (line1, line2) = format_tle_lines(s);
    parse_element_set(&s.name, &line1, &line2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{Datelike, TimeZone};
    use proptest::prelude::*;

    const ISS_L1: &str = "1 25544U 98067A   20194.88612269 -.00002218  00000-0 -31515-4 0  9992";
    const ISS_L2: &str = "2 25544  51.6461 221.2784 0001413  89.1723 280.4612 15.49507896236008";

    #[test]
    fn parses_iss_element_set() {
        let set = parse_element_set("ISS (ZARYA)", ISS_L1, ISS_L2).unwrap();
        assert_eq!(set.catalog_number, 25544);
        assert_eq!(set.classification, "U");
        assert_eq!(set.international_designator, "98067A");
        assert_eq!(set.epoch_year, 20);
        assert_eq!(set.epoch.year(), 2020);
        assert_abs_diff_eq!(set.epoch_day, 194.88612269, epsilon = 1e-12);
        assert_abs_diff_eq!(set.inclination, 51.6461, epsilon = 1e-12);
        assert_abs_diff_eq!(set.eccentricity, 0.0001413, epsilon = 1e-12);
        assert_abs_diff_eq!(set.mean_motion, 15.49507896, epsilon = 1e-12);
        assert_abs_diff_eq!(set.bstar, -3.1515e-5, epsilon = 1e-15);
        assert_abs_diff_eq!(set.mean_motion_dot, -0.00002218, epsilon = 1e-15);
        assert_eq!(set.revolution_number, 23600);
        assert_eq!(set.launch_year(), 1998);
    }

    #[test]
    fn checksum_accepts_valid_rejects_corrupt() {
        assert!(validate_checksum(ISS_L1));
        assert!(validate_checksum(ISS_L2));

        let mut corrupted = ISS_L1.to_string();
        corrupted.replace_range(68..69, "0");
        assert!(!validate_checksum(&corrupted));
    }

    #[test]
    fn checksum_failure_is_not_fatal() {
        let mut corrupted = ISS_L1.to_string();
        corrupted.replace_range(68..69, "0");
        let set = parse_element_set("ISS", &corrupted, ISS_L2).unwrap();
        assert_eq!(set.catalog_number, 25544);
    }

    #[test]
    fn modified_exponent_forms() {
        assert_abs_diff_eq!(parse_modified_exponent(" 00000-0"), 0.0);
        assert_abs_diff_eq!(parse_modified_exponent(" 38792-4"), 3.8792e-5, epsilon = 1e-16);
        assert_abs_diff_eq!(parse_modified_exponent("-11606-4"), -1.1606e-5, epsilon = 1e-16);
        assert_abs_diff_eq!(parse_modified_exponent(" 12345+1"), 1.2345, epsilon = 1e-12);
        assert_abs_diff_eq!(parse_modified_exponent(""), 0.0);
    }

    #[test]
    fn reparse_is_numerically_identical() {
        let first = parse_element_set("ISS (ZARYA)", ISS_L1, ISS_L2).unwrap();
        let second = parse_element_set("ISS (ZARYA)", &first.line1, &first.line2).unwrap();

        assert_abs_diff_eq!(first.mean_motion, second.mean_motion, epsilon = 1e-12);
        assert_abs_diff_eq!(first.eccentricity, second.eccentricity, epsilon = 1e-12);
        assert_abs_diff_eq!(first.inclination, second.inclination, epsilon = 1e-12);
        assert_abs_diff_eq!(first.raan, second.raan, epsilon = 1e-12);
        assert_abs_diff_eq!(first.arg_perigee, second.arg_perigee, epsilon = 1e-12);
        assert_abs_diff_eq!(first.mean_anomaly, second.mean_anomaly, epsilon = 1e-12);
        assert_abs_diff_eq!(first.bstar, second.bstar, epsilon = 1e-12);
        assert_abs_diff_eq!(first.epoch_day, second.epoch_day, epsilon = 1e-12);
        assert_eq!(first.epoch, second.epoch);
    }

    #[test]
    fn parses_two_and_three_line_blocks() {
        let text = format!("ISS (ZARYA)\n{ISS_L1}\n{ISS_L2}\n\n{ISS_L1}\n{ISS_L2}\n");
        let sets = parse_tle_text(&text);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].name, "ISS (ZARYA)");
        assert_eq!(sets[1].name, "SAT-25544");
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let text = format!("not a tle\n1 short\n{ISS_L1}\n{ISS_L2}\n");
        let sets = parse_tle_text(&text);
        assert_eq!(sets.len(), 1);
    }

    #[test]
    fn derived_altitudes_for_leo() {
        let set = parse_element_set("ISS", ISS_L1, ISS_L2).unwrap();
        let apogee = set.apogee_altitude_km();
        let perigee = set.perigee_altitude_km();
        assert!(apogee > 390.0 && apogee < 460.0, "apogee {apogee}");
        assert!(perigee > 390.0 && perigee < 460.0, "perigee {perigee}");
        assert!(apogee >= perigee);
        let period_min = set.orbital_period_seconds() / 60.0;
        assert!((92.0..94.0).contains(&period_min), "period {period_min}");
    }

    #[test]
    fn synthesized_lines_are_valid() {
        let synth = SyntheticElements {
            catalog_number: 60001,
            name: "FIXTURE-1".into(),
            epoch: Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap(),
            inclination_deg: 53.2,
            raan_deg: 120.0,
            eccentricity: 0.0011,
            arg_perigee_deg: 45.0,
            mean_anomaly_deg: 10.0,
            mean_motion_rev_day: 15.1,
        };
        let (l1, l2) = format_tle_lines(&synth);
        assert_eq!(l1.len(), 69);
        assert_eq!(l2.len(), 69);
        assert!(validate_checksum(&l1));
        assert!(validate_checksum(&l2));

        let set = synthesize_element_set(&synth).unwrap();
        assert_eq!(set.catalog_number, 60001);
        assert_abs_diff_eq!(set.inclination, 53.2, epsilon = 1e-9);
        assert_abs_diff_eq!(set.eccentricity, 0.0011, epsilon = 1e-7);
        assert_abs_diff_eq!(set.mean_motion, 15.1, epsilon = 1e-7);
    }

    proptest! {
        #[test]
        fn synthesis_round_trips_for_arbitrary_orbits(
            catalog in 1u32..99999,
            inc in 0.0f64..180.0,
            raan in 0.0f64..360.0,
            ecc in 0.0f64..0.3,
            argp in 0.0f64..360.0,
            ma in 0.0f64..360.0,
            mm in 1.0f64..16.5,
        ) {
            let synth = SyntheticElements {
                catalog_number: catalog,
                name: "PROP".into(),
                epoch: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
                inclination_deg: inc,
                raan_deg: raan,
                eccentricity: ecc,
                arg_perigee_deg: argp,
                mean_anomaly_deg: ma,
                mean_motion_rev_day: mm,
            };
            let set = synthesize_element_set(&synth).unwrap();
            prop_assert!((set.inclination - inc).abs() < 1e-4);
            prop_assert!((set.raan - raan).abs() < 1e-4);
            prop_assert!((set.eccentricity - ecc).abs() < 1e-7);
            prop_assert!((set.mean_motion - mm).abs() < 1e-7);

            let reparsed = parse_element_set(&set.name, &set.line1, &set.line2).unwrap();
            prop_assert!((reparsed.mean_anomaly - set.mean_anomaly).abs() < 1e-12);
        }
    }
}
