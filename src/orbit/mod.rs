//! Orbital model built from a two-line element set and propagated with SGP4.
//!
//! Positions come out of SGP4 in the TEME inertial frame; they are rotated by
//! Greenwich sidereal time into Earth-fixed coordinates and then converted to
//! geodetic latitude/longitude on the WGS84 ellipsoid.

use crate::domain::{OrbitalElements, SatelliteState};
use crate::errors::{ApiError, ApiResult};
use crate::utils::normalize_longitude;
use chrono::{DateTime, Utc};
use sgp4::{Constants, Elements, MinutesSinceEpoch};
use std::f64::consts::TAU;
use tracing::trace;

const TLE_LINE_LEN: usize = 69;

const WGS84_A_KM: f64 = 6378.137;
const WGS84_B_KM: f64 = 6356.7523142;
const GEODETIC_ITERATIONS: usize = 20;

const MS_PER_DAY: f64 = 86_400_000.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const J2000_JD: f64 = 2_451_545.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Anything that can place the satellite's ground point at an instant
pub trait GroundTrack {
    fn state_at(&self, timestamp_ms: i64) -> Option<SatelliteState>;
}

/// Propagatable model derived from one element set
#[derive(Debug, Clone)]
pub struct OrbitalModel {
    source: OrbitalElements,
    constants: Constants,
    epoch_ms: i64,
}

/// Validate the element set and build the SGP4 model for it
pub fn build_model(elements: &OrbitalElements) -> ApiResult<OrbitalModel> {
    let line1 = elements.line1.trim_end();
    let line2 = elements.line2.trim_end();
    validate_line(line1, '1')?;
    validate_line(line2, '2')?;
    if line1[2..7] != line2[2..7] {
        return Err(ApiError::InvalidElements(format!(
            "catalog numbers differ: {} vs {}",
            &line1[2..7],
            &line2[2..7]
        )));
    }

    let parsed = Elements::from_tle(elements.name.clone(), line1.as_bytes(), line2.as_bytes())
        .map_err(|e| ApiError::InvalidElements(format!("{:?}", e)))?;

    let constants =
        Constants::from_elements(&parsed).map_err(|e| ApiError::ModelBuild(format!("{:?}", e)))?;

    let epoch_ms = DateTime::<Utc>::from_naive_utc_and_offset(parsed.datetime, Utc).timestamp_millis();

    Ok(OrbitalModel {
        source: elements.clone(),
        constants,
        epoch_ms,
    })
}

impl OrbitalModel {
    pub fn elements(&self) -> &OrbitalElements {
        &self.source
    }

    pub fn epoch_ms(&self) -> i64 {
        self.epoch_ms
    }

    /// Ground point and speed at `timestamp_ms`, or `None` when SGP4 cannot
    /// produce a position for that instant
    pub fn propagate(&self, timestamp_ms: i64) -> Option<SatelliteState> {
        let minutes = (timestamp_ms - self.epoch_ms) as f64 / 60_000.0;
        let prediction = match self.constants.propagate(MinutesSinceEpoch(minutes)) {
            Ok(prediction) => prediction,
            Err(e) => {
                trace!("SGP4 failed at {} min from epoch: {:?}", minutes, e);
                return None;
            }
        };

        if !prediction
            .position
            .iter()
            .chain(prediction.velocity.iter())
            .all(|v| v.is_finite())
        {
            return None;
        }

        let gmst = greenwich_sidereal_time(timestamp_ms);
        let (lat, lng) = teme_to_geodetic(prediction.position, gmst);
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }

        let [vx, vy, vz] = prediction.velocity;
        let speed_kmh = (vx * vx + vy * vy + vz * vz).sqrt() * SECONDS_PER_HOUR;

        Some(SatelliteState {
            lat,
            lng,
            timestamp_ms,
            speed_kmh: Some(speed_kmh),
        })
    }
}

impl GroundTrack for OrbitalModel {
    fn state_at(&self, timestamp_ms: i64) -> Option<SatelliteState> {
        self.propagate(timestamp_ms)
    }
}

fn validate_line(line: &str, number: char) -> ApiResult<()> {
    if line.len() != TLE_LINE_LEN || !line.is_ascii() {
        return Err(ApiError::InvalidElements(format!(
            "line {} must be {} ASCII characters, got {}",
            number,
            TLE_LINE_LEN,
            line.len()
        )));
    }
    let mut chars = line.chars();
    if chars.next() != Some(number) || chars.next() != Some(' ') {
        return Err(ApiError::InvalidElements(format!(
            "line {} has the wrong line number",
            number
        )));
    }

    let expected = tle_checksum(&line[..TLE_LINE_LEN - 1]);
    let found = line[TLE_LINE_LEN - 1..]
        .chars()
        .next()
        .and_then(|c| c.to_digit(10));
    if found != Some(expected) {
        return Err(ApiError::InvalidElements(format!(
            "line {} checksum mismatch (expected {}, found {:?})",
            number, expected, found
        )));
    }
    Ok(())
}

/// Modulo-10 sum of digits, counting '-' as 1
pub fn tle_checksum(body: &str) -> u32 {
    body.chars()
        .map(|c| match c {
            '-' => 1,
            c => c.to_digit(10).unwrap_or(0),
        })
        .sum::<u32>()
        % 10
}

/// Greenwich mean sidereal time in radians for a UTC instant (IAU 1982)
pub fn greenwich_sidereal_time(timestamp_ms: i64) -> f64 {
    let jd = timestamp_ms as f64 / MS_PER_DAY + UNIX_EPOCH_JD;
    let t = (jd - J2000_JD) / 36_525.0;
    let seconds = -6.2e-6 * t.powi(3)
        + 0.093104 * t.powi(2)
        + (876_600.0 * 3600.0 + 8_640_184.812866) * t
        + 67_310.54841;
    // 240 seconds of time per degree
    (seconds.to_radians() / 240.0).rem_euclid(TAU)
}

/// Rotate a TEME position into the Earth-fixed frame and return geodetic
/// (latitude, longitude) in degrees
fn teme_to_geodetic(position: [f64; 3], gmst: f64) -> (f64, f64) {
    let [x, y, z] = position;
    let r = (x * x + y * y).sqrt();
    let f = (WGS84_A_KM - WGS84_B_KM) / WGS84_A_KM;
    let e2 = 2.0 * f - f * f;

    let lng = (y.atan2(x) - gmst).to_degrees();

    let mut lat = z.atan2(r);
    for _ in 0..GEODETIC_ITERATIONS {
        let sin_lat = lat.sin();
        let c = 1.0 / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        lat = (z + WGS84_A_KM * c * e2 * sin_lat).atan2(r);
    }

    (lat.to_degrees(), normalize_longitude(lng))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vallado's SGP4 verification object 00005
    const VANGUARD_L1: &str =
        "1 00005U 58002B   00179.78495062  .00000023  00000-0  28098-4 0  4753";
    const VANGUARD_L2: &str =
        "2 00005  34.2682 348.7242 1859667 331.7664  19.3264 10.82419157413667";

    const ISS_L1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_L2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn elements(line1: &str, line2: &str) -> OrbitalElements {
        OrbitalElements {
            name: None,
            line1: line1.to_string(),
            line2: line2.to_string(),
            fetched_at_ms: 0,
        }
    }

    #[test]
    fn test_checksum_of_known_lines() {
        assert_eq!(tle_checksum(&ISS_L1[..68]), 7);
        assert_eq!(tle_checksum(&ISS_L2[..68]), 7);
        assert_eq!(tle_checksum(&VANGUARD_L1[..68]), 3);
    }

    #[test]
    fn test_build_model_rejects_bad_checksum() {
        let mut line1 = ISS_L1.to_string();
        line1.replace_range(68..69, "0");
        let err = build_model(&elements(&line1, ISS_L2)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidElements(_)));
    }

    #[test]
    fn test_build_model_rejects_short_line() {
        let err = build_model(&elements(&ISS_L1[..60], ISS_L2)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidElements(_)));
    }

    #[test]
    fn test_build_model_rejects_swapped_lines() {
        let err = build_model(&elements(ISS_L2, ISS_L1)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidElements(_)));
    }

    #[test]
    fn test_build_model_epoch() {
        let model = build_model(&elements(ISS_L1, ISS_L2)).unwrap();
        // 2008 day 264.51782528 = 2008-09-20T12:25:40.104Z
        assert!((model.epoch_ms() - 1_221_913_540_104).abs() <= 1);
    }

    #[test]
    fn test_same_elements_same_model() {
        let a = build_model(&elements(ISS_L1, ISS_L2)).unwrap();
        let b = build_model(&elements(ISS_L1, ISS_L2)).unwrap();
        let t = a.epoch_ms() + 45 * 60_000;
        assert_eq!(a.propagate(t), b.propagate(t));
    }

    #[test]
    fn test_propagate_golden_value_at_epoch() {
        let model = build_model(&elements(VANGUARD_L1, VANGUARD_L2)).unwrap();
        let state = model.propagate(model.epoch_ms()).unwrap();

        // TEME r = (7022.465, -1400.083, 0.040) km, v = (1.894, 6.406, 4.535) km/s
        assert!(state.lat.abs() < 0.01, "lat {}", state.lat);
        assert!((state.lng - 149.9557).abs() < 0.05, "lng {}", state.lng);
        let speed = state.speed_kmh.unwrap();
        assert!((speed - 29_065.76).abs() < 1.0, "speed {}", speed);
    }

    #[test]
    fn test_iss_ground_track_is_plausible() {
        let model = build_model(&elements(ISS_L1, ISS_L2)).unwrap();
        for minutes in (0..180).step_by(7) {
            let state = model.propagate(model.epoch_ms() + minutes * 60_000).unwrap();
            assert!(state.lat.abs() <= 52.0, "lat {}", state.lat);
            assert!(state.lng > -180.0 && state.lng <= 180.0);
            let speed = state.speed_kmh.unwrap();
            assert!((26_000.0..29_500.0).contains(&speed), "speed {}", speed);
        }
    }

    #[test]
    fn test_gmst_at_j2000() {
        // 2000-01-01T12:00:00Z, GMST ~ 280.46 degrees
        let gmst = greenwich_sidereal_time(946_728_000_000).to_degrees();
        assert!((gmst - 280.46).abs() < 0.01, "gmst {}", gmst);
    }
}
