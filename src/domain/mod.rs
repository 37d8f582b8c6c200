/// Domain models for the tracker
use crate::utils::normalize_longitude;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Point on the Earth's surface in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Build a point with its longitude in canonical form
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng: normalize_longitude(lng),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Ground point of the satellite at an instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatelliteState {
    pub lat: f64,
    pub lng: f64,
    pub timestamp_ms: i64,
    pub speed_kmh: Option<f64>,
}

impl SatelliteState {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Where the displayed position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    Live,
    Model,
}

/// Two-line element set as fetched; replaced wholesale on every fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrbitalElements {
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
    pub fetched_at_ms: i64,
}

impl OrbitalElements {
    /// Same orbit, regardless of when it was fetched
    pub fn same_orbit(&self, other: &OrbitalElements) -> bool {
        self.line1 == other.line1 && self.line2 == other.line2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPoint {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
}

impl TargetPoint {
    pub fn new(point: GeoPoint, label: impl Into<String>) -> Self {
        Self {
            lat: point.lat,
            lng: normalize_longitude(point.lng),
            label: label.into(),
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Result of a pass search.
///
/// `threshold_hit == false` means `time_ms` is only the closest approach seen
/// in the lookahead window, not an actual pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassPrediction {
    pub time_ms: i64,
    pub distance_km: f64,
    pub threshold_hit: bool,
}

impl PassPrediction {
    pub fn time_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.time_ms).single()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSample {
    pub lat: f64,
    pub lng: f64,
    pub timestamp_ms: i64,
    pub distance_km: Option<f64>,
}

impl PathSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SpeedMultiplier {
    Normal,
    Fast,
}

impl SpeedMultiplier {
    pub fn factor(self) -> f64 {
        u8::from(self) as f64
    }

    pub fn toggled(self) -> Self {
        match self {
            SpeedMultiplier::Normal => SpeedMultiplier::Fast,
            SpeedMultiplier::Fast => SpeedMultiplier::Normal,
        }
    }
}

impl From<SpeedMultiplier> for u8 {
    fn from(value: SpeedMultiplier) -> Self {
        match value {
            SpeedMultiplier::Normal => 1,
            SpeedMultiplier::Fast => 8,
        }
    }
}

impl TryFrom<u8> for SpeedMultiplier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SpeedMultiplier::Normal),
            8 => Ok(SpeedMultiplier::Fast),
            other => Err(format!("unsupported speed multiplier {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    pub simulated_time_ms: i64,
    pub speed_multiplier: SpeedMultiplier,
}

/// Outcome of a browser geolocation request that did not yield a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeolocationFailure {
    PermissionDenied,
    Unsupported,
    Timeout,
    Unavailable,
}

impl GeolocationFailure {
    pub fn message(self) -> &'static str {
        match self {
            GeolocationFailure::PermissionDenied => "location permission denied",
            GeolocationFailure::Unsupported => "geolocation is not supported by this browser",
            GeolocationFailure::Timeout => "timed out waiting for location",
            GeolocationFailure::Unavailable => "location unavailable",
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}
