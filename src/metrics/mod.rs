/// Derived HUD metrics: ETA, orbits remaining, simulation progress
use crate::domain::{GeoPoint, PassPrediction, PlaybackState};
use crate::simulation::SimulationPath;
use crate::utils::{format_distance, format_eta, format_lat_lng};
use serde::Serialize;

/// Mean ISS orbital period
pub const MEAN_ORBITAL_PERIOD_MIN: f64 = 92.0;

/// Ground speed assumed when there is no prediction to time against
pub const ASSUMED_ORBITAL_SPEED_KMH: f64 = 27_600.0;

/// Time until the pass; falls back to distance over assumed speed
pub fn eta_ms(
    prediction: Option<&PassPrediction>,
    distance_to_target_km: Option<f64>,
    now_ms: i64,
) -> Option<i64> {
    if let Some(prediction) = prediction {
        return Some((prediction.time_ms - now_ms).max(0));
    }
    let km = distance_to_target_km.filter(|km| km.is_finite() && *km >= 0.0)?;
    Some((km / ASSUMED_ORBITAL_SPEED_KMH * 3_600_000.0).round() as i64)
}

/// Approximate orbits left before the ETA elapses
pub fn remaining_orbits(eta_ms: Option<i64>) -> Option<f64> {
    eta_ms.map(|ms| ms as f64 / 60_000.0 / MEAN_ORBITAL_PERIOD_MIN)
}

pub fn progress_ratio(path: &SimulationPath, playback: &PlaybackState) -> f64 {
    let total = path.duration_ms();
    if total <= 0 {
        return 1.0;
    }
    ((playback.simulated_time_ms - path.start_ms()) as f64 / total as f64).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HudMetrics {
    pub distance_km: Option<f64>,
    pub distance_text: String,
    pub eta_ms: Option<i64>,
    pub eta_text: String,
    pub orbits_remaining: Option<f64>,
    pub orbits_text: String,
    pub pass_found: Option<bool>,
    pub progress: Option<f64>,
    pub simulated_position: Option<GeoPoint>,
    pub simulated_position_text: Option<String>,
}

/// Inputs for one HUD refresh
pub struct MetricsInput<'a> {
    pub now_ms: i64,
    pub threshold_km: f64,
    pub has_target: bool,
    pub distance_to_target_km: Option<f64>,
    pub prediction: Option<&'a PassPrediction>,
    pub path: Option<&'a SimulationPath>,
    pub playback: Option<&'a PlaybackState>,
}

pub fn hud_metrics(input: &MetricsInput<'_>) -> HudMetrics {
    if !input.has_target {
        return HudMetrics {
            distance_km: None,
            distance_text: "--".to_string(),
            eta_ms: None,
            eta_text: "Select a target".to_string(),
            orbits_remaining: None,
            orbits_text: "--".to_string(),
            pass_found: None,
            progress: None,
            simulated_position: None,
            simulated_position_text: None,
        };
    }

    let eta = eta_ms(input.prediction, input.distance_to_target_km, input.now_ms);
    let orbits = remaining_orbits(eta);

    let eta_text = match input.prediction {
        Some(p) if p.threshold_hit => format!("Next pass in {}", format_eta(eta)),
        Some(p) => format!(
            "No pass within {}; closest approach {} in {}",
            format_distance(Some(input.threshold_km)),
            format_distance(Some(p.distance_km)),
            format_eta(eta)
        ),
        None if eta.is_some() => format!("~{} (estimate)", format_eta(eta)),
        None => "--".to_string(),
    };

    let (progress, simulated_position) = match (input.path, input.playback) {
        (Some(path), Some(playback)) => (
            Some(progress_ratio(path, playback)),
            Some(path.position_at(playback.simulated_time_ms)),
        ),
        _ => (None, None),
    };

    HudMetrics {
        distance_km: input.distance_to_target_km,
        distance_text: format_distance(input.distance_to_target_km),
        eta_ms: eta,
        eta_text,
        orbits_remaining: orbits,
        orbits_text: orbits
            .map(|o| format!("{:.1} orbits", o))
            .unwrap_or_else(|| "--".to_string()),
        pass_found: input.prediction.map(|p| p.threshold_hit),
        progress,
        simulated_position,
        simulated_position_text: simulated_position.as_ref().map(format_lat_lng),
    }
}
