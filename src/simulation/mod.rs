//! Simulated ground-track path from now to the predicted pass, and the
//! virtual clock that plays it back.

use crate::domain::{GeoPoint, PassPrediction, PathSample, PlaybackState, SpeedMultiplier};
use crate::orbit::GroundTrack;
use crate::utils::{haversine_km, normalize_longitude};
use serde::Serialize;

/// Longitude jump between consecutive samples treated as an antimeridian crossing
pub const ANTIMERIDIAN_JUMP_DEG: f64 = 180.0;

/// Time-ascending ground-track samples; always at least two
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SimulationPath {
    samples: Vec<PathSample>,
}

impl SimulationPath {
    /// `None` unless there are at least two samples in strictly ascending time
    pub fn from_samples(samples: Vec<PathSample>) -> Option<Self> {
        if samples.len() < 2
            || samples
                .windows(2)
                .any(|w| w[1].timestamp_ms <= w[0].timestamp_ms)
        {
            return None;
        }
        Some(Self { samples })
    }

    pub fn samples(&self) -> &[PathSample] {
        &self.samples
    }

    pub fn start_ms(&self) -> i64 {
        self.samples[0].timestamp_ms
    }

    pub fn end_ms(&self) -> i64 {
        self.samples[self.samples.len() - 1].timestamp_ms
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms() - self.start_ms()
    }

    pub fn last(&self) -> &PathSample {
        &self.samples[self.samples.len() - 1]
    }

    /// Linear interpolation between the bracketing samples, clamped to the
    /// first and last sample outside the path's time range
    pub fn position_at(&self, time_ms: i64) -> GeoPoint {
        if time_ms <= self.start_ms() {
            return self.samples[0].point();
        }
        if time_ms >= self.end_ms() {
            return self.last().point();
        }

        let idx = self.samples.partition_point(|s| s.timestamp_ms <= time_ms);
        let a = &self.samples[idx - 1];
        let b = &self.samples[idx];
        let ratio = (time_ms - a.timestamp_ms) as f64 / (b.timestamp_ms - a.timestamp_ms) as f64;

        let mut dlng = b.lng - a.lng;
        if dlng > ANTIMERIDIAN_JUMP_DEG {
            dlng -= 360.0;
        } else if dlng < -ANTIMERIDIAN_JUMP_DEG {
            dlng += 360.0;
        }

        GeoPoint {
            lat: a.lat + (b.lat - a.lat) * ratio,
            lng: normalize_longitude(a.lng + dlng * ratio),
        }
    }

    /// Split into polylines wherever consecutive longitudes jump by more than 180 degrees
    pub fn segments(&self) -> Vec<Vec<GeoPoint>> {
        let mut segments = Vec::new();
        let mut current: Vec<GeoPoint> = Vec::new();
        for sample in &self.samples {
            if let Some(prev) = current.last() {
                if (sample.lng - prev.lng).abs() > ANTIMERIDIAN_JUMP_DEG {
                    segments.push(std::mem::take(&mut current));
                }
            }
            current.push(sample.point());
        }
        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }
}

/// Sample the ground track every `step_ms` from `now_ms` up to the predicted
/// pass, stopping early once a sample is within `threshold_km` of the target.
pub fn build_path<T: GroundTrack + ?Sized>(
    track: &T,
    target: &GeoPoint,
    prediction: &PassPrediction,
    threshold_km: f64,
    now_ms: i64,
    step_ms: i64,
) -> Option<SimulationPath> {
    if prediction.time_ms <= now_ms || step_ms <= 0 {
        return None;
    }

    let sample_at = |t: i64| {
        track.state_at(t).map(|state| PathSample {
            lat: state.lat,
            lng: state.lng,
            timestamp_ms: t,
            distance_km: Some(haversine_km(&state.point(), target)),
        })
    };

    let mut samples = Vec::new();
    let mut t = now_ms;
    while t <= prediction.time_ms {
        if let Some(sample) = sample_at(t) {
            let reached = sample.distance_km.is_some_and(|d| d <= threshold_km);
            samples.push(sample);
            if reached {
                break;
            }
        }
        t += step_ms;
    }

    let lags_pass = samples
        .last()
        .map_or(true, |s| s.timestamp_ms < prediction.time_ms);
    if lags_pass {
        if let Some(sample) = sample_at(prediction.time_ms) {
            samples.push(sample);
        }
    }

    SimulationPath::from_samples(samples)
}

/// User-facing playback controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Toggle,
    Reset,
    ToggleSpeed,
}

impl std::str::FromStr for PlaybackCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(PlaybackCommand::Play),
            "pause" => Ok(PlaybackCommand::Pause),
            "toggle" => Ok(PlaybackCommand::Toggle),
            "reset" => Ok(PlaybackCommand::Reset),
            "speed" => Ok(PlaybackCommand::ToggleSpeed),
            other => Err(format!("unknown playback action '{}'", other)),
        }
    }
}

/// Virtual playback clock over a path, independent of frame rate
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    state: PlaybackState,
    start_ms: i64,
    end_ms: i64,
    base_scale: f64,
}

impl Player {
    /// Stopped at the start of `path`, at 1x
    pub fn new(path: &SimulationPath, base_scale: f64) -> Self {
        Self {
            state: PlaybackState {
                is_playing: false,
                simulated_time_ms: path.start_ms(),
                speed_multiplier: SpeedMultiplier::Normal,
            },
            start_ms: path.start_ms(),
            end_ms: path.end_ms(),
            base_scale,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn at_end(&self) -> bool {
        self.state.simulated_time_ms >= self.end_ms
    }

    pub fn play(&mut self) {
        if self.at_end() {
            self.state.simulated_time_ms = self.start_ms;
        }
        self.state.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.state.is_playing = false;
    }

    pub fn toggle(&mut self) {
        if self.state.is_playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn reset(&mut self) {
        self.state.simulated_time_ms = self.start_ms;
        self.state.is_playing = false;
    }

    pub fn toggle_speed(&mut self) {
        self.state.speed_multiplier = self.state.speed_multiplier.toggled();
    }

    pub fn apply(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Play => self.play(),
            PlaybackCommand::Pause => self.pause(),
            PlaybackCommand::Toggle => self.toggle(),
            PlaybackCommand::Reset => self.reset(),
            PlaybackCommand::ToggleSpeed => self.toggle_speed(),
        }
    }

    /// Advance by `elapsed_real_ms` of wall time; stops at the path end
    pub fn advance(&mut self, elapsed_real_ms: u64) {
        if !self.state.is_playing {
            return;
        }
        let delta =
            (elapsed_real_ms as f64 * self.base_scale * self.state.speed_multiplier.factor())
                .round() as i64;
        let next = self.state.simulated_time_ms.saturating_add(delta);
        if next >= self.end_ms {
            self.state.simulated_time_ms = self.end_ms;
            self.state.is_playing = false;
        } else {
            self.state.simulated_time_ms = next;
        }
    }
}
