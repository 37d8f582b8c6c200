//! Pass prediction: when does the ground track next come within a threshold
//! distance of a target point?
//!
//! The search runs a coarse scan over the lookahead window and, around each
//! coarse sample that falls within a looser detection threshold, a fine scan
//! that looks for the earliest instant meeting the real threshold.

use crate::config::PredictionConfig;
use crate::domain::{GeoPoint, PassPrediction};
use crate::orbit::GroundTrack;
use crate::utils::haversine_km;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    time_ms: i64,
    distance_km: f64,
}

enum Refinement {
    Hit(Sample),
    Miss { best: Option<Sample>, window_end_ms: i64 },
}

/// Distance from the ground point at `time_ms` to `target`
pub fn distance_at<T: GroundTrack + ?Sized>(
    track: &T,
    target: &GeoPoint,
    time_ms: i64,
) -> Option<f64> {
    let state = track.state_at(time_ms)?;
    let d = haversine_km(&state.point(), target);
    d.is_finite().then_some(d)
}

/// Find the next pass over `target` within `threshold_km`.
///
/// Returns the earliest qualifying instant with `threshold_hit = true`, or the
/// closest sample seen in the lookahead window with `threshold_hit = false`,
/// or `None` when the track could not be evaluated at all.
pub fn predict_pass<T: GroundTrack + ?Sized>(
    track: &T,
    target: &GeoPoint,
    threshold_km: f64,
    now_ms: i64,
    config: &PredictionConfig,
) -> Option<PassPrediction> {
    let coarse_threshold_km = threshold_km + config.coarse_margin_km;
    let end_ms = now_ms.saturating_add(config.lookahead_ms);
    let mut best: Option<Sample> = None;

    let mut t = now_ms;
    while t <= end_ms {
        let Some(distance_km) = distance_at(track, target, t) else {
            t += config.coarse_step_ms;
            continue;
        };
        best = closer(best, Some(Sample { time_ms: t, distance_km }));

        if distance_km <= coarse_threshold_km {
            match refine(track, target, threshold_km, t, now_ms, config) {
                Refinement::Hit(hit) => {
                    debug!(
                        "Pass found at {} ({:.1} km, coarse hit at {})",
                        hit.time_ms, hit.distance_km, t
                    );
                    return Some(PassPrediction {
                        time_ms: hit.time_ms,
                        distance_km: hit.distance_km,
                        threshold_hit: true,
                    });
                }
                Refinement::Miss {
                    best: refined,
                    window_end_ms,
                } => {
                    best = closer(best, refined);
                    t = window_end_ms;
                }
            }
        }
        t += config.coarse_step_ms;
    }

    debug!(
        "No pass within {:.0} km in lookahead window, closest {:?}",
        threshold_km, best
    );
    best.map(|s| PassPrediction {
        time_ms: s.time_ms,
        distance_km: s.distance_km,
        threshold_hit: false,
    })
}

// The window is fixed at +/- refine_window_ms around the coarse hit whatever
// the geometry; a crossing just outside it is only caught by a later coarse hit.
fn refine<T: GroundTrack + ?Sized>(
    track: &T,
    target: &GeoPoint,
    threshold_km: f64,
    center_ms: i64,
    now_ms: i64,
    config: &PredictionConfig,
) -> Refinement {
    let start_ms = (center_ms - config.refine_window_ms).max(now_ms);
    let window_end_ms = center_ms + config.refine_window_ms;
    let mut best: Option<Sample> = None;

    let mut t = start_ms;
    while t <= window_end_ms {
        if let Some(distance_km) = distance_at(track, target, t) {
            let sample = Sample {
                time_ms: t,
                distance_km,
            };
            if distance_km <= threshold_km {
                return Refinement::Hit(sample);
            }
            best = closer(best, Some(sample));
        }
        t += config.fine_step_ms;
    }

    Refinement::Miss {
        best,
        window_end_ms,
    }
}

fn closer(a: Option<Sample>, b: Option<Sample>) -> Option<Sample> {
    match (a, b) {
        (Some(a), Some(b)) if b.distance_km < a.distance_km => Some(b),
        (Some(a), _) => Some(a),
        (None, b) => b,
    }
}
