/// In-memory position history used for trail rendering
use crate::domain::{GeoPoint, SatelliteState, StateSource};
use std::collections::{HashMap, VecDeque};

/// Capped, time-ordered trail of satellite states.
///
/// Each source is rate limited on its own: a state is accepted only if it is
/// at least `min_interval_ms` newer than the last one accepted from the same
/// source. States are kept ordered by timestamp and the oldest are evicted
/// past `capacity`.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    entries: VecDeque<SatelliteState>,
    capacity: usize,
    min_interval_ms: i64,
    last_accepted: HashMap<StateSource, i64>,
}

impl PositionHistory {
    pub fn new(capacity: usize, min_interval_ms: i64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            min_interval_ms: min_interval_ms.max(0),
            last_accepted: HashMap::new(),
        }
    }

    /// Insert a state from `source`, returning whether it was kept
    pub fn push(&mut self, state: SatelliteState, source: StateSource) -> bool {
        if let Some(&last) = self.last_accepted.get(&source) {
            if state.timestamp_ms <= last || state.timestamp_ms - last < self.min_interval_ms {
                return false;
            }
        }

        let at = self
            .entries
            .partition_point(|e| e.timestamp_ms < state.timestamp_ms);
        if self
            .entries
            .get(at)
            .is_some_and(|e| e.timestamp_ms == state.timestamp_ms)
        {
            return false;
        }
        // older than everything in a full trail
        if at == 0 && self.entries.len() >= self.capacity {
            return false;
        }

        self.entries.insert(at, state);
        self.last_accepted.insert(source, state.timestamp_ms);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Oldest first
    pub fn entries(&self) -> Vec<SatelliteState> {
        self.entries.iter().copied().collect()
    }

    pub fn trail(&self) -> Vec<GeoPoint> {
        self.entries.iter().map(SatelliteState::point).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(timestamp_ms: i64) -> SatelliteState {
        SatelliteState {
            lat: 0.0,
            lng: (timestamp_ms / 1000) as f64 % 180.0,
            timestamp_ms,
            speed_kmh: None,
        }
    }

    fn stamps(history: &PositionHistory) -> Vec<i64> {
        history.entries().iter().map(|s| s.timestamp_ms).collect()
    }

    #[test]
    fn test_push_respects_min_interval() {
        let mut history = PositionHistory::new(10, 10_000);
        assert!(history.push(state(0), StateSource::Live));
        assert!(!history.push(state(9_999), StateSource::Live));
        assert!(history.push(state(10_000), StateSource::Live));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_push_rejects_out_of_order_within_source() {
        let mut history = PositionHistory::new(10, 0);
        assert!(history.push(state(5_000), StateSource::Model));
        assert!(!history.push(state(5_000), StateSource::Model));
        assert!(!history.push(state(1_000), StateSource::Model));
        assert_eq!(stamps(&history), vec![5_000]);
    }

    #[test]
    fn test_sources_are_gated_independently() {
        let mut history = PositionHistory::new(10, 5_000);
        assert!(history.push(state(10_000), StateSource::Model));
        // a live sample slightly older than the synthetic one still lands, in order
        assert!(history.push(state(9_600), StateSource::Live));
        assert!(history.push(state(15_000), StateSource::Model));
        assert!(!history.push(state(12_000), StateSource::Live));
        assert!(history.push(state(14_600), StateSource::Live));
        assert_eq!(stamps(&history), vec![9_600, 10_000, 14_600, 15_000]);
        // identical instants are not stored twice
        assert!(history.push(state(20_000), StateSource::Live));
        assert!(!history.push(state(20_000), StateSource::Model));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = PositionHistory::new(3, 0);
        for t in 1..=5 {
            history.push(state(t * 1000), StateSource::Model);
        }
        assert_eq!(stamps(&history), vec![3000, 4000, 5000]);
        assert_eq!(history.trail().len(), 3);
        // older than the whole full trail
        assert!(!history.push(state(500), StateSource::Live));
    }
}
