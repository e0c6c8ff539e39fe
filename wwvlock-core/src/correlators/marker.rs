//! Fast/slow marker fusion.
//!
//! A marker seen by both the fast accumulator and the slow FFT path within
//! the match window is confirmed HIGH. A marker seen by one path is held
//! pending; if its counterpart never arrives it is emitted LOW ("orphaned")
//! and routed to the sync detector as P-marker evidence.

use std::collections::VecDeque;

use crate::events::{CorrelatedMarkerEvent, MarkerConfidence, MarkerEvent, SlowMarkerEvent};
use crate::tunables::MarkerDetectorTunables;

#[derive(Debug, Clone)]
struct PendingFast {
    timestamp_ms: f64,
    duration_ms: f64,
}

#[derive(Debug, Clone)]
struct PendingSlow {
    timestamp_ms: f64,
    duration_ms: f64,
}

pub struct MarkerCorrelator {
    params: MarkerDetectorTunables,
    pending_fast: VecDeque<PendingFast>,
    pending_slow: VecDeque<PendingSlow>,
    count: u64,
}

impl MarkerCorrelator {
    pub fn new(params: MarkerDetectorTunables) -> Self {
        Self {
            params,
            pending_fast: VecDeque::new(),
            pending_slow: VecDeque::new(),
            count: 0,
        }
    }

    /// Fast-path marker arrived.
    pub fn on_fast(&mut self, event: &MarkerEvent) -> Option<CorrelatedMarkerEvent> {
        let window = self.params.match_window_ms;
        if let Some(pos) = self
            .pending_slow
            .iter()
            .position(|s| (s.timestamp_ms - event.timestamp_ms).abs() <= window)
        {
            self.pending_slow.remove(pos);
            return Some(self.confirmed(event.timestamp_ms, event.duration_ms));
        }
        self.pending_fast.push_back(PendingFast {
            timestamp_ms: event.timestamp_ms,
            duration_ms: event.duration_ms,
        });
        None
    }

    /// Slow-path marker arrived.
    pub fn on_slow(&mut self, event: &SlowMarkerEvent) -> Option<CorrelatedMarkerEvent> {
        let window = self.params.match_window_ms;
        if let Some(pos) = self
            .pending_fast
            .iter()
            .position(|f| (f.timestamp_ms - event.timestamp_ms).abs() <= window)
        {
            // Fast-path timing is sharper; the fused event keeps it.
            let fast = self.pending_fast.remove(pos).unwrap();
            return Some(self.confirmed(fast.timestamp_ms, fast.duration_ms));
        }
        self.pending_slow.push_back(PendingSlow {
            timestamp_ms: event.timestamp_ms,
            duration_ms: event.duration_ms,
        });
        None
    }

    /// Expire unmatched markers into LOW-confidence orphans.
    pub fn on_clock(&mut self, now_ms: f64) -> Vec<CorrelatedMarkerEvent> {
        let expiry = self.params.pending_expiry_ms;
        let mut orphans = Vec::new();

        while let Some(front) = self.pending_fast.front() {
            if now_ms - front.timestamp_ms < expiry {
                break;
            }
            let f = self.pending_fast.pop_front().unwrap();
            orphans.push(self.orphaned(f.timestamp_ms, f.duration_ms));
        }
        while let Some(front) = self.pending_slow.front() {
            if now_ms - front.timestamp_ms < expiry {
                break;
            }
            let s = self.pending_slow.pop_front().unwrap();
            orphans.push(self.orphaned(s.timestamp_ms, s.duration_ms));
        }
        orphans
    }

    fn confirmed(&mut self, timestamp_ms: f64, duration_ms: f64) -> CorrelatedMarkerEvent {
        self.count += 1;
        CorrelatedMarkerEvent {
            number: self.count,
            timestamp_ms,
            duration_ms,
            confidence: MarkerConfidence::High,
        }
    }

    fn orphaned(&mut self, timestamp_ms: f64, duration_ms: f64) -> CorrelatedMarkerEvent {
        self.count += 1;
        CorrelatedMarkerEvent {
            number: self.count,
            timestamp_ms,
            duration_ms,
            confidence: MarkerConfidence::Low,
        }
    }

    pub fn apply_tunables(&mut self, params: &MarkerDetectorTunables) {
        self.params = *params;
    }

    pub fn reset(&mut self) {
        self.pending_fast.clear();
        self.pending_slow.clear();
    }
}

impl std::fmt::Debug for MarkerCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerCorrelator")
            .field("pending_fast", &self.pending_fast.len())
            .field("pending_slow", &self.pending_slow.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(ts: f64) -> MarkerEvent {
        MarkerEvent {
            number: 1,
            timestamp_ms: ts,
            accumulated_energy: 10.0,
            peak_energy: 1.0,
            duration_ms: 800.0,
            since_last_ms: 0.0,
        }
    }

    fn slow(ts: f64) -> SlowMarkerEvent {
        SlowMarkerEvent {
            timestamp_ms: ts,
            duration_ms: 850.0,
            peak_snr_db: 12.0,
        }
    }

    #[test]
    fn test_agreement_confirms_high() {
        let mut corr = MarkerCorrelator::new(MarkerDetectorTunables::default());
        assert!(corr.on_fast(&fast(60_000.0)).is_none());
        let ev = corr.on_slow(&slow(60_200.0)).expect("should fuse");
        assert_eq!(ev.confidence, MarkerConfidence::High);
        assert_eq!(ev.timestamp_ms, 60_000.0);
        assert!(corr.on_clock(70_000.0).is_empty());
    }

    #[test]
    fn test_slow_first_also_fuses() {
        let mut corr = MarkerCorrelator::new(MarkerDetectorTunables::default());
        assert!(corr.on_slow(&slow(59_900.0)).is_none());
        let ev = corr.on_fast(&fast(60_000.0)).expect("should fuse");
        assert_eq!(ev.confidence, MarkerConfidence::High);
    }

    #[test]
    fn test_unmatched_expires_as_orphan() {
        let mut corr = MarkerCorrelator::new(MarkerDetectorTunables::default());
        corr.on_fast(&fast(60_000.0));
        assert!(corr.on_clock(61_000.0).is_empty());
        let orphans = corr.on_clock(63_000.0);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].confidence, MarkerConfidence::Low);
    }

    #[test]
    fn test_out_of_window_does_not_fuse() {
        let mut corr = MarkerCorrelator::new(MarkerDetectorTunables::default());
        corr.on_fast(&fast(60_000.0));
        assert!(corr.on_slow(&slow(61_000.0)).is_none());
        // Both eventually expire as separate orphans.
        let orphans = corr.on_clock(65_000.0);
        assert_eq!(orphans.len(), 2);
    }
}
