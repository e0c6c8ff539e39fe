//! Phase lock on the one-minute broadcast cycle.
//!
//! The sync detector fuses weighted evidence (on-phase ticks, confirmed
//! markers, orphaned P-markers, tick holes at seconds 29/59, the combined
//! hole-then-marker minute pattern) into a single confidence score and a
//! four-state machine. A periodic check on the sample clock drives decay and
//! staleness independently of event arrivals, so the lock degrades during
//! signal gaps without any external prodding.

use std::collections::VecDeque;

use crate::calib::{MINUTE_MS, SECOND_MS};
use crate::clock::{circular_distance_ms, wrap_ms};
use crate::events::{
    CorrelatedMarkerEvent, SyncContext, SyncState, SyncTransition, TickEvent,
};
use crate::tunables::SyncDetectorTunables;

/// Periodic check cadence on the sample clock.
const CHECK_INTERVAL_MS: f64 = 100.0;

/// Recent-tick retention for hole detection.
const TICK_RETENTION_MS: f64 = 5000.0;

/// Margin past the end of a hole second before it is evaluated, covering
/// detector latency.
const HOLE_EVAL_MARGIN_MS: f64 = 300.0;

/// Window after a second-59 hole in which a marker completes the combined
/// minute pattern.
const COMBINED_WINDOW_MS: f64 = 2500.0;

pub struct SyncDetector {
    params: SyncDetectorTunables,

    state: SyncState,
    confidence: f64,
    last_marker_ms: Option<f64>,
    consecutive_good_intervals: u32,
    confirmed_marker_count: u32,

    last_positive_ms: f64,
    next_check_ms: f64,
    last_hole_eval_ms: Option<f64>,
    hole_at_59_ms: Option<f64>,

    pending_tick: Option<TickEvent>,
    recent_ticks: VecDeque<f64>,

    transitions: Vec<SyncTransition>,
}

impl SyncDetector {
    pub fn new(params: SyncDetectorTunables) -> Self {
        Self {
            params,
            state: SyncState::None,
            confidence: 0.0,
            last_marker_ms: None,
            consecutive_good_intervals: 0,
            confirmed_marker_count: 0,
            last_positive_ms: 0.0,
            next_check_ms: CHECK_INTERVAL_MS,
            last_hole_eval_ms: None,
            hole_at_59_ms: None,
            pending_tick: None,
            recent_ticks: VecDeque::new(),
            transitions: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Evidence inputs
    // ------------------------------------------------------------------

    /// A valid tick from the tick detector.
    pub fn on_tick(&mut self, event: &TickEvent) {
        self.pending_tick = Some(event.clone());
        self.recent_ticks.push_back(event.leading_edge_ms);
        while self
            .recent_ticks
            .front()
            .map_or(false, |&t| event.leading_edge_ms - t > TICK_RETENTION_MS)
        {
            self.recent_ticks.pop_front();
        }

        // Interval chain: ~1000 ms spacing counts as a good interval.
        if (event.interval_ms - SECOND_MS).abs() <= self.params.tick_tolerance_ms {
            self.consecutive_good_intervals += 1;
        } else if event.interval_ms > 0.0 {
            self.consecutive_good_intervals = 0;
        }

        if let Some(anchor) = self.last_marker_ms {
            let phase = wrap_ms(event.leading_edge_ms - anchor, SECOND_MS);
            let distance = phase.min(SECOND_MS - phase);
            if distance <= self.params.tick_tolerance_ms {
                self.bump(self.params.weight_tick, event.leading_edge_ms);
            } else {
                self.penalize(self.params.weight_tick);
            }
            self.update_state(event.leading_edge_ms);
        }
    }

    /// A confirmed (HIGH) marker from the marker correlator.
    pub fn on_confirmed_marker(&mut self, event: &CorrelatedMarkerEvent) {
        let now = event.timestamp_ms;
        match self.last_marker_ms {
            None => {
                // First marker installs the anchor. Confidence is floored,
                // not overwritten: after a stream reset the machine may
                // re-anchor while still carrying residual confidence.
                self.last_marker_ms = Some(now);
                self.last_hole_eval_ms = Some(now);
                self.confirmed_marker_count += 1;
                self.confidence = self.confidence.max(self.params.tentative_init);
                self.last_positive_ms = now;
                if self.state == SyncState::None {
                    self.transition(SyncState::Tentative, now);
                }
            }
            Some(anchor) => {
                let distance = circular_distance_ms(now, anchor, MINUTE_MS);
                if distance <= self.params.marker_tolerance_ms {
                    self.confirmed_marker_count += 1;
                    self.bump(self.params.weight_marker, now);
                    self.update_anchor(anchor, now);

                    // Hole at 59 followed by this marker completes the
                    // minute pattern.
                    if let Some(hole_ms) = self.hole_at_59_ms {
                        if now - hole_ms <= COMBINED_WINDOW_MS {
                            self.bump(self.params.weight_combined, now);
                            self.hole_at_59_ms = None;
                        }
                    }

                    if self.state == SyncState::Recovering
                        && self.confidence >= self.params.locked_threshold
                    {
                        self.transition(SyncState::Locked, now);
                    }
                } else {
                    self.penalize(self.params.weight_marker);
                }
            }
        }
        self.pending_tick = None;
        self.update_state(now);
    }

    /// An orphaned (LOW) marker: P-marker evidence. Adjusts confidence only
    /// once an anchor exists; a single-path sighting is too weak to start a
    /// lock on its own.
    pub fn on_p_marker(&mut self, event: &CorrelatedMarkerEvent) {
        let Some(anchor) = self.last_marker_ms else {
            return;
        };
        let distance = circular_distance_ms(event.timestamp_ms, anchor, MINUTE_MS);
        if distance <= self.params.p_marker_tolerance_ms {
            self.bump(self.params.weight_p_marker, event.timestamp_ms);
        } else {
            self.penalize(self.params.weight_p_marker);
        }
        self.update_state(event.timestamp_ms);
    }

    // ------------------------------------------------------------------
    // Periodic check
    // ------------------------------------------------------------------

    /// Drive decay, staleness, and hole detection from the sample clock.
    /// Call at least once per 100 ms of stream time.
    pub fn on_clock(&mut self, now_ms: f64) {
        while self.next_check_ms <= now_ms {
            let at = self.next_check_ms;
            self.periodic_check(at);
            self.next_check_ms += CHECK_INTERVAL_MS;
        }
    }

    fn periodic_check(&mut self, now_ms: f64) {
        if self.state != SyncState::None {
            let decay = match self.state {
                SyncState::Recovering => self.params.decay_recovering,
                _ => self.params.decay_normal,
            };
            self.confidence = (self.confidence - decay).max(0.0);
        }

        self.check_tick_holes(now_ms);

        if self.state == SyncState::Locked
            && now_ms - self.last_positive_ms > self.params.staleness_ms
        {
            self.transition(SyncState::Recovering, now_ms);
        }

        self.update_state(now_ms);
    }

    /// Seconds 29 and 59 of the minute carry no tick. Silence there, with
    /// the neighboring second active, is positive evidence; a tick there is
    /// negative evidence.
    ///
    /// Hole windows are tracked in absolute stream time so the minute-by-
    /// minute anchor re-snap does not skip or repeat a window.
    fn check_tick_holes(&mut self, now_ms: f64) {
        let Some(anchor) = self.last_marker_ms else {
            return;
        };
        let Some(last_eval) = self.last_hole_eval_ms else {
            return;
        };

        let eval_until = now_ms - HOLE_EVAL_MARGIN_MS;
        // Recent-tick retention bounds how far back a window can still be
        // judged.
        let mut cursor = last_eval.max(now_ms - TICK_RETENTION_MS + SECOND_MS);

        loop {
            let hole_end = Self::next_hole_end_after(anchor, cursor);
            if hole_end > eval_until {
                break;
            }
            cursor = hole_end;

            let hole_start = hole_end - SECOND_MS;
            let prev_start = hole_start - SECOND_MS;
            let tick_in_hole = self
                .recent_ticks
                .iter()
                .any(|&t| t >= hole_start && t < hole_end);
            let tick_before = self
                .recent_ticks
                .iter()
                .any(|&t| t >= prev_start && t < hole_start);

            if tick_in_hole {
                self.penalize(self.params.weight_tick_hole);
            } else if tick_before {
                self.bump(self.params.weight_tick_hole, now_ms);
                let second_of_minute = wrap_ms(hole_end - anchor, MINUTE_MS);
                if second_of_minute < SECOND_MS / 2.0
                    || second_of_minute > MINUTE_MS - SECOND_MS / 2.0
                {
                    // Hole ending on the minute boundary: second 59.
                    self.hole_at_59_ms = Some(hole_end);
                }
            }
        }
        self.last_hole_eval_ms = Some(cursor.max(last_eval));
    }

    /// Next end-of-hole-second timestamp strictly after `after_ms`, on the
    /// anchor's minute grid: holes end at anchor + k*60s + 30s and + 60s.
    fn next_hole_end_after(anchor: f64, after_ms: f64) -> f64 {
        let k = ((after_ms - anchor) / MINUTE_MS).floor();
        let mut next = f64::INFINITY;
        for kk in [k - 1.0, k, k + 1.0] {
            for end in [30.0 * SECOND_MS, 60.0 * SECOND_MS] {
                let t = anchor + kk * MINUTE_MS + end;
                if t > after_ms && t < next {
                    next = t;
                }
            }
        }
        next
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    fn update_state(&mut self, now_ms: f64) {
        match self.state {
            SyncState::None => {}
            SyncState::Tentative => {
                if self.confidence >= self.params.locked_threshold
                    && self.confirmed_marker_count >= 1
                    && self.consecutive_good_intervals >= self.params.good_intervals_needed
                {
                    self.transition(SyncState::Locked, now_ms);
                } else if self.confidence <= 0.0 {
                    self.clear_lock_state();
                    self.transition(SyncState::None, now_ms);
                }
            }
            SyncState::Locked => {
                if self.confidence < self.params.min_retain {
                    self.transition(SyncState::Recovering, now_ms);
                }
            }
            SyncState::Recovering => {
                if self.confidence < self.params.tentative_init {
                    self.transition(SyncState::Tentative, now_ms);
                }
            }
        }
    }

    fn clear_lock_state(&mut self) {
        self.last_marker_ms = None;
        self.confirmed_marker_count = 0;
        self.consecutive_good_intervals = 0;
        self.last_hole_eval_ms = None;
        self.hole_at_59_ms = None;
        self.confidence = 0.0;
    }

    fn bump(&mut self, weight: f64, now_ms: f64) {
        self.confidence = (self.confidence + weight).min(1.0);
        self.last_positive_ms = now_ms;
    }

    fn penalize(&mut self, weight: f64) {
        self.confidence = (self.confidence - weight).max(0.0);
    }

    /// Anchor update on a consistent marker: project the old anchor forward
    /// a whole number of minutes, then blend by the smoothing factor
    /// (0 snaps to the observed timestamp).
    fn update_anchor(&mut self, anchor: f64, observed_ms: f64) {
        let k = ((observed_ms - anchor) / MINUTE_MS).round();
        let projected = anchor + k * MINUTE_MS;
        let s = self.params.anchor_smoothing.clamp(0.0, 1.0);
        self.last_marker_ms = Some(s * projected + (1.0 - s) * observed_ms);
    }

    fn transition(&mut self, new_state: SyncState, now_ms: f64) {
        if new_state == self.state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;
        self.transitions.push(SyncTransition {
            timestamp_ms: now_ms,
            old_state,
            new_state,
            confidence: self.confidence,
            last_marker_ms: self.last_marker_ms,
            confirmed_marker_count: self.confirmed_marker_count,
        });
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn last_marker_ms(&self) -> Option<f64> {
        self.last_marker_ms
    }

    pub fn context(&self) -> SyncContext {
        SyncContext {
            state: self.state,
            confidence: self.confidence,
            last_marker_ms: self.last_marker_ms,
            consecutive_good_intervals: self.consecutive_good_intervals,
            confirmed_marker_count: self.confirmed_marker_count,
        }
    }

    /// Read-and-clear handoff of the tick immediately preceding a marker.
    /// All read-then-clear semantics live here.
    pub fn take_pending_tick(&mut self) -> Option<TickEvent> {
        self.pending_tick.take()
    }

    /// Drain state transitions recorded since the last call.
    pub fn drain_transitions(&mut self) -> Vec<SyncTransition> {
        std::mem::take(&mut self.transitions)
    }

    pub fn apply_tunables(&mut self, params: &SyncDetectorTunables) {
        self.params = *params;
    }

    /// Stream discontinuity: the anchor's phase no longer matches the
    /// broadcast, so it is dropped, and a held lock degrades to RECOVERING.
    /// Confidence survives capped at `min_retain`; the next confirmed marker
    /// re-anchors without starting from zero.
    pub fn on_stream_reset(&mut self, now_ms: f64) {
        if self.state == SyncState::Locked {
            self.transition(SyncState::Recovering, now_ms);
        }
        self.last_marker_ms = None;
        self.last_hole_eval_ms = None;
        self.hole_at_59_ms = None;
        self.pending_tick = None;
        self.recent_ticks.clear();
        self.consecutive_good_intervals = 0;
        self.confidence = self.confidence.min(self.params.min_retain);
    }

    pub fn reset(&mut self) {
        let state = self.state;
        self.clear_lock_state();
        self.state = SyncState::None;
        self.last_positive_ms = 0.0;
        self.next_check_ms = CHECK_INTERVAL_MS;
        self.pending_tick = None;
        self.recent_ticks.clear();
        self.transitions.clear();
        let _ = state;
    }
}

impl std::fmt::Debug for SyncDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDetector")
            .field("state", &self.state)
            .field("confidence", &self.confidence)
            .field("markers", &self.confirmed_marker_count)
            .finish()
    }
}
