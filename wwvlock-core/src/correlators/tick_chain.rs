//! Second-epoch estimation from the tick stream.
//!
//! Ticks arrive nominally 1000 ms apart. Folding their leading edges modulo
//! one second turns the chain into a cluster on a circle; the circular mean
//! is the epoch phase and the circular spread bounds its quality. Confidence
//! combines the in-tolerance fraction with the spread and a penalty for
//! consecutive expected-but-missing ticks.

use std::collections::VecDeque;
use std::f64::consts::TAU;

use crate::calib::SECOND_MS;
use crate::clock::{circular_distance_ms, wrap_ms};
use crate::epoch::{EpochEstimate, EpochSource};
use crate::events::TickEvent;
use crate::tunables::TickCorrelatorTunables;

/// Bounded tick history.
const HISTORY_LEN: usize = 64;

/// Periodic miss-check cadence.
const CHECK_INTERVAL_MS: f64 = 100.0;

pub struct TickCorrelator {
    params: TickCorrelatorTunables,
    history: VecDeque<f64>,
    last_tick_ms: Option<f64>,
    consecutive_misses: u32,
    next_check_ms: f64,
}

impl TickCorrelator {
    pub fn new(params: TickCorrelatorTunables) -> Self {
        Self {
            params,
            history: VecDeque::with_capacity(HISTORY_LEN),
            last_tick_ms: None,
            consecutive_misses: 0,
            next_check_ms: CHECK_INTERVAL_MS,
        }
    }

    /// Record a tick; returns a publishable epoch when confidence clears the
    /// threshold.
    pub fn on_tick(&mut self, event: &TickEvent) -> Option<EpochEstimate> {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(event.leading_edge_ms);
        self.last_tick_ms = Some(event.leading_edge_ms);
        self.consecutive_misses = 0;

        self.publishable()
    }

    /// Periodic miss tracking, driven by the pipeline's sample clock.
    pub fn on_clock(&mut self, now_ms: f64) {
        if now_ms < self.next_check_ms {
            return;
        }
        while self.next_check_ms <= now_ms {
            self.next_check_ms += CHECK_INTERVAL_MS;
        }

        if let Some(last) = self.last_tick_ms {
            let gap = now_ms - last;
            let expected_missing =
                (gap - self.params.tick_tolerance_ms) / SECOND_MS;
            if expected_missing >= 1.0 {
                self.consecutive_misses = expected_missing as u32;
            }
        }
    }

    /// Current estimate regardless of the publication threshold.
    pub fn estimate(&self) -> Option<EpochEstimate> {
        if (self.history.len() as u32) < self.params.min_history {
            return None;
        }

        // Circular mean of the leading edges folded into one second.
        let mut c = 0.0;
        let mut s = 0.0;
        for &t in &self.history {
            let theta = TAU * wrap_ms(t, SECOND_MS) / SECOND_MS;
            c += theta.cos();
            s += theta.sin();
        }
        let n = self.history.len() as f64;
        let r = (c * c + s * s).sqrt() / n;
        let offset_ms = wrap_ms(s.atan2(c) / TAU * SECOND_MS, SECOND_MS);

        // Circular standard deviation, in milliseconds.
        let circ_std_ms = if r > 1e-6 {
            (-2.0 * r.ln()).max(0.0).sqrt() / TAU * SECOND_MS
        } else {
            SECOND_MS
        };

        let tol = self.params.tick_tolerance_ms;
        let in_tol = self
            .history
            .iter()
            .filter(|&&t| circular_distance_ms(wrap_ms(t, SECOND_MS), offset_ms, SECOND_MS) <= tol)
            .count() as f64;
        let fraction = in_tol / n;

        let spread_term = 1.0 - (circ_std_ms / 50.0).min(1.0);
        let miss_excess = self
            .consecutive_misses
            .saturating_sub(self.params.max_consecutive_misses);
        let miss_penalty = 0.8f64.powi(miss_excess as i32);

        let confidence = (fraction * spread_term * miss_penalty).clamp(0.0, 1.0);
        Some(EpochEstimate::new(
            offset_ms,
            EpochSource::TickChain,
            confidence,
        ))
    }

    fn publishable(&self) -> Option<EpochEstimate> {
        let estimate = self.estimate()?;
        (estimate.confidence >= self.params.epoch_confidence_threshold).then_some(estimate)
    }

    pub fn apply_tunables(&mut self, params: &TickCorrelatorTunables) {
        self.params = *params;
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_tick_ms = None;
        self.consecutive_misses = 0;
        self.next_check_ms = CHECK_INTERVAL_MS;
    }
}

impl std::fmt::Debug for TickCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickCorrelator")
            .field("history", &self.history.len())
            .field("misses", &self.consecutive_misses)
            .finish()
    }
}
