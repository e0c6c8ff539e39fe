//! Per-second BCD symbol fusion, gated on sync lock.
//!
//! Time is partitioned into one-second windows anchored at the sync
//! detector's last-marker timestamp. Each window fuses the time-domain and
//! frequency-domain detectors: agreement yields the symbol, disagreement
//! yields UNKNOWN, an empty window yields nothing. No symbol leaves this
//! correlator while sync is not LOCKED.

use std::collections::VecDeque;

use crate::calib::SECOND_MS;
use crate::events::{BcdPulse, BcdSymbol, BcdSymbolEvent};

/// Grace period after a window ends before it is fused, covering detector
/// classification latency.
const CLOSE_SLACK_MS: f64 = 200.0;

/// How long pulses are retained while waiting for their window to close.
const PULSE_RETENTION_MS: f64 = 4000.0;

pub struct BcdCorrelator {
    gated_open: bool,
    next_window_start_ms: Option<f64>,
    time_pulses: VecDeque<BcdPulse>,
    freq_pulses: VecDeque<BcdPulse>,
    symbols_emitted: u64,
}

impl BcdCorrelator {
    pub fn new() -> Self {
        Self {
            gated_open: false,
            next_window_start_ms: None,
            time_pulses: VecDeque::new(),
            freq_pulses: VecDeque::new(),
            symbols_emitted: 0,
        }
    }

    /// Update the gate from the sync detector. Opening aligns windows to the
    /// anchor; closing discards pending pulses.
    pub fn set_gate(&mut self, locked: bool, anchor_ms: Option<f64>, now_ms: f64) {
        match (locked, anchor_ms) {
            (true, Some(anchor)) => {
                if !self.gated_open {
                    self.gated_open = true;
                    // First window boundary at or after now, on the anchor's
                    // second grid.
                    let k = ((now_ms - anchor) / SECOND_MS).ceil().max(0.0);
                    self.next_window_start_ms = Some(anchor + k * SECOND_MS);
                }
            }
            _ => {
                self.gated_open = false;
                self.next_window_start_ms = None;
                self.time_pulses.clear();
                self.freq_pulses.clear();
            }
        }
    }

    pub fn on_time_pulse(&mut self, pulse: &BcdPulse) {
        if self.gated_open {
            self.time_pulses.push_back(pulse.clone());
        }
    }

    pub fn on_freq_pulse(&mut self, pulse: &BcdPulse) {
        if self.gated_open {
            self.freq_pulses.push_back(pulse.clone());
        }
    }

    /// Close any windows whose grace period has elapsed.
    pub fn on_clock(&mut self, now_ms: f64) -> Vec<BcdSymbolEvent> {
        let mut out = Vec::new();
        let Some(mut start) = self.next_window_start_ms else {
            return out;
        };

        while start + SECOND_MS + CLOSE_SLACK_MS <= now_ms {
            let end = start + SECOND_MS;
            let time_sym = Self::take_in_window(&mut self.time_pulses, start, end);
            let freq_sym = Self::take_in_window(&mut self.freq_pulses, start, end);

            if let Some(event) = Self::fuse(start, time_sym, freq_sym) {
                self.symbols_emitted += 1;
                out.push(event);
            }
            start = end;
        }
        self.next_window_start_ms = Some(start);

        // Drop stragglers that will never match a window again.
        let horizon = now_ms - PULSE_RETENTION_MS;
        while self.time_pulses.front().map_or(false, |p| p.onset_ms < horizon) {
            self.time_pulses.pop_front();
        }
        while self.freq_pulses.front().map_or(false, |p| p.onset_ms < horizon) {
            self.freq_pulses.pop_front();
        }

        out
    }

    fn take_in_window(pulses: &mut VecDeque<BcdPulse>, start: f64, end: f64) -> Option<BcdPulse> {
        let pos = pulses
            .iter()
            .position(|p| p.onset_ms >= start && p.onset_ms < end)?;
        pulses.remove(pos)
    }

    fn fuse(
        window_start: f64,
        time_sym: Option<BcdPulse>,
        freq_sym: Option<BcdPulse>,
    ) -> Option<BcdSymbolEvent> {
        let (symbol, width) = match (&time_sym, &freq_sym) {
            (Some(t), Some(f)) if t.symbol == f.symbol => (t.symbol, t.width_ms),
            (Some(t), Some(_)) => (BcdSymbol::Unknown, t.width_ms),
            (Some(t), None) => (t.symbol, t.width_ms),
            (None, Some(f)) => (f.symbol, f.width_ms),
            (None, None) => return None,
        };
        Some(BcdSymbolEvent {
            symbol,
            timestamp_ms: window_start,
            pulse_width_ms: width,
        })
    }

    pub fn symbols_emitted(&self) -> u64 {
        self.symbols_emitted
    }

    pub fn is_gated_open(&self) -> bool {
        self.gated_open
    }

    pub fn reset(&mut self) {
        self.gated_open = false;
        self.next_window_start_ms = None;
        self.time_pulses.clear();
        self.freq_pulses.clear();
        self.symbols_emitted = 0;
    }
}

impl Default for BcdCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BcdCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcdCorrelator")
            .field("gated_open", &self.gated_open)
            .field("symbols_emitted", &self.symbols_emitted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(onset: f64, width: f64, symbol: BcdSymbol) -> BcdPulse {
        BcdPulse {
            onset_ms: onset,
            width_ms: width,
            symbol,
        }
    }

    #[test]
    fn test_closed_gate_emits_nothing() {
        let mut corr = BcdCorrelator::new();
        corr.on_time_pulse(&pulse(10_030.0, 500.0, BcdSymbol::One));
        assert!(corr.on_clock(12_000.0).is_empty());
        assert_eq!(corr.symbols_emitted(), 0);
    }

    #[test]
    fn test_agreement_yields_symbol() {
        let mut corr = BcdCorrelator::new();
        corr.set_gate(true, Some(10_000.0), 10_000.0);
        corr.on_time_pulse(&pulse(10_030.0, 500.0, BcdSymbol::One));
        corr.on_freq_pulse(&pulse(10_040.0, 510.0, BcdSymbol::One));

        let events = corr.on_clock(11_300.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].symbol, BcdSymbol::One);
        assert_eq!(events[0].timestamp_ms, 10_000.0);
    }

    #[test]
    fn test_disagreement_yields_unknown() {
        let mut corr = BcdCorrelator::new();
        corr.set_gate(true, Some(10_000.0), 10_000.0);
        corr.on_time_pulse(&pulse(10_030.0, 500.0, BcdSymbol::One));
        corr.on_freq_pulse(&pulse(10_040.0, 200.0, BcdSymbol::Zero));

        let events = corr.on_clock(11_300.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].symbol, BcdSymbol::Unknown);
    }

    #[test]
    fn test_single_path_passes_through() {
        let mut corr = BcdCorrelator::new();
        corr.set_gate(true, Some(10_000.0), 10_000.0);
        corr.on_time_pulse(&pulse(10_030.0, 800.0, BcdSymbol::Marker));

        let events = corr.on_clock(11_300.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].symbol, BcdSymbol::Marker);
    }

    #[test]
    fn test_empty_window_is_silent() {
        let mut corr = BcdCorrelator::new();
        corr.set_gate(true, Some(10_000.0), 10_000.0);
        let events = corr.on_clock(15_000.0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_gate_close_discards_pending() {
        let mut corr = BcdCorrelator::new();
        corr.set_gate(true, Some(10_000.0), 10_000.0);
        corr.on_time_pulse(&pulse(10_030.0, 500.0, BcdSymbol::One));
        corr.set_gate(false, None, 10_500.0);
        assert!(corr.on_clock(12_000.0).is_empty());
    }
}
