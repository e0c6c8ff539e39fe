//! Time-domain BCD subcarrier detector.
//!
//! The 100 Hz subcarrier is amplitude-keyed with 200/500/800 ms pulses, one
//! per second. This detector extracts the tone from the data channel's
//! envelope with a block Goertzel and classifies pulse widths; an
//! independent frequency-domain detector cross-checks it.

use num_complex::Complex64;

use crate::calib::{BCD_BLOCK_LEN, DETECTOR_RATE_HZ};
use crate::dsp::goertzel::Goertzel;
use crate::events::{BcdPulse, BcdSymbol};

const THRESHOLD_MULT: f64 = 3.0;
const HYSTERESIS: f64 = 0.7;
const WARMUP_BLOCKS: u64 = 100;
const WARMUP_ALPHA: f64 = 0.05;
const ADAPT_DOWN: f64 = 5e-3;
const ADAPT_UP: f64 = 5e-4;
const FLOOR_MIN: f64 = 1e-5;

/// Map a pulse width to its BCD symbol: ~200 ms ZERO, ~500 ms ONE,
/// ~800 ms MARKER.
pub(crate) fn classify_pulse_width(width_ms: f64) -> Option<BcdSymbol> {
    if (100.0..350.0).contains(&width_ms) {
        Some(BcdSymbol::Zero)
    } else if (350.0..650.0).contains(&width_ms) {
        Some(BcdSymbol::One)
    } else if (650.0..950.0).contains(&width_ms) {
        Some(BcdSymbol::Marker)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy)]
enum BcdState {
    Idle,
    InPulse { onset_ms: f64, blocks: u32 },
}

pub struct BcdTimeDetector {
    goertzel: Goertzel,
    block_ms: f64,
    blocks_seen: u64,
    floor: f64,
    state: BcdState,
}

impl BcdTimeDetector {
    pub fn new() -> Self {
        Self {
            goertzel: Goertzel::new(BCD_BLOCK_LEN, 100.0, DETECTOR_RATE_HZ as f64),
            block_ms: BCD_BLOCK_LEN as f64 / DETECTOR_RATE_HZ as f64 * 1000.0,
            blocks_seen: 0,
            floor: 1.0,
            state: BcdState::Idle,
        }
    }

    /// Feed one data-channel sample; returns a classified pulse when one
    /// ends.
    pub fn process_sample(&mut self, sample: Complex64, now_ms: f64) -> Option<BcdPulse> {
        let magnitude = self.goertzel.push(sample.norm())?;
        self.blocks_seen += 1;

        if self.blocks_seen <= WARMUP_BLOCKS {
            self.floor += WARMUP_ALPHA * (magnitude - self.floor);
            self.floor = self.floor.max(FLOOR_MIN);
            return None;
        }

        let high = self.floor * THRESHOLD_MULT;
        let low = high * HYSTERESIS;

        match self.state {
            BcdState::Idle => {
                let alpha = if magnitude < self.floor {
                    ADAPT_DOWN
                } else {
                    ADAPT_UP
                };
                self.floor += alpha * (magnitude - self.floor);
                self.floor = self.floor.max(FLOOR_MIN);

                if magnitude > high {
                    self.state = BcdState::InPulse {
                        onset_ms: now_ms - self.block_ms,
                        blocks: 1,
                    };
                }
                None
            }
            BcdState::InPulse { onset_ms, blocks } => {
                if magnitude > low {
                    self.state = BcdState::InPulse {
                        onset_ms,
                        blocks: blocks + 1,
                    };
                    return None;
                }
                self.state = BcdState::Idle;

                let width_ms = blocks as f64 * self.block_ms;
                classify_pulse_width(width_ms).map(|symbol| BcdPulse {
                    onset_ms,
                    width_ms,
                    symbol,
                })
            }
        }
    }

    pub fn reset(&mut self) {
        self.goertzel.reset();
        self.blocks_seen = 0;
        self.floor = 1.0;
        self.state = BcdState::Idle;
    }
}

impl Default for BcdTimeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BcdTimeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcdTimeDetector")
            .field("floor", &self.floor)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    const FS: f64 = DETECTOR_RATE_HZ as f64;

    fn run<F: Fn(f64) -> Complex64>(
        det: &mut BcdTimeDetector,
        sample_idx: &mut u64,
        ms: f64,
        f: F,
    ) -> Vec<BcdPulse> {
        let n = (ms / 1000.0 * FS) as u64;
        let mut out = Vec::new();
        for _ in 0..n {
            let t = *sample_idx as f64 / FS;
            let now_ms = t * 1000.0;
            *sample_idx += 1;
            if let Some(p) = det.process_sample(f(t), now_ms) {
                out.push(p);
            }
        }
        out
    }

    /// Data channel with the 100 Hz subcarrier keyed on.
    fn keyed(t: f64) -> Complex64 {
        Complex64::new(0.3 + 0.25 * (TAU * 100.0 * t).cos(), 0.0)
    }

    /// Carrier only.
    fn idle_carrier(_t: f64) -> Complex64 {
        Complex64::new(0.3, 0.0)
    }

    #[test]
    fn test_widths_classify_to_symbols() {
        for (width, expected) in [
            (200.0, BcdSymbol::Zero),
            (500.0, BcdSymbol::One),
            (800.0, BcdSymbol::Marker),
        ] {
            let mut det = BcdTimeDetector::new();
            let mut s = 0u64;
            run(&mut det, &mut s, 2000.0, idle_carrier);
            let mut pulses = run(&mut det, &mut s, width, keyed);
            pulses.extend(run(&mut det, &mut s, 1000.0 - width.min(900.0), idle_carrier));

            assert_eq!(pulses.len(), 1, "width {width}: {pulses:?}");
            assert_eq!(pulses[0].symbol, expected, "width {width}");
            assert!(
                (pulses[0].width_ms - width).abs() < 40.0,
                "measured {} for {width}",
                pulses[0].width_ms
            );
        }
    }

    #[test]
    fn test_carrier_alone_produces_nothing() {
        let mut det = BcdTimeDetector::new();
        let mut s = 0u64;
        let pulses = run(&mut det, &mut s, 3000.0, idle_carrier);
        assert!(pulses.is_empty(), "pulses: {pulses:?}");
    }

    #[test]
    fn test_classify_bands() {
        assert_eq!(classify_pulse_width(200.0), Some(BcdSymbol::Zero));
        assert_eq!(classify_pulse_width(500.0), Some(BcdSymbol::One));
        assert_eq!(classify_pulse_width(800.0), Some(BcdSymbol::Marker));
        assert_eq!(classify_pulse_width(50.0), None);
        assert_eq!(classify_pulse_width(1200.0), None);
    }
}
