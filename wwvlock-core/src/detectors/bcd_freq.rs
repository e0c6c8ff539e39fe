//! Frequency-domain BCD subcarrier detector.
//!
//! Cross-checks the envelope detector: a 1024-point FFT over the data
//! channel measures the ±100 Hz sideband energy directly, with its own
//! adaptive floor and pulse-width state machine. The BCD correlator requires
//! both paths to agree before trusting a symbol.

use num_complex::Complex64;

use crate::calib::DETECTOR_RATE_HZ;
use crate::detectors::bcd_time::classify_pulse_width;
use crate::dsp::tone::{mirror_bins, FramePower};
use crate::events::BcdPulse;

const FFT_LEN: usize = 1024;
const THRESHOLD_MULT: f64 = 3.0;
const HYSTERESIS: f64 = 0.7;
const WARMUP_FRAMES: u64 = 50;
const WARMUP_ALPHA: f64 = 0.05;
const ADAPT_DOWN: f64 = 5e-3;
const ADAPT_UP: f64 = 5e-4;
const FLOOR_MIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
enum FreqState {
    Idle,
    InPulse { onset_ms: f64, frames: u32 },
}

pub struct BcdFreqDetector {
    frame: FramePower,
    frame_ms: f64,
    frames_seen: u64,
    floor: f64,
    state: FreqState,
}

impl BcdFreqDetector {
    pub fn new() -> Self {
        let rate = DETECTOR_RATE_HZ as f64;
        // ~48.8 Hz per bin: the 100 Hz sidebands land in bins 2 and 1022.
        // Bin 1 is excluded; the carrier's DC leakage dominates it.
        let bins: Vec<usize> = mirror_bins(FFT_LEN, rate, 100.0, 50.0)
            .into_iter()
            .filter(|&k| k >= 2 && k <= FFT_LEN - 2)
            .collect();
        Self {
            frame: FramePower::new(FFT_LEN, bins),
            frame_ms: FFT_LEN as f64 / rate * 1000.0,
            frames_seen: 0,
            floor: 1.0,
            state: FreqState::Idle,
        }
    }

    /// Feed one data-channel sample; returns a classified pulse when one
    /// ends.
    pub fn process_sample(&mut self, sample: Complex64, now_ms: f64) -> Option<BcdPulse> {
        let energy = self.frame.push(sample)?;
        self.frames_seen += 1;

        if self.frames_seen <= WARMUP_FRAMES {
            self.floor += WARMUP_ALPHA * (energy - self.floor);
            self.floor = self.floor.max(FLOOR_MIN);
            return None;
        }

        let high = self.floor * THRESHOLD_MULT;
        let low = high * HYSTERESIS;

        match self.state {
            FreqState::Idle => {
                let alpha = if energy < self.floor {
                    ADAPT_DOWN
                } else {
                    ADAPT_UP
                };
                self.floor += alpha * (energy - self.floor);
                self.floor = self.floor.max(FLOOR_MIN);

                if energy > high {
                    self.state = FreqState::InPulse {
                        onset_ms: now_ms - self.frame_ms,
                        frames: 1,
                    };
                }
                None
            }
            FreqState::InPulse { onset_ms, frames } => {
                if energy > low {
                    self.state = FreqState::InPulse {
                        onset_ms,
                        frames: frames + 1,
                    };
                    return None;
                }
                self.state = FreqState::Idle;

                let width_ms = frames as f64 * self.frame_ms;
                classify_pulse_width(width_ms).map(|symbol| BcdPulse {
                    onset_ms,
                    width_ms,
                    symbol,
                })
            }
        }
    }

    pub fn reset(&mut self) {
        self.frame.reset();
        self.frames_seen = 0;
        self.floor = 1.0;
        self.state = FreqState::Idle;
    }
}

impl Default for BcdFreqDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BcdFreqDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcdFreqDetector")
            .field("floor", &self.floor)
            .field("state", &self.state)
            .finish()
    }
}
