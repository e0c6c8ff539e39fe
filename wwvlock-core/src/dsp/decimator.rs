//! Anti-aliased integer decimation and the detector-path normalizer.

use num_complex::Complex64;

use crate::dsp::biquad::ComplexBiquad;
use crate::errors::{ConfigError, DspError, WwvError};

/// Second-order anti-alias low-pass followed by keep-every-Nth decimation.
///
/// The filter corner sits at 80% of the target Nyquist, leaving a guard band
/// against the gentle biquad rolloff.
#[derive(Debug, Clone)]
pub struct DecimationChain {
    filter: ComplexBiquad,
    factor: u32,
    phase: u32,
}

impl DecimationChain {
    pub fn new(input_rate_hz: u32, output_rate_hz: u32) -> Result<Self, WwvError> {
        if input_rate_hz == 0 || output_rate_hz == 0 {
            return Err(ConfigError::InvalidSampleRate {
                rate: input_rate_hz.min(output_rate_hz),
            }
            .into());
        }
        if input_rate_hz % output_rate_hz != 0 {
            return Err(ConfigError::SampleRateNotDecimable {
                rate: input_rate_hz,
                fd: output_rate_hz,
                fw: output_rate_hz,
            }
            .into());
        }
        let factor = input_rate_hz / output_rate_hz;
        if factor == 0 {
            return Err(DspError::InvalidDecimation { factor }.into());
        }

        let cutoff_hz = 0.8 * (output_rate_hz as f64 / 2.0);
        Ok(Self {
            filter: ComplexBiquad::lowpass(
                input_rate_hz as f64,
                cutoff_hz,
                std::f64::consts::FRAC_1_SQRT_2,
            ),
            factor,
            phase: 0,
        })
    }

    /// Push one input-rate sample; returns an output-rate sample once per
    /// `factor` inputs.
    #[inline]
    pub fn push(&mut self, sample: Complex64) -> Option<Complex64> {
        let filtered = self.filter.process(sample);
        self.phase += 1;
        if self.phase == self.factor {
            self.phase = 0;
            Some(filtered)
        } else {
            None
        }
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.phase = 0;
    }
}

/// Slow AGC over `|I + jQ|`.
///
/// Tracks an exponentially smoothed magnitude and scales samples by its
/// reciprocal. Attack is fast for the first `attack_len` samples so the
/// level settles quickly after stream start or reset, then slow so pulse
/// energy is not absorbed into the gain.
#[derive(Debug, Clone)]
pub struct Normalizer {
    level: f64,
    seen: u64,
    attack_len: u64,
    attack_alpha: f64,
    settled_alpha: f64,
}

const LEVEL_FLOOR: f64 = 1e-4;

impl Normalizer {
    pub fn new() -> Self {
        Self {
            level: 1.0,
            seen: 0,
            attack_len: 50_000,
            attack_alpha: 0.01,
            settled_alpha: 0.0001,
        }
    }

    #[inline]
    pub fn process(&mut self, sample: Complex64) -> Complex64 {
        let mag = sample.norm();
        let alpha = if self.seen < self.attack_len {
            self.attack_alpha
        } else {
            self.settled_alpha
        };
        self.seen = self.seen.saturating_add(1);
        self.level += alpha * (mag - self.level);
        if self.level < LEVEL_FLOOR {
            self.level = LEVEL_FLOOR;
        }
        sample / self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 1.0;
        self.seen = 0;
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}
