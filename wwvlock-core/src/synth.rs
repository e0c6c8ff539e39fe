//! Synthetic WWV baseband generator.
//!
//! Produces the broadcast cycle as complex baseband I/Q: carrier at DC, the
//! 5 ms 1000 Hz tick at most seconds, the 800 ms minute marker, silence at
//! seconds 29 and 59, the optional 100 Hz BCD subcarrier, the alternating
//! 500/600 Hz audio subcarrier, and seeded AWGN. Drives the CLI's synthetic
//! source and the end-to-end test scenarios.

use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::events::BcdSymbol;

/// Generator settings. Amplitudes are linear, relative to full scale.
#[derive(Debug, Clone)]
pub struct WwvSignalConfig {
    pub sample_rate_hz: u32,
    /// Carrier level at DC.
    pub carrier_amplitude: f64,
    /// Modulation depth of the 1000 Hz tick/marker tone.
    pub tone_depth: f64,
    /// Modulation depth of the 100 Hz BCD subcarrier; 0 disables it.
    pub bcd_depth: f64,
    /// Modulation depth of the 500/600 Hz audio subcarrier; 0 disables it.
    pub subcarrier_depth: f64,
    /// AWGN standard deviation per I/Q component.
    pub noise_std: f64,
    pub seed: u64,
}

impl Default for WwvSignalConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 2_400_000,
            carrier_amplitude: 0.5,
            tone_depth: 0.8,
            bcd_depth: 0.0,
            subcarrier_depth: 0.0,
            noise_std: 0.002,
            seed: 42,
        }
    }
}

/// BCD symbol transmitted at a given second of the minute: position markers
/// every tenth second, alternating data bits elsewhere.
pub fn bcd_symbol_for_second(second: u32) -> BcdSymbol {
    if second % 10 == 9 {
        BcdSymbol::Marker
    } else if second % 2 == 0 {
        BcdSymbol::Zero
    } else {
        BcdSymbol::One
    }
}

fn bcd_width_ms(symbol: BcdSymbol) -> f64 {
    match symbol {
        BcdSymbol::Zero => 200.0,
        BcdSymbol::One => 500.0,
        BcdSymbol::Marker => 800.0,
        BcdSymbol::Unknown => 0.0,
    }
}

pub struct WwvSignalGenerator {
    config: WwvSignalConfig,
    rng: StdRng,
    sample_idx: u64,
    /// Linear output gain, adjustable mid-stream for fade scenarios.
    pub gain: f64,
}

impl WwvSignalGenerator {
    pub fn new(config: WwvSignalConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            sample_idx: 0,
            gain: 1.0,
        }
    }

    /// Seconds of signal generated so far.
    pub fn elapsed_secs(&self) -> f64 {
        self.sample_idx as f64 / self.config.sample_rate_hz as f64
    }

    /// Generate the next `count` samples into parallel I/Q vectors.
    pub fn next_block(&mut self, count: usize) -> (Vec<f32>, Vec<f32>) {
        let fs = self.config.sample_rate_hz as f64;
        let mut i_out = Vec::with_capacity(count);
        let mut q_out = Vec::with_capacity(count);

        for _ in 0..count {
            let t = self.sample_idx as f64 / fs;
            self.sample_idx += 1;

            let second_in_minute = ((t % 60.0).floor() as u32).min(59);
            let ms_in_second = (t % 1.0) * 1000.0;

            let mut envelope = 1.0;

            // 1000 Hz tick/marker tone.
            let tone_on = match second_in_minute {
                0 => ms_in_second < 800.0,
                29 | 59 => false,
                _ => ms_in_second < 5.0,
            };
            if tone_on {
                envelope += self.config.tone_depth * (TAU * 1000.0 * t).cos();
            }

            // 100 Hz BCD subcarrier, keyed by pulse width. No BCD during the
            // minute marker.
            if self.config.bcd_depth > 0.0 && second_in_minute != 0 {
                let symbol = bcd_symbol_for_second(second_in_minute);
                if ms_in_second < bcd_width_ms(symbol) {
                    envelope += self.config.bcd_depth * (TAU * 100.0 * t).cos();
                }
            }

            // Alternating 500/600 Hz audio subcarrier.
            if self.config.subcarrier_depth > 0.0 {
                let minute = (t / 60.0).floor() as u64;
                let freq = if minute % 2 == 0 { 500.0 } else { 600.0 };
                envelope += self.config.subcarrier_depth * (TAU * freq * t).cos();
            }

            let noise_i: f64 = self.rng.sample::<f64, _>(StandardNormal) * self.config.noise_std;
            let noise_q: f64 = self.rng.sample::<f64, _>(StandardNormal) * self.config.noise_std;

            let amplitude = self.gain * self.config.carrier_amplitude * envelope;
            i_out.push((amplitude + noise_i) as f32);
            q_out.push(noise_q as f32);
        }

        (i_out, q_out)
    }
}

impl std::fmt::Debug for WwvSignalGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WwvSignalGenerator")
            .field("sample_idx", &self.sample_idx)
            .field("gain", &self.gain)
            .finish()
    }
}

/// Pure Gaussian noise source with the same block interface, for the
/// noise-only scenario.
pub struct NoiseGenerator {
    rng: StdRng,
    noise_std: f64,
}

impl NoiseGenerator {
    pub fn new(noise_std: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise_std,
        }
    }

    pub fn next_block(&mut self, count: usize) -> (Vec<f32>, Vec<f32>) {
        let mut i_out = Vec::with_capacity(count);
        let mut q_out = Vec::with_capacity(count);
        for _ in 0..count {
            let ni: f64 = self.rng.sample::<f64, _>(StandardNormal) * self.noise_std;
            let nq: f64 = self.rng.sample::<f64, _>(StandardNormal) * self.noise_std;
            i_out.push(ni as f32);
            q_out.push(nq as f32);
        }
        (i_out, q_out)
    }
}

impl std::fmt::Debug for NoiseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseGenerator")
            .field("noise_std", &self.noise_std)
            .finish()
    }
}
