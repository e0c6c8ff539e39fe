//! Per-second receiver quality from the slow-FFT path.

use crate::calib::SECOND_MS;
use crate::dsp::slow_fft::SlowFftFrame;
use crate::events::{ChannelQuality, ChannelReport};

fn to_db(mag: f64) -> f64 {
    if mag > 1e-10 {
        20.0 * mag.log10()
    } else {
        -200.0
    }
}

pub struct ChannelQualityMonitor {
    second_index: u64,
    sum_carrier: f64,
    sum_noise: f64,
    sum500: f64,
    sum600: f64,
    sum1000: f64,
    frames: u32,
}

impl ChannelQualityMonitor {
    pub fn new() -> Self {
        Self {
            second_index: 0,
            sum_carrier: 0.0,
            sum_noise: 0.0,
            sum500: 0.0,
            sum600: 0.0,
            sum1000: 0.0,
            frames: 0,
        }
    }

    /// Consume one slow-FFT frame; reports once per completed second.
    pub fn process_frame(&mut self, frame: &SlowFftFrame, now_ms: f64) -> Option<ChannelReport> {
        let second = (now_ms / SECOND_MS) as u64;

        let report = if second != self.second_index && self.frames > 0 {
            let n = self.frames as f64;
            let carrier_db = to_db(self.sum_carrier / n);
            let noise_db = to_db(self.sum_noise / n);
            let snr_db = carrier_db - noise_db;

            let out = ChannelReport {
                timestamp_ms: now_ms,
                carrier_db,
                snr_db,
                sub500_db: to_db(self.sum500 / n),
                sub600_db: to_db(self.sum600 / n),
                tone1000_db: to_db(self.sum1000 / n),
                noise_db,
                quality: ChannelQuality::from_snr_db(snr_db),
            };
            self.clear_accumulators();
            Some(out)
        } else {
            None
        };

        self.second_index = second;
        self.sum_carrier += frame.carrier_magnitude();
        self.sum_noise += frame.noise_magnitude();
        self.sum500 += frame.band_magnitude(500.0, 2);
        self.sum600 += frame.band_magnitude(600.0, 2);
        self.sum1000 += frame.band_magnitude(1000.0, 2);
        self.frames += 1;

        report
    }

    fn clear_accumulators(&mut self) {
        self.sum_carrier = 0.0;
        self.sum_noise = 0.0;
        self.sum500 = 0.0;
        self.sum600 = 0.0;
        self.sum1000 = 0.0;
        self.frames = 0;
    }

    pub fn reset(&mut self) {
        self.second_index = 0;
        self.clear_accumulators();
    }
}

impl Default for ChannelQualityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChannelQualityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelQualityMonitor")
            .field("second_index", &self.second_index)
            .field("frames", &self.frames)
            .finish()
    }
}
