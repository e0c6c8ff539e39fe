//! 500/600 Hz subcarrier schedule monitor.
//!
//! WWV alternates a 500 Hz and 600 Hz audio subcarrier by minute. This
//! monitor averages both tones across each minute of the slow-FFT stream and
//! reports whether the dominant tone matches the schedule for that minute's
//! parity. Minute boundaries follow the sync anchor when one is installed,
//! falling back to the stream clock.

use crate::calib::MINUTE_MS;
use crate::dsp::slow_fft::SlowFftFrame;
use crate::events::SubcarrierReport;

fn to_db(mag: f64) -> f64 {
    if mag > 1e-10 {
        20.0 * mag.log10()
    } else {
        -200.0
    }
}

pub struct SubcarrierMonitor {
    anchor_ms: f64,
    minute_index: u64,
    sum500: f64,
    sum600: f64,
    sum_noise: f64,
    frames: u32,
}

impl SubcarrierMonitor {
    pub fn new() -> Self {
        Self {
            anchor_ms: 0.0,
            minute_index: 0,
            sum500: 0.0,
            sum600: 0.0,
            sum_noise: 0.0,
            frames: 0,
        }
    }

    /// Align minute boundaries to a confirmed minute-marker timestamp.
    /// Accumulation restarts; the current partial minute is discarded.
    pub fn set_anchor(&mut self, anchor_ms: f64) {
        self.anchor_ms = anchor_ms;
        self.minute_index = 0;
        self.clear_accumulators();
    }

    /// Expected subcarrier for a minute index: 500 Hz on even minutes,
    /// 600 Hz on odd.
    pub fn expected_tone_hz(minute: u64) -> u32 {
        if minute % 2 == 0 {
            500
        } else {
            600
        }
    }

    /// Consume one slow-FFT frame; reports once per completed minute.
    pub fn process_frame(
        &mut self,
        frame: &SlowFftFrame,
        now_ms: f64,
    ) -> Option<SubcarrierReport> {
        let minute = ((now_ms - self.anchor_ms).max(0.0) / MINUTE_MS) as u64;

        let report = if minute != self.minute_index && self.frames > 0 {
            let n = self.frames as f64;
            let avg500 = self.sum500 / n;
            let avg600 = self.sum600 / n;
            let avg_noise = self.sum_noise / n;

            let sub500_db = to_db(avg500);
            let sub600_db = to_db(avg600);
            let detected = avg500.max(avg600) > avg_noise * 3.0;
            let expected = Self::expected_tone_hz(self.minute_index);
            let dominant = if avg500 >= avg600 { 500 } else { 600 };

            let out = SubcarrierReport {
                timestamp_ms: now_ms,
                minute: self.minute_index,
                expected_tone_hz: expected,
                sub500_db,
                sub600_db,
                delta_db: sub500_db - sub600_db,
                detected,
                matches_schedule: detected && dominant == expected,
            };
            self.clear_accumulators();
            Some(out)
        } else {
            None
        };

        self.minute_index = minute;
        self.sum500 += frame.band_magnitude(500.0, 2);
        self.sum600 += frame.band_magnitude(600.0, 2);
        self.sum_noise += frame.noise_magnitude();
        self.frames += 1;

        report
    }

    fn clear_accumulators(&mut self) {
        self.sum500 = 0.0;
        self.sum600 = 0.0;
        self.sum_noise = 0.0;
        self.frames = 0;
    }

    pub fn reset(&mut self) {
        self.anchor_ms = 0.0;
        self.minute_index = 0;
        self.clear_accumulators();
    }
}

impl Default for SubcarrierMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubcarrierMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubcarrierMonitor")
            .field("minute_index", &self.minute_index)
            .field("frames", &self.frames)
            .finish()
    }
}
