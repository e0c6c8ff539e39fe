//! Overlapped FFT for the 12 kHz display/slow path.
//!
//! 2048-point Hann-windowed FFT with 50% overlap: one magnitude frame every
//! 1024 samples (~85.3 ms at 12 kHz). The same frames a waterfall display
//! would render feed the slow marker detector, the subcarrier monitor, and
//! the channel quality monitor.

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::calib::{SLOW_FFT_HOP, SLOW_FFT_LEN, SLOW_RATE_HZ};
use crate::dsp::window::hann;

/// One overlapped-FFT output frame: linear bin magnitudes.
#[derive(Debug, Clone)]
pub struct SlowFftFrame {
    pub mags: Vec<f64>,
}

impl SlowFftFrame {
    /// Bin index for a frequency. Positive frequencies only.
    pub fn bin_for_hz(freq_hz: f64) -> usize {
        let hz_per_bin = SLOW_RATE_HZ as f64 / SLOW_FFT_LEN as f64;
        (freq_hz / hz_per_bin).round() as usize
    }

    /// Summed magnitude over `bin ± spread`, both sidebands.
    pub fn band_magnitude(&self, center_hz: f64, spread_bins: usize) -> f64 {
        let center = Self::bin_for_hz(center_hz);
        let lo = center.saturating_sub(spread_bins).max(1);
        let hi = (center + spread_bins).min(SLOW_FFT_LEN / 2);
        let mut sum = 0.0;
        for k in lo..=hi {
            sum += self.mags[k];
            sum += self.mags[SLOW_FFT_LEN - k];
        }
        sum
    }

    /// Band magnitude in dB relative to full scale.
    pub fn band_db(&self, center_hz: f64, spread_bins: usize) -> f64 {
        let mag = self.band_magnitude(center_hz, spread_bins);
        if mag > 1e-10 {
            20.0 * mag.log10()
        } else {
            -200.0
        }
    }

    /// Magnitude at DC (the carrier after downconversion). The strongest of
    /// the three center bins, tolerating small tuning offsets.
    pub fn carrier_magnitude(&self) -> f64 {
        self.mags[0].max(self.mags[1]).max(self.mags[SLOW_FFT_LEN - 1])
    }

    /// Median bin magnitude over a quiet region (1.5-4 kHz), used as a
    /// broadband noise estimate robust to discrete tones.
    pub fn noise_magnitude(&self) -> f64 {
        let lo = Self::bin_for_hz(1500.0);
        let hi = Self::bin_for_hz(4000.0);
        let mut region: Vec<f64> = self.mags[lo..hi].to_vec();
        region.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        region[region.len() / 2]
    }
}

/// Streaming overlapped-FFT producer.
pub struct SlowFft {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    history: Vec<Complex64>,
    pending: usize,
    scratch: Vec<Complex64>,
    workspace: Vec<Complex64>,
}

impl SlowFft {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(SLOW_FFT_LEN);
        let scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            fft,
            window: hann(SLOW_FFT_LEN),
            history: vec![Complex64::new(0.0, 0.0); SLOW_FFT_LEN],
            pending: 0,
            scratch,
            workspace: vec![Complex64::new(0.0, 0.0); SLOW_FFT_LEN],
        }
    }

    /// Push one slow-path sample; returns a frame every `SLOW_FFT_HOP`
    /// samples once the history is primed.
    pub fn push(&mut self, sample: Complex64) -> Option<SlowFftFrame> {
        self.history.rotate_left(1);
        if let Some(last) = self.history.last_mut() {
            *last = sample;
        }
        self.pending += 1;

        if self.pending < SLOW_FFT_HOP {
            return None;
        }
        self.pending = 0;

        for (dst, (s, w)) in self
            .workspace
            .iter_mut()
            .zip(self.history.iter().zip(self.window.iter()))
        {
            *dst = s * w;
        }
        self.fft
            .process_with_scratch(&mut self.workspace, &mut self.scratch);

        let scale = 1.0 / SLOW_FFT_LEN as f64;
        let mags = self.workspace.iter().map(|c| c.norm() * scale).collect();
        Some(SlowFftFrame { mags })
    }

    pub fn reset(&mut self) {
        self.history.fill(Complex64::new(0.0, 0.0));
        self.pending = 0;
    }
}

impl Default for SlowFft {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SlowFft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlowFft")
            .field("pending", &self.pending)
            .finish()
    }
}
