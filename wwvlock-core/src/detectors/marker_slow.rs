//! Minute-marker confirmation from the 12 kHz overlapped-FFT path.
//!
//! Resolution here is one FFT hop (~85 ms), far coarser than the detector
//! path, but the evidence is independent: different decimation chain,
//! different FFT, different noise estimate. The marker correlator fuses the
//! two paths.

use crate::dsp::slow_fft::SlowFftFrame;
use crate::events::{SlowMarkerEvent, SlowMarkerFrame};
use crate::tunables::MarkerDetectorTunables;

/// Accepted above-threshold span for a marker, wide to absorb the coarse
/// frame cadence.
const SPAN_MIN_MS: f64 = 300.0;
const SPAN_MAX_MS: f64 = 1500.0;

pub struct SlowMarkerDetector {
    params: MarkerDetectorTunables,
    span_start_ms: Option<f64>,
    span_peak_snr_db: f64,
}

impl SlowMarkerDetector {
    pub fn new(params: MarkerDetectorTunables) -> Self {
        Self {
            params,
            span_start_ms: None,
            span_peak_snr_db: f64::NEG_INFINITY,
        }
    }

    /// Consume one slow-FFT frame. Always yields a time-resolved energy
    /// frame; additionally yields a marker candidate when an above-threshold
    /// span of plausible length ends.
    pub fn process_frame(
        &mut self,
        frame: &SlowFftFrame,
        now_ms: f64,
    ) -> (SlowMarkerFrame, Option<SlowMarkerEvent>) {
        let signal = frame.band_magnitude(1000.0, 2);
        let adjacent =
            0.5 * (frame.band_magnitude(800.0, 2) + frame.band_magnitude(1200.0, 2));
        let snr_db = if adjacent > 1e-12 && signal > 1e-12 {
            10.0 * (signal / adjacent).log10()
        } else {
            0.0
        };
        let above = snr_db > self.params.slow_snr_threshold_db;

        let out_frame = SlowMarkerFrame {
            timestamp_ms: now_ms,
            energy: signal,
            snr_db,
            above_threshold: above,
        };

        let event = match (self.span_start_ms, above) {
            (None, true) => {
                self.span_start_ms = Some(now_ms);
                self.span_peak_snr_db = snr_db;
                None
            }
            (Some(_), true) => {
                self.span_peak_snr_db = self.span_peak_snr_db.max(snr_db);
                None
            }
            (Some(start_ms), false) => {
                self.span_start_ms = None;
                let duration_ms = now_ms - start_ms;
                if (SPAN_MIN_MS..=SPAN_MAX_MS).contains(&duration_ms) {
                    Some(SlowMarkerEvent {
                        timestamp_ms: start_ms - self.params.slow_path_delay_ms,
                        duration_ms,
                        peak_snr_db: self.span_peak_snr_db,
                    })
                } else {
                    None
                }
            }
            (None, false) => None,
        };

        (out_frame, event)
    }

    pub fn apply_tunables(&mut self, params: &MarkerDetectorTunables) {
        self.params = *params;
    }

    pub fn reset(&mut self) {
        self.span_start_ms = None;
        self.span_peak_snr_db = f64::NEG_INFINITY;
    }
}

impl std::fmt::Debug for SlowMarkerDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlowMarkerDetector")
            .field("span_start_ms", &self.span_start_ms)
            .finish()
    }
}
