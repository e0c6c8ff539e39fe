//! Minute-marker confirmation by slow energy accumulation.
//!
//! Independent of the tick detector's pulse state machine: a wider 1000 Hz
//! band is integrated frame by frame against a slowly adapting baseline, so
//! an ~800 ms marker registers even when the tick path's hysteresis chops it
//! up. The baseline adapts only while idle; otherwise a long marker would
//! teach the detector to ignore the next one.

use std::collections::VecDeque;

use num_complex::Complex64;

use crate::calib::{DETECTOR_RATE_HZ, TICK_FRAME_LEN};
use crate::dsp::tone::{mirror_bins, FramePower};
use crate::events::MarkerEvent;
use crate::tunables::MarkerDetectorTunables;

/// Rolling accumulation window (~1000 ms of 5.12 ms frames).
const WINDOW_FRAMES: usize = 195;

const WARMUP_FRAMES: u64 = 50;
const WARMUP_ALPHA: f64 = 0.05;
const BASELINE_FLOOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
enum MarkerState {
    Idle,
    InMarker {
        onset_ms: f64,
        frames: u32,
        peak_energy: f64,
    },
}

pub struct FastMarkerDetector {
    params: MarkerDetectorTunables,
    frame: FramePower,
    frame_ms: f64,
    frames_seen: u64,
    baseline: f64,
    window: VecDeque<f64>,
    window_sum: f64,
    state: MarkerState,
    marker_count: u64,
    last_marker_ms: Option<f64>,
}

impl FastMarkerDetector {
    pub fn new(params: MarkerDetectorTunables) -> Self {
        let rate = DETECTOR_RATE_HZ as f64;
        let bins = mirror_bins(TICK_FRAME_LEN, rate, 1000.0, 100.0);
        Self {
            params,
            frame: FramePower::new(TICK_FRAME_LEN, bins),
            frame_ms: TICK_FRAME_LEN as f64 / rate * 1000.0,
            frames_seen: 0,
            baseline: 1.0,
            window: VecDeque::with_capacity(WINDOW_FRAMES),
            window_sum: 0.0,
            state: MarkerState::Idle,
            marker_count: 0,
            last_marker_ms: None,
        }
    }

    /// Feed one sync-channel sample. Returns a marker when a qualifying span
    /// completes.
    pub fn process_sample(&mut self, sample: Complex64, now_ms: f64) -> Option<MarkerEvent> {
        let energy = self.frame.push(sample)?;
        self.frames_seen += 1;

        self.window.push_back(energy);
        self.window_sum += energy;
        if self.window.len() > WINDOW_FRAMES {
            self.window_sum -= self.window.pop_front().unwrap_or(0.0);
        }

        if self.frames_seen <= WARMUP_FRAMES {
            self.baseline += WARMUP_ALPHA * (energy - self.baseline);
            self.baseline = self.baseline.max(BASELINE_FLOOR);
            return None;
        }

        let threshold = self.baseline * self.params.threshold_multiplier;

        match self.state {
            MarkerState::Idle => {
                self.baseline += self.params.adapt_rate * (energy - self.baseline);
                self.baseline = self.baseline.max(BASELINE_FLOOR);
                if energy > threshold {
                    self.state = MarkerState::InMarker {
                        onset_ms: now_ms - self.frame_ms,
                        frames: 1,
                        peak_energy: energy,
                    };
                }
                None
            }
            MarkerState::InMarker {
                onset_ms,
                frames,
                peak_energy,
            } => {
                if energy > threshold {
                    self.state = MarkerState::InMarker {
                        onset_ms,
                        frames: frames + 1,
                        peak_energy: peak_energy.max(energy),
                    };
                    return None;
                }

                self.state = MarkerState::Idle;
                let duration_ms = frames as f64 * self.frame_ms;
                if duration_ms < self.params.min_duration_ms
                    || duration_ms > self.params.max_duration_ms
                {
                    return None;
                }

                self.marker_count += 1;
                let since_last_ms = self
                    .last_marker_ms
                    .map(|prev| onset_ms - prev)
                    .unwrap_or(0.0);
                self.last_marker_ms = Some(onset_ms);

                Some(MarkerEvent {
                    number: self.marker_count,
                    timestamp_ms: onset_ms,
                    accumulated_energy: self.window_sum,
                    peak_energy,
                    duration_ms,
                    since_last_ms,
                })
            }
        }
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn apply_tunables(&mut self, params: &MarkerDetectorTunables) {
        self.params = *params;
    }

    pub fn reset(&mut self) {
        self.frame.reset();
        self.frames_seen = 0;
        self.baseline = 1.0;
        self.window.clear();
        self.window_sum = 0.0;
        self.state = MarkerState::Idle;
        self.last_marker_ms = None;
    }
}

impl std::fmt::Debug for FastMarkerDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastMarkerDetector")
            .field("state", &self.state)
            .field("baseline", &self.baseline)
            .field("markers", &self.marker_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    const FS: f64 = DETECTOR_RATE_HZ as f64;

    fn run_signal<F: Fn(f64) -> Complex64>(
        detector: &mut FastMarkerDetector,
        start_sample: &mut u64,
        ms: f64,
        f: F,
    ) -> Vec<MarkerEvent> {
        let n = (ms / 1000.0 * FS) as u64;
        let mut out = Vec::new();
        for _ in 0..n {
            let t = *start_sample as f64 / FS;
            let now_ms = t * 1000.0;
            *start_sample += 1;
            if let Some(ev) = detector.process_sample(f(t), now_ms) {
                out.push(ev);
            }
        }
        out
    }

    fn tone(t: f64) -> Complex64 {
        Complex64::new((TAU * 1000.0 * t).cos(), 0.0)
    }

    fn quiet(_t: f64) -> Complex64 {
        Complex64::new(0.001, 0.0)
    }

    #[test]
    fn test_800ms_pulse_emits_one_marker() {
        let mut det = FastMarkerDetector::new(MarkerDetectorTunables::default());
        let mut s = 0u64;
        run_signal(&mut det, &mut s, 2000.0, quiet);
        let mut events = run_signal(&mut det, &mut s, 800.0, tone);
        events.extend(run_signal(&mut det, &mut s, 1000.0, quiet));

        assert_eq!(events.len(), 1, "events: {events:?}");
        let m = &events[0];
        assert!((m.duration_ms - 800.0).abs() < 30.0, "duration {}", m.duration_ms);
        assert!((m.timestamp_ms - 2000.0).abs() < 30.0, "onset {}", m.timestamp_ms);
        assert!(m.accumulated_energy > 0.0);
    }

    #[test]
    fn test_short_tick_does_not_trigger() {
        let mut det = FastMarkerDetector::new(MarkerDetectorTunables::default());
        let mut s = 0u64;
        run_signal(&mut det, &mut s, 2000.0, quiet);
        let mut events = run_signal(&mut det, &mut s, 5.0, tone);
        events.extend(run_signal(&mut det, &mut s, 1000.0, quiet));
        assert!(events.is_empty(), "events: {events:?}");
    }

    #[test]
    fn test_since_last_tracks_minute_spacing() {
        let mut det = FastMarkerDetector::new(MarkerDetectorTunables::default());
        let mut s = 0u64;
        run_signal(&mut det, &mut s, 2000.0, quiet);
        let mut events = run_signal(&mut det, &mut s, 800.0, tone);
        events.extend(run_signal(&mut det, &mut s, 59_200.0, quiet));
        events.extend(run_signal(&mut det, &mut s, 800.0, tone));
        events.extend(run_signal(&mut det, &mut s, 1000.0, quiet));

        assert_eq!(events.len(), 2, "events: {events:?}");
        assert!((events[1].since_last_ms - 60_000.0).abs() < 50.0);
    }

    #[test]
    fn test_baseline_does_not_learn_the_marker() {
        let mut det = FastMarkerDetector::new(MarkerDetectorTunables::default());
        let mut s = 0u64;
        run_signal(&mut det, &mut s, 2000.0, quiet);
        let baseline_before = det.baseline();
        run_signal(&mut det, &mut s, 800.0, tone);
        let baseline_after = det.baseline();
        // One threshold-crossing frame may leak in before the state flips;
        // the bulk of the marker must not.
        assert!(
            baseline_after < baseline_before * 2.0 + 0.01,
            "baseline grew {baseline_before} -> {baseline_after}"
        );
    }
}
