//! Tick and long-pulse detection on the sync channel.
//!
//! Two mechanisms run in parallel over the 50 kHz sync channel: an
//! energy-threshold state machine over 256-point windowed FFT frames, and a
//! matched-filter correlator against a Hann-windowed 1000 Hz template. The
//! state machine finds pulse boundaries; the correlator vets tick-length
//! pulses by tone shape so broadband crackle does not count.

use std::f64::consts::TAU;

use num_complex::Complex64;

use crate::calib::{DETECTOR_RATE_HZ, FILTER_DELAY_MS, TICK_FRAME_LEN};
use crate::dsp::tone::{mirror_bins, FramePower};
use crate::dsp::window::hann;
use crate::epoch::EpochEstimate;
use crate::events::{TickEvent, TickMarkerEvent};
use crate::tunables::TickDetectorTunables;

/// Matched-filter template length: one nominal tick (5 ms).
const TEMPLATE_LEN: usize = 250;

/// Correlator evaluation stride, in samples.
const CORR_DECIMATION: usize = 8;

/// Pulse duration hard cap. Anything longer is force-terminated.
const MAX_PULSE_MS: f64 = 1000.0;

/// Dwell after a pulse before the state machine re-arms.
const COOLDOWN_MS: f64 = 500.0;

/// Frames of accelerated noise adaptation after start or reset.
const WARMUP_FRAMES: u64 = 50;
const WARMUP_ALPHA: f64 = 0.05;

const NOISE_FLOOR_MIN: f64 = 1e-4;
const NOISE_FLOOR_MAX: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum PulseState {
    Idle,
    InPulse {
        start_ms: f64,
        frames: u32,
        peak_energy: f64,
    },
    Cooldown {
        until_ms: f64,
    },
}

/// A classified pulse from the tick detector.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutput {
    Tick(TickEvent),
    Marker(TickMarkerEvent),
}

pub struct TickDetector {
    params: TickDetectorTunables,

    // Energy path
    frame: FramePower,
    frame_ms: f64,
    frames_seen: u64,
    noise_floor: f64,
    state: PulseState,

    // Matched-filter path
    template: Vec<Complex64>,
    ring: Vec<Complex64>,
    ring_pos: usize,
    corr_countdown: usize,
    corr_noise_floor: f64,
    corr_peak: f64,

    // Classification bookkeeping
    tick_count: u64,
    marker_count: u64,
    last_leading_ms: Option<f64>,
    avg_interval_ms: f64,
    rejected: u64,
    epoch: EpochEstimate,
}

impl TickDetector {
    pub fn new(params: TickDetectorTunables) -> Self {
        let rate = DETECTOR_RATE_HZ as f64;
        let bins = mirror_bins(TICK_FRAME_LEN, rate, 1000.0, 200.0);

        let window = hann(TEMPLATE_LEN);
        let template = (0..TEMPLATE_LEN)
            .map(|n| {
                let phase = TAU * 1000.0 * n as f64 / rate;
                Complex64::new(phase.cos(), phase.sin()) * window[n]
            })
            .collect();

        Self {
            params,
            frame: FramePower::new(TICK_FRAME_LEN, bins),
            frame_ms: TICK_FRAME_LEN as f64 / rate * 1000.0,
            frames_seen: 0,
            noise_floor: 1.0,
            state: PulseState::Idle,
            template,
            ring: vec![Complex64::new(0.0, 0.0); TEMPLATE_LEN],
            ring_pos: 0,
            corr_countdown: CORR_DECIMATION,
            corr_noise_floor: 1e-3,
            corr_peak: 0.0,
            tick_count: 0,
            marker_count: 0,
            last_leading_ms: None,
            avg_interval_ms: 1000.0,
            rejected: 0,
            epoch: EpochEstimate::none(),
        }
    }

    /// Feed one sync-channel sample. `now_ms` is the sample's timestamp on
    /// the detector clock. Returns a classified pulse at most once per frame.
    pub fn process_sample(&mut self, sample: Complex64, now_ms: f64) -> Option<TickOutput> {
        self.update_correlator(sample);

        let energy = self.frame.push(sample)?;
        self.frames_seen += 1;

        // Warm-up: adapt the floor quickly, detect nothing.
        if self.frames_seen <= WARMUP_FRAMES {
            self.noise_floor += WARMUP_ALPHA * (energy - self.noise_floor);
            self.clamp_noise_floor();
            return None;
        }

        let high = self.noise_floor * self.params.threshold_multiplier;
        let low = high * 0.7;

        match self.state {
            PulseState::Idle => {
                self.adapt_noise_floor(energy);
                if energy > high {
                    // Correlation peak is judged within the pulse only, so
                    // stray noise maxima from the idle stretch cannot vouch
                    // for it.
                    self.corr_peak = 0.0;
                    self.state = PulseState::InPulse {
                        start_ms: now_ms - self.frame_ms,
                        frames: 1,
                        peak_energy: energy,
                    };
                }
                None
            }
            PulseState::InPulse {
                start_ms,
                frames,
                peak_energy,
            } => {
                let frames = frames + 1;
                let peak_energy = peak_energy.max(energy);
                let duration_ms = frames as f64 * self.frame_ms;

                if energy < low || duration_ms > MAX_PULSE_MS {
                    // Dwell is measured from pulse onset so a long marker
                    // pulse does not push the re-arm past the next second's
                    // tick.
                    self.state = PulseState::Cooldown {
                        until_ms: (start_ms + COOLDOWN_MS).max(now_ms),
                    };
                    self.classify_pulse(start_ms, now_ms, peak_energy)
                } else {
                    self.state = PulseState::InPulse {
                        start_ms,
                        frames,
                        peak_energy,
                    };
                    None
                }
            }
            PulseState::Cooldown { until_ms } => {
                self.adapt_noise_floor(energy);
                if now_ms >= until_ms {
                    self.state = PulseState::Idle;
                }
                None
            }
        }
    }

    fn update_correlator(&mut self, sample: Complex64) {
        self.ring[self.ring_pos] = sample;
        self.ring_pos = (self.ring_pos + 1) % TEMPLATE_LEN;

        self.corr_countdown -= 1;
        if self.corr_countdown > 0 {
            return;
        }
        self.corr_countdown = CORR_DECIMATION;

        let mut acc = Complex64::new(0.0, 0.0);
        for (i, t) in self.template.iter().enumerate() {
            let s = self.ring[(self.ring_pos + i) % TEMPLATE_LEN];
            acc += s * t.conj();
        }
        let corr = acc.norm() / TEMPLATE_LEN as f64;

        self.corr_peak = self.corr_peak.max(corr);

        // Track the correlation floor only outside pulses. Evaluations run
        // 32x more often than FFT frames; the adaptation rates are scaled to
        // keep the same time constants as the energy floor.
        if matches!(self.state, PulseState::Idle) {
            let scale = CORR_DECIMATION as f64 / TICK_FRAME_LEN as f64;
            let alpha = if self.frames_seen <= WARMUP_FRAMES {
                0.01
            } else if corr < self.corr_noise_floor {
                self.params.adapt_down * scale
            } else {
                self.params.adapt_up * scale
            };
            self.corr_noise_floor += alpha * (corr - self.corr_noise_floor);
            self.corr_noise_floor = self.corr_noise_floor.clamp(NOISE_FLOOR_MIN, NOISE_FLOOR_MAX);
        }
    }

    fn adapt_noise_floor(&mut self, energy: f64) {
        let alpha = if energy < self.noise_floor {
            self.params.adapt_down
        } else {
            self.params.adapt_up
        };
        self.noise_floor += alpha * (energy - self.noise_floor);
        self.clamp_noise_floor();
    }

    fn clamp_noise_floor(&mut self) {
        self.noise_floor = self.noise_floor.clamp(NOISE_FLOOR_MIN, NOISE_FLOOR_MAX);
    }

    fn classify_pulse(
        &mut self,
        start_ms: f64,
        trailing_ms: f64,
        peak_energy: f64,
    ) -> Option<TickOutput> {
        let duration_ms = trailing_ms - start_ms;
        let leading_ms = trailing_ms - duration_ms - FILTER_DELAY_MS;

        let corr_peak = self.corr_peak;
        self.corr_peak = 0.0;
        let corr_ratio = corr_peak / self.corr_noise_floor.max(NOISE_FLOOR_MIN);

        let interval = self.last_leading_ms.map(|prev| leading_ms - prev);
        let interval_ok = interval.map_or(true, |i| i >= self.params.min_interval_ms);

        let p = &self.params;
        let is_marker =
            duration_ms >= p.marker_min_ms && duration_ms <= p.marker_max_ms && interval_ok;
        let is_tick = duration_ms >= p.min_duration_ms
            && duration_ms <= p.max_tick_duration_ms
            && interval_ok
            && corr_ratio >= p.corr_threshold;

        if is_tick && !self.phase_gate_accepts(leading_ms) {
            self.rejected += 1;
            return None;
        }

        if is_marker {
            self.marker_count += 1;
            self.last_leading_ms = Some(leading_ms);
            Some(TickOutput::Marker(TickMarkerEvent {
                number: self.marker_count,
                trailing_edge_ms: trailing_ms,
                leading_edge_ms: leading_ms,
                duration_ms,
                peak_energy,
                interval_ms: interval.unwrap_or(0.0),
                noise_floor: self.noise_floor,
                corr_peak,
                corr_ratio,
            }))
        } else if is_tick {
            self.tick_count += 1;
            if let Some(i) = interval {
                self.avg_interval_ms += 0.1 * (i - self.avg_interval_ms);
            }
            let avg = self.avg_interval_ms;
            self.last_leading_ms = Some(leading_ms);
            Some(TickOutput::Tick(TickEvent {
                number: self.tick_count,
                trailing_edge_ms: trailing_ms,
                leading_edge_ms: leading_ms,
                duration_ms,
                peak_energy,
                interval_ms: interval.unwrap_or(0.0),
                avg_interval_ms: avg,
                noise_floor: self.noise_floor,
                corr_peak,
                corr_ratio,
            }))
        } else {
            self.rejected += 1;
            None
        }
    }

    /// Epoch gate: with an installed epoch, a candidate tick's leading edge
    /// must land within tolerance of the second boundary. Suppresses 1000 Hz
    /// harmonics of the BCD subcarrier mid-second.
    fn phase_gate_accepts(&self, leading_ms: f64) -> bool {
        if !self.params.epoch_gate_enabled || self.epoch.source == crate::epoch::EpochSource::None {
            return true;
        }
        let phase = self.epoch.phase_of(leading_ms);
        phase.min(1000.0 - phase) <= self.params.epoch_gate_tolerance_ms
    }

    /// Install an epoch if it supersedes the current one under the source
    /// precedence order. Returns whether it was installed.
    pub fn install_epoch(&mut self, epoch: EpochEstimate) -> bool {
        if epoch.supersedes(&self.epoch) {
            self.epoch = epoch;
            true
        } else {
            false
        }
    }

    pub fn epoch(&self) -> EpochEstimate {
        self.epoch
    }

    pub fn noise_floor(&self) -> f64 {
        self.noise_floor
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    pub fn apply_tunables(&mut self, params: &TickDetectorTunables) {
        self.params = *params;
    }

    /// Clear all DSP and classification state. Used on stream discontinuity.
    pub fn reset(&mut self) {
        self.frame.reset();
        self.frames_seen = 0;
        self.noise_floor = 1.0;
        self.state = PulseState::Idle;
        self.ring.fill(Complex64::new(0.0, 0.0));
        self.ring_pos = 0;
        self.corr_countdown = CORR_DECIMATION;
        self.corr_noise_floor = 1e-3;
        self.corr_peak = 0.0;
        self.last_leading_ms = None;
        self.avg_interval_ms = 1000.0;
        self.epoch = EpochEstimate::none();
    }
}

impl std::fmt::Debug for TickDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDetector")
            .field("state", &self.state)
            .field("noise_floor", &self.noise_floor)
            .field("ticks", &self.tick_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calib::SECOND_MS;

    const FS: f64 = DETECTOR_RATE_HZ as f64;

    struct Feeder {
        detector: TickDetector,
        sample_idx: u64,
    }

    impl Feeder {
        fn new() -> Self {
            Self {
                detector: TickDetector::new(TickDetectorTunables::default()),
                sample_idx: 0,
            }
        }

        /// Feed `ms` milliseconds of signal from `f(t_seconds) -> sample`.
        fn feed<F: Fn(f64) -> Complex64>(&mut self, ms: f64, f: F) -> Vec<TickOutput> {
            let n = (ms / 1000.0 * FS) as u64;
            let mut out = Vec::new();
            for _ in 0..n {
                let t = self.sample_idx as f64 / FS;
                let now_ms = self.sample_idx as f64 / FS * 1000.0;
                self.sample_idx += 1;
                if let Some(ev) = self.detector.process_sample(f(t), now_ms) {
                    out.push(ev);
                }
            }
            out
        }
    }

    fn tone(t: f64, amp: f64) -> Complex64 {
        Complex64::new(amp * (TAU * 1000.0 * t).cos(), 0.0)
    }

    fn quiet(_t: f64) -> Complex64 {
        Complex64::new(0.001, 0.0)
    }

    #[test]
    fn test_detects_second_spaced_ticks() {
        let mut feeder = Feeder::new();
        // Warm up on silence.
        feeder.feed(1000.0, quiet);

        let mut events = Vec::new();
        for _ in 0..5 {
            events.extend(feeder.feed(5.0, |t| tone(t, 1.0)));
            events.extend(feeder.feed(995.0, quiet));
        }

        let ticks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TickOutput::Tick(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.len(), 5, "events: {events:?}");

        for pair in ticks.windows(2) {
            let interval = pair[1].leading_edge_ms - pair[0].leading_edge_ms;
            assert!(
                (interval - SECOND_MS).abs() < 25.0,
                "interval {interval}"
            );
        }
    }

    #[test]
    fn test_leading_edge_invariant() {
        let mut feeder = Feeder::new();
        feeder.feed(1000.0, quiet);
        let events = feeder.feed(1000.0, |t| {
            if (t * 1000.0) % 1000.0 < 5.0 {
                tone(t, 1.0)
            } else {
                quiet(t)
            }
        });

        for ev in &events {
            if let TickOutput::Tick(t) = ev {
                let reconstructed = t.leading_edge_ms + t.duration_ms + FILTER_DELAY_MS;
                assert!((reconstructed - t.trailing_edge_ms).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_long_pulse_classified_as_marker() {
        let mut feeder = Feeder::new();
        feeder.feed(1000.0, quiet);

        let mut events = feeder.feed(800.0, |t| tone(t, 1.0));
        events.extend(feeder.feed(1000.0, quiet));

        let markers = events
            .iter()
            .filter(|e| matches!(e, TickOutput::Marker(_)))
            .count();
        let ticks = events
            .iter()
            .filter(|e| matches!(e, TickOutput::Tick(_)))
            .count();
        assert_eq!(markers, 1, "events: {events:?}");
        assert_eq!(ticks, 0);
    }

    #[test]
    fn test_min_interval_rejects_close_pulses() {
        let mut feeder = Feeder::new();
        feeder.feed(1000.0, quiet);

        let mut events = Vec::new();
        // Two bursts 600 ms apart: second violates the 800 ms minimum.
        // The 500 ms cooldown has expired by then, so the gate is interval.
        events.extend(feeder.feed(5.0, |t| tone(t, 1.0)));
        events.extend(feeder.feed(595.0, quiet));
        events.extend(feeder.feed(5.0, |t| tone(t, 1.0)));
        events.extend(feeder.feed(600.0, quiet));

        let ticks = events
            .iter()
            .filter(|e| matches!(e, TickOutput::Tick(_)))
            .count();
        assert_eq!(ticks, 1, "events: {events:?}");
    }

    #[test]
    fn test_no_events_on_noise_floor_alone() {
        let mut feeder = Feeder::new();
        let events = feeder.feed(5000.0, quiet);
        assert!(events.is_empty(), "events: {events:?}");
    }

    #[test]
    fn test_epoch_gate_rejects_off_phase_pulses() {
        let mut feeder = Feeder::new();
        let mut params = TickDetectorTunables::default();
        params.epoch_gate_enabled = true;
        params.epoch_gate_tolerance_ms = 100.0;
        feeder.detector.apply_tunables(&params);
        feeder.detector.install_epoch(EpochEstimate::new(
            0.0,
            crate::epoch::EpochSource::TickChain,
            0.9,
        ));

        feeder.feed(1000.0, quiet);
        // Burst at mid-second: phase ~500 ms from the epoch, outside the gate.
        feeder.feed(500.0, quiet);
        let mut events = feeder.feed(5.0, |t| tone(t, 1.0));
        events.extend(feeder.feed(495.0, quiet));

        let ticks = events
            .iter()
            .filter(|e| matches!(e, TickOutput::Tick(_)))
            .count();
        assert_eq!(ticks, 0, "events: {events:?}");
        assert!(feeder.detector.rejected_count() >= 1);
    }
}
