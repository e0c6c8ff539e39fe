//! The receiver pipeline: decimation, channel split, detectors, correlators,
//! sync, epoch distribution, and telemetry fan-in.
//!
//! Single-threaded and sample-driven. One call to [`Pipeline::on_samples`]
//! pushes a block through the whole graph in sample order; events emitted
//! within a frame reach their consumers before the next frame is processed.
//! External consumers attach to the typed event buses; telemetry records
//! accumulate in an output queue drained by the host.

use num_complex::Complex64;

use crate::bus::EventBus;
use crate::calib::{DETECTOR_RATE_HZ, SLOW_RATE_HZ};
use crate::clock::{wrap_ms, SampleClock};
use crate::control::{CommandOutcome, CommandProcessor};
use crate::correlators::{BcdCorrelator, MarkerCorrelator, TickCorrelator};
use crate::detectors::{
    BcdFreqDetector, BcdTimeDetector, ChannelQualityMonitor, FastMarkerDetector,
    SlowMarkerDetector, SubcarrierMonitor, TickDetector, TickOutput,
};
use crate::dsp::{ComplexBiquad, DecimationChain, Normalizer, SlowFft};
use crate::epoch::{EpochEstimate, EpochSource};
use crate::errors::{ConfigError, IngestError, Result};
use crate::events::{
    BcdSymbolEvent, CorrelatedMarkerEvent, MarkerConfidence, MarkerEvent, SlowMarkerEvent,
    SlowMarkerFrame, SyncState, SyncTransition, TickEvent, TickMarkerEvent,
};
use crate::ingest::{normalize_s16, normalize_u8, StreamHeader, StreamMetadata};
use crate::logging::{LogConfig, PipelineLogger};
use crate::sync::SyncDetector;
use crate::telemetry::{ChannelMask, TelemetryRecord};
use crate::tunables::Tunables;

/// Sync-channel band-pass: 800-1400 Hz. Geometric center with Q sized for
/// ~600 Hz bandwidth.
const SYNC_BP_CENTER_HZ: f64 = 1058.0;
const SYNC_BP_Q: f64 = 1.76;

/// Data-channel low-pass corner for the 100 Hz subcarrier.
const DATA_LP_HZ: f64 = 150.0;

/// Cadence for driving the periodic-check family, in detector samples.
const HOUSEKEEPING_STRIDE: u64 = 256;

/// BCDS STATUS line cadence.
const BCD_STATUS_INTERVAL_MS: f64 = 10_000.0;

/// Static pipeline configuration, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub input_rate_hz: u32,
    pub log: LogConfigChoice,
}

/// Logging profile selection for the embedded logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogConfigChoice {
    Default,
    Verbose,
    Quiet,
}

impl PipelineConfig {
    pub fn new(input_rate_hz: u32) -> Self {
        Self {
            input_rate_hz,
            log: LogConfigChoice::Default,
        }
    }
}

/// Event buses for external subscribers, fixed at pipeline build.
pub struct PipelineBuses {
    pub tick: EventBus<TickEvent>,
    pub tick_marker: EventBus<TickMarkerEvent>,
    pub marker: EventBus<CorrelatedMarkerEvent>,
    pub slow_marker_frame: EventBus<SlowMarkerFrame>,
    pub sync: EventBus<SyncTransition>,
    pub bcd: EventBus<BcdSymbolEvent>,
    pub epoch: EventBus<EpochEstimate>,
}

impl PipelineBuses {
    fn new() -> Self {
        Self {
            tick: EventBus::new(),
            tick_marker: EventBus::new(),
            marker: EventBus::new(),
            slow_marker_frame: EventBus::new(),
            sync: EventBus::new(),
            bcd: EventBus::new(),
            epoch: EventBus::new(),
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    tunables: Tunables,
    logger: PipelineLogger,
    header: Option<StreamHeader>,

    clock: SampleClock,
    slow_clock: SampleClock,
    housekeeping_counter: u64,
    resets: u64,

    // Front end
    fd_chain: DecimationChain,
    fw_chain: DecimationChain,
    normalizer: Normalizer,
    sync_filter: ComplexBiquad,
    data_filter: ComplexBiquad,

    // Detectors
    tick: TickDetector,
    marker_fast: FastMarkerDetector,
    slow_fft: SlowFft,
    marker_slow: SlowMarkerDetector,
    subcarrier: SubcarrierMonitor,
    chan_quality: ChannelQualityMonitor,
    bcd_time: BcdTimeDetector,
    bcd_freq: BcdFreqDetector,

    // Correlators and sync
    tick_corr: TickCorrelator,
    marker_corr: MarkerCorrelator,
    bcd_corr: BcdCorrelator,
    sync: SyncDetector,
    subcarrier_anchored: bool,

    // Control and output
    commands: CommandProcessor,
    telemetry_mask: ChannelMask,
    telemetry_out: Vec<TelemetryRecord>,
    next_bcd_status_ms: f64,

    pub buses: PipelineBuses,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, tunables: Tunables) -> Result<Self> {
        Self::validate_rate(config.input_rate_hz)?;

        let log_config = match config.log {
            LogConfigChoice::Default => LogConfig::default(),
            LogConfigChoice::Verbose => LogConfig::verbose(),
            LogConfigChoice::Quiet => LogConfig::quiet(),
        };

        let detector_rate = DETECTOR_RATE_HZ as f64;
        Ok(Self {
            config,
            tunables,
            logger: PipelineLogger::new(log_config),
            header: None,
            clock: SampleClock::new(DETECTOR_RATE_HZ),
            slow_clock: SampleClock::new(SLOW_RATE_HZ),
            housekeeping_counter: 0,
            resets: 0,
            fd_chain: DecimationChain::new(config.input_rate_hz, DETECTOR_RATE_HZ)?,
            fw_chain: DecimationChain::new(config.input_rate_hz, SLOW_RATE_HZ)?,
            normalizer: Normalizer::new(),
            sync_filter: ComplexBiquad::bandpass(detector_rate, SYNC_BP_CENTER_HZ, SYNC_BP_Q),
            data_filter: ComplexBiquad::lowpass(
                detector_rate,
                DATA_LP_HZ,
                std::f64::consts::FRAC_1_SQRT_2,
            ),
            tick: TickDetector::new(tunables.tick_detector),
            marker_fast: FastMarkerDetector::new(tunables.marker_detector),
            slow_fft: SlowFft::new(),
            marker_slow: SlowMarkerDetector::new(tunables.marker_detector),
            subcarrier: SubcarrierMonitor::new(),
            chan_quality: ChannelQualityMonitor::new(),
            bcd_time: BcdTimeDetector::new(),
            bcd_freq: BcdFreqDetector::new(),
            tick_corr: TickCorrelator::new(tunables.tick_correlator),
            marker_corr: MarkerCorrelator::new(tunables.marker_detector),
            bcd_corr: BcdCorrelator::new(),
            sync: SyncDetector::new(tunables.sync_detector),
            subcarrier_anchored: false,
            commands: CommandProcessor::new(),
            telemetry_mask: ChannelMask::all(),
            telemetry_out: Vec::new(),
            next_bcd_status_ms: BCD_STATUS_INTERVAL_MS,
            buses: PipelineBuses::new(),
        })
    }

    fn validate_rate(rate: u32) -> Result<()> {
        if rate == 0 {
            return Err(ConfigError::InvalidSampleRate { rate }.into());
        }
        if rate % DETECTOR_RATE_HZ != 0 || rate % SLOW_RATE_HZ != 0 {
            return Err(ConfigError::SampleRateNotDecimable {
                rate,
                fd: DETECTOR_RATE_HZ,
                fw: SLOW_RATE_HZ,
            }
            .into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport contract
    // ------------------------------------------------------------------

    /// Stream header from the transport. A rate change rebuilds the
    /// decimation chains and clears all DSP state.
    pub fn on_stream_header(&mut self, header: StreamHeader) -> Result<()> {
        if header.sample_rate_hz != self.config.input_rate_hz {
            Self::validate_rate(header.sample_rate_hz)?;
            self.config.input_rate_hz = header.sample_rate_hz;
            self.fd_chain = DecimationChain::new(header.sample_rate_hz, DETECTOR_RATE_HZ)?;
            self.fw_chain = DecimationChain::new(header.sample_rate_hz, SLOW_RATE_HZ)?;
            self.reset_dsp();
        }
        self.logger.info(
            "INGEST",
            format!(
                "stream header: {} Hz, {:?}, center {} Hz",
                header.sample_rate_hz, header.sample_format, header.center_freq_hz
            ),
        );
        self.header = Some(header);
        Ok(())
    }

    /// A block of float samples. `reset` forces a full DSP state clear
    /// before the block is processed.
    pub fn on_samples(&mut self, i: &[f32], q: &[f32], reset: bool) -> Result<()> {
        if i.len() != q.len() {
            return Err(IngestError::BlockLengthMismatch {
                i_len: i.len(),
                q_len: q.len(),
                count: i.len().min(q.len()),
            }
            .into());
        }
        if reset {
            self.reset_dsp();
        }
        for (&si, &sq) in i.iter().zip(q.iter()) {
            self.process_iq(Complex64::new(si as f64, sq as f64));
        }
        Ok(())
    }

    /// S16 sample block, normalized by 1/32768.
    pub fn on_samples_s16(&mut self, i: &[i16], q: &[i16], reset: bool) -> Result<()> {
        self.on_samples(&normalize_s16(i), &normalize_s16(q), reset)
    }

    /// U8 sample block, centered on 128.
    pub fn on_samples_u8(&mut self, i: &[u8], q: &[u8], reset: bool) -> Result<()> {
        self.on_samples(&normalize_u8(i), &normalize_u8(q), reset)
    }

    /// Mid-stream metadata. A sample-rate change is handled like a new
    /// header; gain and LNA changes are logged only.
    pub fn on_metadata(&mut self, metadata: StreamMetadata) -> Result<()> {
        if let Some(rate) = metadata.sample_rate_hz {
            if rate != self.config.input_rate_hz {
                let mut header = self.header.ok_or(IngestError::HeaderMissing)?;
                header.sample_rate_hz = rate;
                self.on_stream_header(header)?;
            }
        }
        if let Some(center) = metadata.center_freq_hz {
            if let Some(header) = self.header.as_mut() {
                header.center_freq_hz = center;
            }
        }
        if metadata.gain_reduction_db.is_some() || metadata.lna_state.is_some() {
            self.logger.info(
                "INGEST",
                format!(
                    "metadata: gain_reduction={:?} lna={:?}",
                    metadata.gain_reduction_db, metadata.lna_state
                ),
            );
        }
        Ok(())
    }

    /// Clear all DSP and detection state. The monotonic clock keeps
    /// counting; timestamps stay comparable across a reconnect.
    pub fn reset_dsp(&mut self) {
        self.resets += 1;
        let now = self.clock.now_ms();

        self.fd_chain.reset();
        self.fw_chain.reset();
        self.normalizer.reset();
        self.sync_filter.reset();
        self.data_filter.reset();
        self.tick.reset();
        self.marker_fast.reset();
        self.slow_fft.reset();
        self.marker_slow.reset();
        self.subcarrier.reset();
        self.chan_quality.reset();
        self.bcd_time.reset();
        self.bcd_freq.reset();
        self.tick_corr.reset();
        self.marker_corr.reset();
        self.bcd_corr.reset();
        self.sync.on_stream_reset(now);
        self.subcarrier_anchored = false;

        self.flush_sync_transitions(now);
        self.logger.warn("INGEST", format!("DSP state cleared at {now:.1} ms"));
    }

    // ------------------------------------------------------------------
    // Sample path
    // ------------------------------------------------------------------

    fn process_iq(&mut self, raw: Complex64) {
        if let Some(detector_sample) = self.fd_chain.push(raw) {
            self.clock.advance(1);
            let now = self.clock.now_ms();

            let normalized = self.normalizer.process(detector_sample);
            let sync_sample = self.sync_filter.process(normalized);
            let data_sample = self.data_filter.process(normalized);

            if let Some(output) = self.tick.process_sample(sync_sample, now) {
                self.handle_tick_output(output, now);
            }
            if let Some(marker) = self.marker_fast.process_sample(sync_sample, now) {
                self.handle_fast_marker(marker, now);
            }
            if let Some(pulse) = self.bcd_time.process_sample(data_sample, now) {
                self.bcd_corr.on_time_pulse(&pulse);
            }
            if let Some(pulse) = self.bcd_freq.process_sample(data_sample, now) {
                self.bcd_corr.on_freq_pulse(&pulse);
            }

            self.housekeeping_counter += 1;
            if self.housekeeping_counter % HOUSEKEEPING_STRIDE == 0 {
                self.run_housekeeping(now);
            }
        }

        if let Some(slow_sample) = self.fw_chain.push(raw) {
            self.slow_clock.advance(1);
            let now = self.slow_clock.now_ms();

            if let Some(frame) = self.slow_fft.push(slow_sample) {
                let (slow_frame, slow_event) = self.marker_slow.process_frame(&frame, now);
                self.buses.slow_marker_frame.publish(&slow_frame);
                if let Some(event) = slow_event {
                    self.handle_slow_marker(event, now);
                }
                if let Some(report) = self.subcarrier.process_frame(&frame, now) {
                    self.emit(TelemetryRecord::Subc(report));
                }
                if let Some(report) = self.chan_quality.process_frame(&frame, now) {
                    self.emit(TelemetryRecord::Chan(report));
                }
            }
        }
    }

    fn handle_tick_output(&mut self, output: TickOutput, now: f64) {
        match output {
            TickOutput::Tick(event) => {
                if let Some(epoch) = self.tick_corr.on_tick(&event) {
                    self.install_epoch(epoch);
                }
                self.sync.on_tick(&event);

                let expected = match self.sync.last_marker_ms() {
                    Some(anchor) => {
                        let phase = wrap_ms(event.leading_edge_ms - anchor, 1000.0);
                        let distance = phase.min(1000.0 - phase);
                        (distance <= self.tunables.sync_detector.tick_tolerance_ms) as i8
                    }
                    None => -1,
                };
                self.emit(TelemetryRecord::Tick {
                    event: event.clone(),
                    expected,
                });
                self.buses.tick.publish(&event);
                self.flush_sync_transitions(now);
            }
            TickOutput::Marker(event) => {
                // Marker-derived epoch installs only while nothing stronger
                // is held.
                let epoch =
                    EpochEstimate::new(event.leading_edge_ms, EpochSource::Marker, 0.7);
                if self.tick.install_epoch(epoch) {
                    self.logger.info(
                        "EPOCH",
                        format!("marker epoch installed at {:.1} ms", epoch.offset_ms),
                    );
                    self.buses.epoch.publish(&epoch);
                }
                self.buses.tick_marker.publish(&event);
            }
        }
    }

    fn handle_fast_marker(&mut self, event: MarkerEvent, now: f64) {
        self.emit(TelemetryRecord::Mark(event.clone()));
        if let Some(correlated) = self.marker_corr.on_fast(&event) {
            self.handle_correlated_marker(correlated, now);
        }
    }

    fn handle_slow_marker(&mut self, event: SlowMarkerEvent, now: f64) {
        if let Some(correlated) = self.marker_corr.on_slow(&event) {
            self.handle_correlated_marker(correlated, now);
        }
    }

    fn handle_correlated_marker(&mut self, event: CorrelatedMarkerEvent, now: f64) {
        match event.confidence {
            MarkerConfidence::High => {
                if let Some(tick) = self.sync.take_pending_tick() {
                    let offset = event.timestamp_ms - tick.leading_edge_ms;
                    self.logger.debug(
                        "SYNC",
                        format!("tick-to-marker offset {offset:.1} ms"),
                    );
                }
                self.sync.on_confirmed_marker(&event);
            }
            MarkerConfidence::Low => {
                self.sync.on_p_marker(&event);
            }
        }
        self.buses.marker.publish(&event);
        self.refresh_gates(now);
        self.flush_sync_transitions(now);
    }

    fn install_epoch(&mut self, epoch: EpochEstimate) {
        if self.tick.install_epoch(epoch) {
            self.logger.info(
                "EPOCH",
                format!(
                    "epoch {} at {:.1} ms, confidence {:.2}",
                    epoch.source.as_str(),
                    epoch.offset_ms,
                    epoch.confidence
                ),
            );
            self.buses.epoch.publish(&epoch);
        }
    }

    fn run_housekeeping(&mut self, now: f64) {
        self.sync.on_clock(now);
        self.tick_corr.on_clock(now);

        for orphan in self.marker_corr.on_clock(now) {
            self.handle_correlated_marker(orphan, now);
        }

        for symbol in self.bcd_corr.on_clock(now) {
            self.emit(TelemetryRecord::BcdSymbol(symbol.clone()));
            self.buses.bcd.publish(&symbol);
        }

        if now >= self.next_bcd_status_ms {
            if self.bcd_corr.is_gated_open() {
                self.emit(TelemetryRecord::BcdStatus {
                    timestamp_ms: now,
                    symbols_since_start: self.bcd_corr.symbols_emitted(),
                });
            }
            self.next_bcd_status_ms = now + BCD_STATUS_INTERVAL_MS;
        }

        self.refresh_gates(now);
        self.flush_sync_transitions(now);
    }

    fn refresh_gates(&mut self, now: f64) {
        let context = self.sync.context();
        self.bcd_corr.set_gate(
            context.state == SyncState::Locked,
            context.last_marker_ms,
            now,
        );
        if let Some(anchor) = context.last_marker_ms {
            if !self.subcarrier_anchored {
                self.subcarrier.set_anchor(anchor);
                self.subcarrier_anchored = true;
            }
        }
    }

    fn flush_sync_transitions(&mut self, _now: f64) {
        for transition in self.sync.drain_transitions() {
            self.logger.info(
                "SYNC",
                format!(
                    "{} -> {} (confidence {:.3})",
                    transition.old_state.as_str(),
                    transition.new_state.as_str(),
                    transition.confidence
                ),
            );
            self.emit(TelemetryRecord::Sync(transition.clone()));
            self.buses.sync.publish(&transition);
        }
    }

    // ------------------------------------------------------------------
    // Control plane and host access
    // ------------------------------------------------------------------

    /// Handle one control-command line. On a successful parameter update the
    /// new table is pushed into every component; INI write-back is the
    /// host's job via [`Pipeline::tunables`].
    pub fn handle_command(&mut self, line: &str) -> CommandOutcome {
        let now = self.clock.now_ms();
        let outcome = self
            .commands
            .handle_line(line, now, &mut self.tunables);

        if outcome.params_updated {
            self.tick.apply_tunables(&self.tunables.tick_detector);
            self.tick_corr.apply_tunables(&self.tunables.tick_correlator);
            self.marker_fast.apply_tunables(&self.tunables.marker_detector);
            self.marker_slow.apply_tunables(&self.tunables.marker_detector);
            self.marker_corr.apply_tunables(&self.tunables.marker_detector);
            self.sync.apply_tunables(&self.tunables.sync_detector);
            self.logger.info("CONTROL", &outcome.response);
        }
        if let Some((channel, enabled)) = outcome.telem_change {
            self.telemetry_mask.set(channel, enabled);
        }
        outcome
    }

    fn emit(&mut self, record: TelemetryRecord) {
        if self.telemetry_mask.is_enabled(record.channel()) {
            self.telemetry_out.push(record);
        }
    }

    /// Drain telemetry records accumulated since the last call, in emission
    /// order.
    pub fn drain_telemetry(&mut self) -> Vec<TelemetryRecord> {
        std::mem::take(&mut self.telemetry_out)
    }

    /// Drain collected log entries.
    pub fn drain_logs(&mut self) -> Vec<crate::logging::LogEntry> {
        self.logger.drain()
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Replace the full tunable table (startup INI reload).
    pub fn apply_tunables(&mut self, tunables: Tunables) {
        self.tunables = tunables;
        self.tick.apply_tunables(&self.tunables.tick_detector);
        self.tick_corr.apply_tunables(&self.tunables.tick_correlator);
        self.marker_fast.apply_tunables(&self.tunables.marker_detector);
        self.marker_slow.apply_tunables(&self.tunables.marker_detector);
        self.marker_corr.apply_tunables(&self.tunables.marker_detector);
        self.sync.apply_tunables(&self.tunables.sync_detector);
    }

    pub fn sync_context(&self) -> crate::events::SyncContext {
        self.sync.context()
    }

    pub fn epoch(&self) -> EpochEstimate {
        self.tick.epoch()
    }

    /// Stream time in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Number of DSP resets since construction.
    pub fn reset_count(&self) -> u64 {
        self.resets
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("input_rate_hz", &self.config.input_rate_hz)
            .field("now_ms", &self.clock.now_ms())
            .field("sync", &self.sync.context())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_decimable_rate() {
        let result = Pipeline::new(PipelineConfig::new(2_000_000), Tunables::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_accepts_common_multiple_rates() {
        for rate in [300_000, 600_000, 1_200_000, 2_400_000] {
            assert!(
                Pipeline::new(PipelineConfig::new(rate), Tunables::default()).is_ok(),
                "rate {rate}"
            );
        }
    }

    #[test]
    fn test_mismatched_block_lengths_rejected() {
        let mut pipeline =
            Pipeline::new(PipelineConfig::new(300_000), Tunables::default()).unwrap();
        let i = vec![0.0f32; 100];
        let q = vec![0.0f32; 99];
        assert!(pipeline.on_samples(&i, &q, false).is_err());
    }

    #[test]
    fn test_clock_advances_with_samples() {
        let mut pipeline =
            Pipeline::new(PipelineConfig::new(300_000), Tunables::default()).unwrap();
        let i = vec![0.0f32; 300_000];
        let q = vec![0.0f32; 300_000];
        pipeline.on_samples(&i, &q, false).unwrap();
        assert!((pipeline.now_ms() - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_reset_flag_counts_once() {
        let mut pipeline =
            Pipeline::new(PipelineConfig::new(300_000), Tunables::default()).unwrap();
        let i = vec![0.0f32; 3000];
        let q = vec![0.0f32; 3000];
        pipeline.on_samples(&i, &q, false).unwrap();
        assert_eq!(pipeline.reset_count(), 0);
        pipeline.on_samples(&i, &q, true).unwrap();
        assert_eq!(pipeline.reset_count(), 1);
        pipeline.on_samples(&i, &q, false).unwrap();
        assert_eq!(pipeline.reset_count(), 1);
    }

    #[test]
    fn test_command_updates_detector_params() {
        let mut pipeline =
            Pipeline::new(PipelineConfig::new(300_000), Tunables::default()).unwrap();
        let outcome = pipeline.handle_command("SET_TICK_THRESHOLD 3.5");
        assert_eq!(outcome.response, "OK threshold_multiplier=3.500");
        assert_eq!(pipeline.tunables().tick_detector.threshold_multiplier, 3.5);
    }

    #[test]
    fn test_disabled_channel_suppresses_records() {
        let mut pipeline =
            Pipeline::new(PipelineConfig::new(300_000), Tunables::default()).unwrap();
        pipeline.handle_command("DISABLE_TELEM CHAN");

        // Two seconds of carrier: CHAN records would normally flow.
        let i = vec![0.5f32; 300_000];
        let q = vec![0.0f32; 300_000];
        pipeline.on_samples(&i, &q, false).unwrap();
        pipeline.on_samples(&i, &q, false).unwrap();

        let records = pipeline.drain_telemetry();
        assert!(records
            .iter()
            .all(|r| r.channel() != crate::telemetry::TelemetryChannel::Chan));
    }
}
