//! Shared fixtures: signal feeding and telemetry bookkeeping.

use wwvlock_core::events::{BcdSymbolEvent, MarkerEvent, SubcarrierReport, SyncTransition};
use wwvlock_core::pipeline::{Pipeline, PipelineConfig};
use wwvlock_core::synth::{NoiseGenerator, WwvSignalGenerator};
use wwvlock_core::telemetry::TelemetryRecord;
use wwvlock_core::Tunables;

/// Lowest input rate that decimates to both internal rates.
pub const TEST_RATE_HZ: u32 = 300_000;

/// Feed block size: 100 ms of input.
pub const BLOCK: usize = 30_000;

/// Telemetry sorted into per-channel bins.
#[derive(Debug, Default)]
pub struct Collected {
    pub ticks: Vec<(wwvlock_core::events::TickEvent, i8)>,
    pub marks: Vec<MarkerEvent>,
    pub syncs: Vec<SyncTransition>,
    pub bcd_symbols: Vec<BcdSymbolEvent>,
    pub subc: Vec<SubcarrierReport>,
    pub chan: Vec<wwvlock_core::events::ChannelReport>,
}

impl Collected {
    pub fn absorb(&mut self, records: Vec<TelemetryRecord>) {
        for record in records {
            match record {
                TelemetryRecord::Tick { event, expected } => self.ticks.push((event, expected)),
                TelemetryRecord::Mark(m) => self.marks.push(m),
                TelemetryRecord::Sync(s) => self.syncs.push(s),
                TelemetryRecord::BcdSymbol(b) => self.bcd_symbols.push(b),
                TelemetryRecord::Subc(s) => self.subc.push(s),
                TelemetryRecord::Chan(c) => self.chan.push(c),
                TelemetryRecord::BcdStatus { .. } => {}
            }
        }
    }

    /// Ticks whose phase lands in a given second of the minute, assuming
    /// the broadcast minute starts at stream time zero.
    pub fn ticks_in_second_of_minute(&self, second: u32) -> usize {
        self.ticks
            .iter()
            .filter(|(t, _)| {
                let s = ((t.leading_edge_ms.rem_euclid(60_000.0)) / 1000.0 + 0.5).floor() as u32;
                s % 60 == second
            })
            .count()
    }
}

pub fn test_pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::new(TEST_RATE_HZ), Tunables::default()).expect("pipeline")
}

/// Push `seconds` of generator output through the pipeline.
pub fn feed_signal(
    pipeline: &mut Pipeline,
    generator: &mut WwvSignalGenerator,
    seconds: f64,
    collected: &mut Collected,
) {
    let blocks = (seconds * TEST_RATE_HZ as f64 / BLOCK as f64).round() as usize;
    for _ in 0..blocks {
        let (i, q) = generator.next_block(BLOCK);
        pipeline.on_samples(&i, &q, false).expect("on_samples");
        collected.absorb(pipeline.drain_telemetry());
    }
}

/// Push `seconds` of pure noise through the pipeline.
pub fn feed_noise(
    pipeline: &mut Pipeline,
    generator: &mut NoiseGenerator,
    seconds: f64,
    collected: &mut Collected,
) {
    let blocks = (seconds * TEST_RATE_HZ as f64 / BLOCK as f64).round() as usize;
    for _ in 0..blocks {
        let (i, q) = generator.next_block(BLOCK);
        pipeline.on_samples(&i, &q, false).expect("on_samples");
        collected.absorb(pipeline.drain_telemetry());
    }
}
