//! Telemetry record types and line formatting.
//!
//! One comma-separated line per event. The wall-clock `time` field is
//! cosmetic and supplied by the transport layer; everything else derives
//! from the sample-count clock. Transports (UDP, CSV file) live outside the
//! core.

use serde::{Deserialize, Serialize};

use crate::events::{
    BcdSymbolEvent, ChannelReport, MarkerEvent, SubcarrierReport, SyncTransition, TickEvent,
};

/// Telemetry channels, maskable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryChannel {
    Chan,
    Tick,
    Mark,
    Sync,
    Subc,
    Bcds,
}

impl TelemetryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryChannel::Chan => "CHAN",
            TelemetryChannel::Tick => "TICK",
            TelemetryChannel::Mark => "MARK",
            TelemetryChannel::Sync => "SYNC",
            TelemetryChannel::Subc => "SUBC",
            TelemetryChannel::Bcds => "BCDS",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "CHAN" => Some(TelemetryChannel::Chan),
            "TICK" => Some(TelemetryChannel::Tick),
            "MARK" => Some(TelemetryChannel::Mark),
            "SYNC" => Some(TelemetryChannel::Sync),
            "SUBC" => Some(TelemetryChannel::Subc),
            "BCDS" => Some(TelemetryChannel::Bcds),
            _ => None,
        }
    }
}

/// Per-channel enable mask. Everything on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMask {
    chan: bool,
    tick: bool,
    mark: bool,
    sync: bool,
    subc: bool,
    bcds: bool,
}

impl ChannelMask {
    pub fn all() -> Self {
        Self {
            chan: true,
            tick: true,
            mark: true,
            sync: true,
            subc: true,
            bcds: true,
        }
    }

    pub fn set(&mut self, channel: TelemetryChannel, enabled: bool) {
        match channel {
            TelemetryChannel::Chan => self.chan = enabled,
            TelemetryChannel::Tick => self.tick = enabled,
            TelemetryChannel::Mark => self.mark = enabled,
            TelemetryChannel::Sync => self.sync = enabled,
            TelemetryChannel::Subc => self.subc = enabled,
            TelemetryChannel::Bcds => self.bcds = enabled,
        }
    }

    pub fn is_enabled(&self, channel: TelemetryChannel) -> bool {
        match channel {
            TelemetryChannel::Chan => self.chan,
            TelemetryChannel::Tick => self.tick,
            TelemetryChannel::Mark => self.mark,
            TelemetryChannel::Sync => self.sync,
            TelemetryChannel::Subc => self.subc,
            TelemetryChannel::Bcds => self.bcds,
        }
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::all()
    }
}

/// One telemetry record, ready for formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryRecord {
    Chan(ChannelReport),
    Tick {
        event: TickEvent,
        /// Whether this tick matched the expected second phase:
        /// 1 on-phase, 0 off-phase, -1 no reference installed.
        expected: i8,
    },
    Mark(MarkerEvent),
    Sync(SyncTransition),
    Subc(SubcarrierReport),
    BcdSymbol(BcdSymbolEvent),
    /// Periodic modem status line.
    BcdStatus { timestamp_ms: f64, symbols_since_start: u64 },
}

impl TelemetryRecord {
    pub fn channel(&self) -> TelemetryChannel {
        match self {
            TelemetryRecord::Chan(_) => TelemetryChannel::Chan,
            TelemetryRecord::Tick { .. } => TelemetryChannel::Tick,
            TelemetryRecord::Mark(_) => TelemetryChannel::Mark,
            TelemetryRecord::Sync(_) => TelemetryChannel::Sync,
            TelemetryRecord::Subc(_) => TelemetryChannel::Subc,
            TelemetryRecord::BcdSymbol(_) | TelemetryRecord::BcdStatus { .. } => {
                TelemetryChannel::Bcds
            }
        }
    }

    /// Format the record as a telemetry line. `wall_time` is the cosmetic
    /// wall-clock string supplied by the transport.
    pub fn format_line(&self, wall_time: &str) -> String {
        match self {
            TelemetryRecord::Chan(r) => format!(
                "CHAN,{},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1},{}",
                wall_time,
                r.timestamp_ms,
                r.carrier_db,
                r.snr_db,
                r.sub500_db,
                r.sub600_db,
                r.tone1000_db,
                r.noise_db,
                r.quality.as_str()
            ),
            TelemetryRecord::Tick { event: t, expected } => format!(
                "TICK,{},{:.1},{},{},{:.4},{:.2},{:.1},{:.1},{:.5},{:.4},{:.2}",
                wall_time,
                t.trailing_edge_ms,
                t.number,
                expected,
                t.peak_energy,
                t.duration_ms,
                t.interval_ms,
                t.avg_interval_ms,
                t.noise_floor,
                t.corr_peak,
                t.corr_ratio
            ),
            TelemetryRecord::Mark(m) => format!(
                "MARK,{},{:.1},{},{:.4},{:.1},{:.1}",
                wall_time,
                m.timestamp_ms,
                m.number,
                m.accumulated_energy,
                m.duration_ms,
                m.since_last_ms / 1000.0
            ),
            TelemetryRecord::Sync(s) => format!(
                "SYNC,{},{:.1},{},{},{:.3},{:.1},{}",
                wall_time,
                s.timestamp_ms,
                s.old_state.as_str(),
                s.new_state.as_str(),
                s.confidence,
                s.last_marker_ms.unwrap_or(-1.0),
                s.confirmed_marker_count
            ),
            TelemetryRecord::Subc(r) => format!(
                "SUBC,{},{:.1},{},{},{:.1},{:.1},{:.1},{},{}",
                wall_time,
                r.timestamp_ms,
                r.minute,
                r.expected_tone_hz,
                r.sub500_db,
                r.sub600_db,
                r.delta_db,
                r.detected as u8,
                r.matches_schedule as u8
            ),
            TelemetryRecord::BcdSymbol(s) => format!(
                "BCDS,SYM,{},{:.1},{:.1}",
                s.symbol.as_str(),
                s.timestamp_ms,
                s.pulse_width_ms
            ),
            TelemetryRecord::BcdStatus {
                timestamp_ms,
                symbols_since_start,
            } => format!(
                "BCDS,STATUS,{},{:.1},MODEM,-1,0,0,{}",
                wall_time, timestamp_ms, symbols_since_start
            ),
        }
    }
}
