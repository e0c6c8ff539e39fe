//! Event value types produced by the detector and correlator stages.
//!
//! Events are immutable once emitted: produced by one component, consumed by
//! one or more downstream components. All timestamps are milliseconds on the
//! pipeline's sample-count clock.

use serde::{Deserialize, Serialize};

/// A detected ~5 ms 1000 Hz tick pulse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
    /// Running tick count since stream start.
    pub number: u64,
    /// Trailing-edge timestamp (pulse end, as observed).
    pub trailing_edge_ms: f64,
    /// Leading-edge timestamp, group-delay compensated:
    /// `leading = trailing - duration - FILTER_DELAY_MS`.
    pub leading_edge_ms: f64,
    pub duration_ms: f64,
    pub peak_energy: f64,
    /// Interval from the previous valid tick's leading edge.
    pub interval_ms: f64,
    /// Exponentially averaged interval.
    pub avg_interval_ms: f64,
    pub noise_floor: f64,
    pub corr_peak: f64,
    /// Matched-filter peak over the correlation noise floor.
    pub corr_ratio: f64,
}

/// A long (500-900 ms) 1000 Hz pulse seen by the fast tick path: the minute
/// marker as classified by the tick detector's state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMarkerEvent {
    pub number: u64,
    pub trailing_edge_ms: f64,
    pub leading_edge_ms: f64,
    pub duration_ms: f64,
    pub peak_energy: f64,
    pub interval_ms: f64,
    pub noise_floor: f64,
    pub corr_peak: f64,
    pub corr_ratio: f64,
}

/// A minute marker detected by the fast accumulator path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerEvent {
    /// Running marker count since stream start.
    pub number: u64,
    /// Onset timestamp.
    pub timestamp_ms: f64,
    pub accumulated_energy: f64,
    pub peak_energy: f64,
    pub duration_ms: f64,
    /// Time since the previous marker, 0 for the first.
    pub since_last_ms: f64,
}

/// One time-resolved 1000 Hz energy sample from the 12 kHz overlapped-FFT
/// path, emitted every FFT hop (~85 ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowMarkerFrame {
    pub timestamp_ms: f64,
    pub energy: f64,
    pub snr_db: f64,
    pub above_threshold: bool,
}

/// A marker candidate seen by the slow path: a contiguous above-threshold
/// span of [`SlowMarkerFrame`]s, delay-compensated onto the detector clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowMarkerEvent {
    /// Onset timestamp after slow-path delay compensation.
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    pub peak_snr_db: f64,
}

/// Confidence grade of a fused marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerConfidence {
    /// Fast and slow paths agreed within the match window.
    High,
    /// Seen by one path only and expired unmatched (a P-marker candidate).
    Low,
}

/// Output of the marker correlator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedMarkerEvent {
    pub number: u64,
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    pub confidence: MarkerConfidence,
}

/// BCD symbol alphabet. One symbol is transmitted per second as a 100 Hz
/// subcarrier pulse of 200 / 500 / 800 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BcdSymbol {
    Zero,
    One,
    Marker,
    Unknown,
}

impl BcdSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            BcdSymbol::Zero => "ZERO",
            BcdSymbol::One => "ONE",
            BcdSymbol::Marker => "MARKER",
            BcdSymbol::Unknown => "UNKNOWN",
        }
    }
}

/// One fused BCD symbol per one-second window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcdSymbolEvent {
    pub symbol: BcdSymbol,
    pub timestamp_ms: f64,
    pub pulse_width_ms: f64,
}

/// A raw subcarrier pulse as classified by one of the two BCD detectors,
/// before per-second fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcdPulse {
    pub onset_ms: f64,
    pub width_ms: f64,
    pub symbol: BcdSymbol,
}

/// Sync state machine states, weakest to strongest phase confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    None,
    Tentative,
    Locked,
    Recovering,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::None => "NONE",
            SyncState::Tentative => "TENTATIVE",
            SyncState::Locked => "LOCKED",
            SyncState::Recovering => "RECOVERING",
        }
    }
}

/// Snapshot of the sync detector's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncContext {
    pub state: SyncState,
    pub confidence: f64,
    /// Anchor timestamp of the last accepted minute marker, if any.
    pub last_marker_ms: Option<f64>,
    pub consecutive_good_intervals: u32,
    pub confirmed_marker_count: u32,
}

/// Emitted on every sync state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTransition {
    pub timestamp_ms: f64,
    pub old_state: SyncState,
    pub new_state: SyncState,
    pub confidence: f64,
    pub last_marker_ms: Option<f64>,
    pub confirmed_marker_count: u32,
}

/// Per-second receiver quality report from the slow-FFT path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub timestamp_ms: f64,
    pub carrier_db: f64,
    pub snr_db: f64,
    pub sub500_db: f64,
    pub sub600_db: f64,
    pub tone1000_db: f64,
    pub noise_db: f64,
    pub quality: ChannelQuality,
}

/// Receiver quality grade by SNR bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelQuality {
    Good,
    Fair,
    Poor,
    None,
}

impl ChannelQuality {
    /// Grade an SNR: >15 dB GOOD, >8 FAIR, >3 POOR, else NONE.
    pub fn from_snr_db(snr_db: f64) -> Self {
        if snr_db > 15.0 {
            ChannelQuality::Good
        } else if snr_db > 8.0 {
            ChannelQuality::Fair
        } else if snr_db > 3.0 {
            ChannelQuality::Poor
        } else {
            ChannelQuality::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelQuality::Good => "GOOD",
            ChannelQuality::Fair => "FAIR",
            ChannelQuality::Poor => "POOR",
            ChannelQuality::None => "NONE",
        }
    }
}

/// Per-minute 500/600 Hz subcarrier report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcarrierReport {
    pub timestamp_ms: f64,
    /// Minute index since stream start.
    pub minute: u64,
    /// Expected tone for this minute's parity, in Hz (500 or 600).
    pub expected_tone_hz: u32,
    pub sub500_db: f64,
    pub sub600_db: f64,
    /// `sub500_db - sub600_db`.
    pub delta_db: f64,
    /// Whether either tone was detected above the floor.
    pub detected: bool,
    /// Whether the dominant tone matches the expected tone.
    pub matches_schedule: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_bands() {
        assert_eq!(ChannelQuality::from_snr_db(20.0), ChannelQuality::Good);
        assert_eq!(ChannelQuality::from_snr_db(15.0), ChannelQuality::Fair);
        assert_eq!(ChannelQuality::from_snr_db(8.0), ChannelQuality::Poor);
        assert_eq!(ChannelQuality::from_snr_db(3.0), ChannelQuality::None);
        assert_eq!(ChannelQuality::from_snr_db(-10.0), ChannelQuality::None);
    }

    #[test]
    fn test_symbol_names() {
        assert_eq!(BcdSymbol::Zero.as_str(), "ZERO");
        assert_eq!(BcdSymbol::Unknown.as_str(), "UNKNOWN");
    }
}
