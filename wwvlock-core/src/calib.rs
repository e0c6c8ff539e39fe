//! Calibration constants tied to the filter designs.
//!
//! Every hard-coded group-delay compensation lives here so the values can be
//! reviewed together whenever a filter is redesigned.

/// Detector-path sample rate in Hz.
pub const DETECTOR_RATE_HZ: u32 = 50_000;

/// Display/slow-path sample rate in Hz.
pub const SLOW_RATE_HZ: u32 = 12_000;

/// Samples per detector FFT frame (5.12 ms at 50 kHz).
pub const TICK_FRAME_LEN: usize = 256;

/// Slow-path FFT length (2048 points at 12 kHz).
pub const SLOW_FFT_LEN: usize = 2048;

/// Slow-path FFT hop. Half-overlap gives an effective update of ~85.3 ms.
pub const SLOW_FFT_HOP: usize = 1024;

/// BCD envelope analysis block, in samples at the detector rate (10 ms).
pub const BCD_BLOCK_LEN: usize = 500;

/// Group delay of the sync-channel band-pass at the detector rate.
///
/// Applied when reconstructing a pulse's leading edge from its trailing edge:
/// `leading = trailing - duration - FILTER_DELAY_MS`.
pub const FILTER_DELAY_MS: f64 = 2.2;

/// Estimated total latency of the 12 kHz overlapped-FFT path relative to the
/// detector path: dominated by the 2048-point window fill at the hop cadence.
/// Subtracted from slow-marker onsets before fusion so both paths land inside
/// the correlator's match window.
///
/// Calibration is tied to the current filter/FFT geometry; the runtime value
/// is a tunable seeded from this constant.
pub const SLOW_PATH_DELAY_MS: f64 = 150.0;

/// Duration of one second of broadcast, in milliseconds.
pub const SECOND_MS: f64 = 1000.0;

/// Duration of one minute of broadcast, in milliseconds.
pub const MINUTE_MS: f64 = 60_000.0;
