//! Error types with granular categories.

use thiserror::Error;

/// Top-level error type for all pipeline operations.
#[derive(Debug, Error)]
pub enum WwvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("DSP processing error: {0}")]
    Dsp(#[from] DspError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Configuration errors, raised at pipeline construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid sample rate: {rate} Hz (must be > 0)")]
    InvalidSampleRate { rate: u32 },

    #[error(
        "Sample rate {rate} Hz is not an integer multiple of both internal rates ({fd} Hz and {fw} Hz)"
    )]
    SampleRateNotDecimable { rate: u32, fd: u32, fw: u32 },

    #[error("Parameter {name} = {value} out of range {min}-{max}")]
    ParamOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// DSP construction errors. Fatal at start-up; never raised per-sample.
#[derive(Debug, Error)]
pub enum DspError {
    #[error("FFT size {size} is not a power of 2")]
    InvalidFftSize { size: usize },

    #[error("Filter design failed: {reason}")]
    FilterDesignFailed { reason: String },

    #[error("Decimation factor {factor} must be >= 1")]
    InvalidDecimation { factor: u32 },
}

/// Ingest-side errors.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Stream header not received before samples")]
    HeaderMissing,

    #[error("Sample block length mismatch: i={i_len}, q={q_len}, count={count}")]
    BlockLengthMismatch {
        i_len: usize,
        q_len: usize,
        count: usize,
    },
}

/// Tunable-table persistence errors.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to read parameter file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write parameter file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse parameter file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Failed to serialize parameter table: {reason}")]
    Serialize { reason: String },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, WwvError>;
