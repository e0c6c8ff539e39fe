//! Ingest-side types for the SDR transport contract.
//!
//! The transport itself (network framing, reconnect) is an external
//! collaborator; the core consumes a callback-style contract of stream
//! headers, sample blocks, and mid-stream metadata updates. Sample formats
//! are normalized to `[-1, 1]` floats before entering the DSP graph.

use serde::{Deserialize, Serialize};

/// Wire sample format declared by the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    S16,
    F32,
    U8,
}

/// Stream header delivered before the first sample block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub sample_rate_hz: u32,
    pub sample_format: SampleFormat,
    pub center_freq_hz: u64,
}

/// Mid-stream metadata update. Only present fields change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub sample_rate_hz: Option<u32>,
    pub center_freq_hz: Option<u64>,
    pub gain_reduction_db: Option<u32>,
    pub lna_state: Option<u8>,
}

/// Normalize signed 16-bit samples to `[-1, 1]`.
pub fn normalize_s16(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Center and normalize unsigned 8-bit samples to `[-1, 1]`.
pub fn normalize_u8(samples: &[u8]) -> Vec<f32> {
    samples.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s16_normalization_bounds() {
        let out = normalize_s16(&[i16::MIN, 0, i16::MAX]);
        assert_eq!(out[0], -1.0);
        assert_eq!(out[1], 0.0);
        assert!((out[2] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_u8_centering() {
        let out = normalize_u8(&[0, 128, 255]);
        assert_eq!(out[0], -1.0);
        assert_eq!(out[1], 0.0);
        assert!((out[2] - 1.0).abs() < 0.01);
    }
}
