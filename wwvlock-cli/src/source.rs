//! Sample sources: synthetic broadcast, noise, and two-channel WAV I/Q.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use color_eyre::eyre::{bail, Context, Result};
use wwvlock_core::ingest::{SampleFormat, StreamHeader};
use wwvlock_core::synth::{NoiseGenerator, WwvSignalConfig, WwvSignalGenerator};

use crate::config::{SourceConfig, SourceKind};

pub enum SampleSource {
    Synth(WwvSignalGenerator),
    Noise(NoiseGenerator),
    Wav(WavIqReader),
}

impl SampleSource {
    pub fn open(config: &SourceConfig) -> Result<Self> {
        match config.kind {
            SourceKind::Synth => Ok(Self::Synth(WwvSignalGenerator::new(WwvSignalConfig {
                sample_rate_hz: config.sample_rate_hz,
                bcd_depth: config.bcd_depth,
                subcarrier_depth: config.subcarrier_depth,
                ..Default::default()
            }))),
            SourceKind::Noise => Ok(Self::Noise(NoiseGenerator::new(0.05, 1))),
            SourceKind::Wav => {
                let path = config
                    .path
                    .as_ref()
                    .ok_or_else(|| color_eyre::eyre::eyre!("wav source requires source.path"))?;
                Ok(Self::Wav(WavIqReader::open(path)?))
            }
        }
    }

    /// Stream header equivalent for this source.
    pub fn header(&self, config: &SourceConfig) -> StreamHeader {
        let (rate, format) = match self {
            SampleSource::Wav(reader) => (reader.sample_rate_hz(), reader.sample_format()),
            _ => (config.sample_rate_hz, SampleFormat::F32),
        };
        StreamHeader {
            sample_rate_hz: rate,
            sample_format: format,
            center_freq_hz: 10_000_000,
        }
    }

    /// Next block of I/Q; `None` when the source is exhausted.
    pub fn next_block(&mut self, count: usize) -> Option<(Vec<f32>, Vec<f32>)> {
        match self {
            SampleSource::Synth(generator) => Some(generator.next_block(count)),
            SampleSource::Noise(generator) => Some(generator.next_block(count)),
            SampleSource::Wav(reader) => reader.next_block(count),
        }
    }
}

/// Two-channel WAV file: channel 0 is I, channel 1 is Q.
pub struct WavIqReader {
    reader: hound::WavReader<BufReader<File>>,
    spec: hound::WavSpec,
}

impl WavIqReader {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)
            .wrap_err_with(|| format!("opening WAV {}", path.display()))?;
        let spec = reader.spec();
        if spec.channels != 2 {
            bail!(
                "I/Q WAV needs 2 channels, {} has {}",
                path.display(),
                spec.channels
            );
        }
        Ok(Self { reader, spec })
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.spec.sample_rate
    }

    pub fn sample_format(&self) -> SampleFormat {
        match self.spec.sample_format {
            hound::SampleFormat::Float => SampleFormat::F32,
            hound::SampleFormat::Int => SampleFormat::S16,
        }
    }

    pub fn next_block(&mut self, count: usize) -> Option<(Vec<f32>, Vec<f32>)> {
        let mut i_out = Vec::with_capacity(count);
        let mut q_out = Vec::with_capacity(count);

        match self.spec.sample_format {
            hound::SampleFormat::Float => {
                let mut samples = self.reader.samples::<f32>();
                for _ in 0..count {
                    let (Some(Ok(i)), Some(Ok(q))) = (samples.next(), samples.next()) else {
                        break;
                    };
                    i_out.push(i);
                    q_out.push(q);
                }
            }
            hound::SampleFormat::Int => {
                let mut samples = self.reader.samples::<i16>();
                for _ in 0..count {
                    let (Some(Ok(i)), Some(Ok(q))) = (samples.next(), samples.next()) else {
                        break;
                    };
                    i_out.push(i as f32 / 32768.0);
                    q_out.push(q as f32 / 32768.0);
                }
            }
        }

        if i_out.is_empty() {
            None
        } else {
            Some((i_out, q_out))
        }
    }
}
