//! CLI configuration: TOML file with command-line overrides.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Signal source selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Built-in synthetic broadcast generator.
    Synth,
    /// Gaussian noise, for receiver floor checks.
    Noise,
    /// Two-channel WAV file read as I/Q.
    Wav,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,
    /// WAV path when `kind = "wav"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Input rate for the synthetic sources.
    #[serde(default = "default_rate")]
    pub sample_rate_hz: u32,
    /// Seconds to run; 0 runs until the source is exhausted.
    #[serde(default = "default_duration")]
    pub duration_secs: f64,
    /// Synthetic BCD subcarrier depth.
    #[serde(default)]
    pub bcd_depth: f64,
    /// Synthetic 500/600 Hz subcarrier depth.
    #[serde(default)]
    pub subcarrier_depth: f64,
}

fn default_source_kind() -> SourceKind {
    SourceKind::Synth
}

fn default_rate() -> u32 {
    2_400_000
}

fn default_duration() -> f64 {
    180.0
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            path: None,
            sample_rate_hz: default_rate(),
            duration_secs: default_duration(),
            bcd_depth: 0.0,
            subcarrier_depth: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Write telemetry lines to stdout.
    #[serde(default = "default_true")]
    pub stdout: bool,
    /// Append telemetry lines to a CSV file.
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
    /// Send each record as a UDP datagram to this address.
    #[serde(default)]
    pub udp_target: Option<String>,
    /// Emit JSON objects instead of CSV lines.
    #[serde(default)]
    pub json: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            csv_path: None,
            udp_target: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ControlConfig {
    /// UDP bind address for inbound control commands.
    #[serde(default)]
    pub bind: Option<String>,
}

/// Complete CLI configuration bundle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub control: ControlConfig,
    /// Tunable-table INI path; written back on each accepted SET command.
    #[serde(default = "default_params_path")]
    pub params_path: PathBuf,
    /// Load the INI at startup and apply it.
    #[serde(default)]
    pub reload_params: bool,
}

fn default_params_path() -> PathBuf {
    PathBuf::from("wwvlock-params.ini")
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).wrap_err_with(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse_from_empty() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.source.kind, SourceKind::Synth);
        assert_eq!(config.source.sample_rate_hz, 2_400_000);
        assert!(config.telemetry.csv_path.is_none());
    }

    #[test]
    fn test_partial_file_overrides() {
        let config: CliConfig = toml::from_str(
            r#"
            [source]
            kind = "noise"
            sample_rate_hz = 300000

            [telemetry]
            stdout = false
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.source.kind, SourceKind::Noise);
        assert_eq!(config.source.sample_rate_hz, 300_000);
        assert!(config.telemetry.json);
    }
}
