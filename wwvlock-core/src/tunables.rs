//! Runtime-tunable parameter table.
//!
//! Every parameter the control plane can touch is declared once in
//! [`PARAM_SPECS`] with its command name, reported key, range, default, and
//! description. Setters validate against the declared range before applying;
//! a rejection never mutates state. The whole table persists to an INI-style
//! file with one section per detector group; save → load → save is
//! byte-identical because field order is fixed by struct declaration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::calib::SLOW_PATH_DELAY_MS;
use crate::errors::PersistError;

/// Tick detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickDetectorTunables {
    /// Energy threshold as a multiple of the adaptive noise floor.
    pub threshold_multiplier: f64,
    /// Noise-floor EMA coefficient, fast attack downward.
    pub adapt_down: f64,
    /// Noise-floor EMA coefficient, slow release upward.
    pub adapt_up: f64,
    /// Shortest pulse classified as a tick.
    pub min_duration_ms: f64,
    /// Longest pulse classified as a tick.
    pub max_tick_duration_ms: f64,
    /// Long-pulse (minute marker) duration band.
    pub marker_min_ms: f64,
    pub marker_max_ms: f64,
    /// Minimum spacing between successive valid pulses.
    pub min_interval_ms: f64,
    /// Matched-filter peak over its noise floor required for a tick.
    pub corr_threshold: f64,
    /// Reject pulses whose leading-edge phase within the second falls
    /// outside `epoch_gate_tolerance_ms` of the installed epoch. Ships
    /// disabled pending evaluation against BCD harmonics.
    pub epoch_gate_enabled: bool,
    pub epoch_gate_tolerance_ms: f64,
}

impl Default for TickDetectorTunables {
    fn default() -> Self {
        Self {
            threshold_multiplier: 2.0,
            adapt_down: 1e-3,
            adapt_up: 1e-4,
            min_duration_ms: 3.0,
            max_tick_duration_ms: 20.0,
            marker_min_ms: 500.0,
            marker_max_ms: 900.0,
            min_interval_ms: 800.0,
            corr_threshold: 3.0,
            epoch_gate_enabled: false,
            epoch_gate_tolerance_ms: 100.0,
        }
    }
}

/// Tick correlator (epoch estimation) parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickCorrelatorTunables {
    /// Confidence required before an epoch estimate is published.
    pub epoch_confidence_threshold: f64,
    /// Consecutive expected-but-missing ticks tolerated before the
    /// published confidence is degraded.
    pub max_consecutive_misses: u32,
    /// Residual tolerance for counting a tick as on-phase.
    pub tick_tolerance_ms: f64,
    /// Ticks required in history before an estimate is attempted.
    pub min_history: u32,
}

impl Default for TickCorrelatorTunables {
    fn default() -> Self {
        Self {
            epoch_confidence_threshold: 0.7,
            max_consecutive_misses: 3,
            tick_tolerance_ms: 20.0,
            min_history: 5,
        }
    }
}

/// Fast/slow marker detector and correlator parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetectorTunables {
    /// Frame-energy threshold as a multiple of the idle baseline.
    pub threshold_multiplier: f64,
    /// Baseline EMA coefficient (adapts only while idle).
    pub adapt_rate: f64,
    /// Accepted marker duration band, fast path.
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    /// SNR threshold for the slow path's above/below flag.
    pub slow_snr_threshold_db: f64,
    /// Fast/slow fusion window.
    pub match_window_ms: f64,
    /// How long a single-path marker is held before emitting as orphaned.
    pub pending_expiry_ms: f64,
    /// Slow-path total delay compensation. Calibration value under review.
    pub slow_path_delay_ms: f64,
}

impl Default for MarkerDetectorTunables {
    fn default() -> Self {
        Self {
            threshold_multiplier: 3.0,
            adapt_rate: 1e-3,
            min_duration_ms: 500.0,
            max_duration_ms: 900.0,
            slow_snr_threshold_db: 6.0,
            match_window_ms: 500.0,
            pending_expiry_ms: 2000.0,
            slow_path_delay_ms: SLOW_PATH_DELAY_MS,
        }
    }
}

/// Sync state machine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncDetectorTunables {
    pub weight_tick: f64,
    pub weight_marker: f64,
    pub weight_p_marker: f64,
    pub weight_tick_hole: f64,
    pub weight_combined: f64,
    pub locked_threshold: f64,
    pub min_retain: f64,
    pub tentative_init: f64,
    pub decay_normal: f64,
    pub decay_recovering: f64,
    pub tick_tolerance_ms: f64,
    pub marker_tolerance_ms: f64,
    pub p_marker_tolerance_ms: f64,
    pub good_intervals_needed: u32,
    /// No-positive-evidence bound before LOCKED degrades.
    pub staleness_ms: f64,
    /// Anchor update smoothing factor: 0 snaps to the new marker, 1 keeps
    /// the old anchor. Defaults to snap; exposed pending evaluation.
    pub anchor_smoothing: f64,
}

impl Default for SyncDetectorTunables {
    fn default() -> Self {
        Self {
            weight_tick: 0.05,
            weight_marker: 0.30,
            weight_p_marker: 0.10,
            weight_tick_hole: 0.05,
            weight_combined: 0.20,
            locked_threshold: 0.7,
            min_retain: 0.4,
            tentative_init: 0.3,
            decay_normal: 0.0005,
            decay_recovering: 0.002,
            tick_tolerance_ms: 50.0,
            marker_tolerance_ms: 500.0,
            p_marker_tolerance_ms: 500.0,
            good_intervals_needed: 2,
            staleness_ms: 120_000.0,
            anchor_smoothing: 0.0,
        }
    }
}

/// The full runtime-tunable table, one section per detector group.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub tick_detector: TickDetectorTunables,
    pub tick_correlator: TickCorrelatorTunables,
    pub marker_detector: MarkerDetectorTunables,
    pub sync_detector: SyncDetectorTunables,
}

/// Declared range and identity of one control-plane parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// Control command that sets this parameter.
    pub command: &'static str,
    /// Key reported in command responses and telemetry.
    pub key: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub desc: &'static str,
}

/// Every control-plane-settable parameter, in one place.
pub const PARAM_SPECS: &[ParamSpec] = &[
    ParamSpec {
        command: "SET_TICK_THRESHOLD",
        key: "threshold_multiplier",
        min: 1.0,
        max: 5.0,
        default: 2.0,
        desc: "tick energy threshold over noise floor",
    },
    ParamSpec {
        command: "SET_TICK_ADAPT_DOWN",
        key: "adapt_down",
        min: 1e-5,
        max: 1e-1,
        default: 1e-3,
        desc: "tick noise floor attack coefficient",
    },
    ParamSpec {
        command: "SET_TICK_ADAPT_UP",
        key: "adapt_up",
        min: 1e-6,
        max: 1e-2,
        default: 1e-4,
        desc: "tick noise floor release coefficient",
    },
    ParamSpec {
        command: "SET_TICK_MIN_DURATION",
        key: "min_duration_ms",
        min: 1.0,
        max: 10.0,
        default: 3.0,
        desc: "shortest accepted tick pulse",
    },
    ParamSpec {
        command: "SET_CORR_CONFIDENCE",
        key: "epoch_confidence_threshold",
        min: 0.1,
        max: 1.0,
        default: 0.7,
        desc: "confidence floor for publishing an epoch",
    },
    ParamSpec {
        command: "SET_CORR_MAX_MISSES",
        key: "max_consecutive_misses",
        min: 1.0,
        max: 10.0,
        default: 3.0,
        desc: "missed ticks tolerated before degradation",
    },
    ParamSpec {
        command: "SET_MARKER_THRESHOLD",
        key: "marker_threshold_multiplier",
        min: 1.0,
        max: 10.0,
        default: 3.0,
        desc: "marker energy threshold over baseline",
    },
    ParamSpec {
        command: "SET_MARKER_ADAPT_RATE",
        key: "marker_adapt_rate",
        min: 1e-5,
        max: 1e-1,
        default: 1e-3,
        desc: "marker baseline adaptation rate",
    },
    ParamSpec {
        command: "SET_MARKER_MIN_DURATION",
        key: "marker_min_duration_ms",
        min: 100.0,
        max: 900.0,
        default: 500.0,
        desc: "shortest accepted marker pulse",
    },
    ParamSpec {
        command: "SET_SYNC_WEIGHT_TICK",
        key: "weight_tick",
        min: 0.0,
        max: 1.0,
        default: 0.05,
        desc: "confidence weight of an on-phase tick",
    },
    ParamSpec {
        command: "SET_SYNC_WEIGHT_MARKER",
        key: "weight_marker",
        min: 0.0,
        max: 1.0,
        default: 0.30,
        desc: "confidence weight of a confirmed marker",
    },
    ParamSpec {
        command: "SET_SYNC_WEIGHT_P_MARKER",
        key: "weight_p_marker",
        min: 0.0,
        max: 1.0,
        default: 0.10,
        desc: "confidence weight of an orphaned marker",
    },
    ParamSpec {
        command: "SET_SYNC_WEIGHT_TICK_HOLE",
        key: "weight_tick_hole",
        min: 0.0,
        max: 1.0,
        default: 0.05,
        desc: "confidence weight of an expected tick hole",
    },
    ParamSpec {
        command: "SET_SYNC_WEIGHT_COMBINED",
        key: "weight_combined",
        min: 0.0,
        max: 1.0,
        default: 0.20,
        desc: "confidence weight of the hole+marker minute pattern",
    },
    ParamSpec {
        command: "SET_SYNC_LOCKED_THRESHOLD",
        key: "locked_threshold",
        min: 0.1,
        max: 1.0,
        default: 0.7,
        desc: "confidence required to enter LOCKED",
    },
    ParamSpec {
        command: "SET_SYNC_MIN_RETAIN",
        key: "min_retain",
        min: 0.0,
        max: 1.0,
        default: 0.4,
        desc: "confidence floor for staying LOCKED",
    },
    ParamSpec {
        command: "SET_SYNC_TENTATIVE_INIT",
        key: "tentative_init",
        min: 0.0,
        max: 1.0,
        default: 0.3,
        desc: "confidence granted by the first marker",
    },
    ParamSpec {
        command: "SET_SYNC_DECAY_NORMAL",
        key: "decay_normal",
        min: 0.0,
        max: 0.1,
        default: 0.0005,
        desc: "per-check confidence decay in LOCKED/TENTATIVE",
    },
    ParamSpec {
        command: "SET_SYNC_DECAY_RECOVERING",
        key: "decay_recovering",
        min: 0.0,
        max: 0.1,
        default: 0.002,
        desc: "per-check confidence decay in RECOVERING",
    },
    ParamSpec {
        command: "SET_SYNC_TICK_TOLERANCE",
        key: "tick_tolerance_ms",
        min: 5.0,
        max: 200.0,
        default: 50.0,
        desc: "tick-phase tolerance against the anchor",
    },
    ParamSpec {
        command: "SET_SYNC_MARKER_TOLERANCE",
        key: "marker_tolerance_ms",
        min: 50.0,
        max: 2000.0,
        default: 500.0,
        desc: "marker-timestamp tolerance against the anchor",
    },
    ParamSpec {
        command: "SET_SYNC_P_MARKER_TOLERANCE",
        key: "p_marker_tolerance_ms",
        min: 50.0,
        max: 2000.0,
        default: 500.0,
        desc: "orphaned-marker tolerance against the anchor",
    },
];

impl Tunables {
    /// Find the spec for a control command.
    pub fn spec_for(command: &str) -> Option<&'static ParamSpec> {
        PARAM_SPECS.iter().find(|s| s.command == command)
    }

    /// Read the current value of a registered parameter.
    pub fn get(&self, command: &str) -> Option<f64> {
        let v = match command {
            "SET_TICK_THRESHOLD" => self.tick_detector.threshold_multiplier,
            "SET_TICK_ADAPT_DOWN" => self.tick_detector.adapt_down,
            "SET_TICK_ADAPT_UP" => self.tick_detector.adapt_up,
            "SET_TICK_MIN_DURATION" => self.tick_detector.min_duration_ms,
            "SET_CORR_CONFIDENCE" => self.tick_correlator.epoch_confidence_threshold,
            "SET_CORR_MAX_MISSES" => self.tick_correlator.max_consecutive_misses as f64,
            "SET_MARKER_THRESHOLD" => self.marker_detector.threshold_multiplier,
            "SET_MARKER_ADAPT_RATE" => self.marker_detector.adapt_rate,
            "SET_MARKER_MIN_DURATION" => self.marker_detector.min_duration_ms,
            "SET_SYNC_WEIGHT_TICK" => self.sync_detector.weight_tick,
            "SET_SYNC_WEIGHT_MARKER" => self.sync_detector.weight_marker,
            "SET_SYNC_WEIGHT_P_MARKER" => self.sync_detector.weight_p_marker,
            "SET_SYNC_WEIGHT_TICK_HOLE" => self.sync_detector.weight_tick_hole,
            "SET_SYNC_WEIGHT_COMBINED" => self.sync_detector.weight_combined,
            "SET_SYNC_LOCKED_THRESHOLD" => self.sync_detector.locked_threshold,
            "SET_SYNC_MIN_RETAIN" => self.sync_detector.min_retain,
            "SET_SYNC_TENTATIVE_INIT" => self.sync_detector.tentative_init,
            "SET_SYNC_DECAY_NORMAL" => self.sync_detector.decay_normal,
            "SET_SYNC_DECAY_RECOVERING" => self.sync_detector.decay_recovering,
            "SET_SYNC_TICK_TOLERANCE" => self.sync_detector.tick_tolerance_ms,
            "SET_SYNC_MARKER_TOLERANCE" => self.sync_detector.marker_tolerance_ms,
            "SET_SYNC_P_MARKER_TOLERANCE" => self.sync_detector.p_marker_tolerance_ms,
            _ => return None,
        };
        Some(v)
    }

    /// Validate `value` against the declared range and apply it.
    ///
    /// Returns the spec on success. Err carries the spec for response
    /// formatting; the table is untouched on rejection.
    pub fn set(
        &mut self,
        command: &str,
        value: f64,
    ) -> Result<&'static ParamSpec, Option<&'static ParamSpec>> {
        let spec = Self::spec_for(command).ok_or(None)?;
        if !value.is_finite() || value < spec.min || value > spec.max {
            return Err(Some(spec));
        }

        match command {
            "SET_TICK_THRESHOLD" => self.tick_detector.threshold_multiplier = value,
            "SET_TICK_ADAPT_DOWN" => self.tick_detector.adapt_down = value,
            "SET_TICK_ADAPT_UP" => self.tick_detector.adapt_up = value,
            "SET_TICK_MIN_DURATION" => self.tick_detector.min_duration_ms = value,
            "SET_CORR_CONFIDENCE" => self.tick_correlator.epoch_confidence_threshold = value,
            "SET_CORR_MAX_MISSES" => {
                self.tick_correlator.max_consecutive_misses = value.round() as u32
            }
            "SET_MARKER_THRESHOLD" => self.marker_detector.threshold_multiplier = value,
            "SET_MARKER_ADAPT_RATE" => self.marker_detector.adapt_rate = value,
            "SET_MARKER_MIN_DURATION" => self.marker_detector.min_duration_ms = value,
            "SET_SYNC_WEIGHT_TICK" => self.sync_detector.weight_tick = value,
            "SET_SYNC_WEIGHT_MARKER" => self.sync_detector.weight_marker = value,
            "SET_SYNC_WEIGHT_P_MARKER" => self.sync_detector.weight_p_marker = value,
            "SET_SYNC_WEIGHT_TICK_HOLE" => self.sync_detector.weight_tick_hole = value,
            "SET_SYNC_WEIGHT_COMBINED" => self.sync_detector.weight_combined = value,
            "SET_SYNC_LOCKED_THRESHOLD" => self.sync_detector.locked_threshold = value,
            "SET_SYNC_MIN_RETAIN" => self.sync_detector.min_retain = value,
            "SET_SYNC_TENTATIVE_INIT" => self.sync_detector.tentative_init = value,
            "SET_SYNC_DECAY_NORMAL" => self.sync_detector.decay_normal = value,
            "SET_SYNC_DECAY_RECOVERING" => self.sync_detector.decay_recovering = value,
            "SET_SYNC_TICK_TOLERANCE" => self.sync_detector.tick_tolerance_ms = value,
            "SET_SYNC_MARKER_TOLERANCE" => self.sync_detector.marker_tolerance_ms = value,
            "SET_SYNC_P_MARKER_TOLERANCE" => self.sync_detector.p_marker_tolerance_ms = value,
            _ => unreachable!("spec_for vetted the command"),
        }
        Ok(spec)
    }

    /// Serialize to INI-style `[section]` / `key = value` text.
    pub fn to_ini_string(&self) -> Result<String, PersistError> {
        toml::to_string(self).map_err(|e| PersistError::Serialize {
            reason: e.to_string(),
        })
    }

    /// Write the table to disk.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let text = self.to_ini_string()?;
        std::fs::write(path, text).map_err(|source| PersistError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read the table from disk.
    ///
    /// Out-of-range values fall back to their defaults; each fallback is
    /// reported as a warning string so the caller can log it.
    pub fn load(path: &Path) -> Result<(Self, Vec<String>), PersistError> {
        let text = std::fs::read_to_string(path).map_err(|source| PersistError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut table: Tunables = toml::from_str(&text).map_err(|e| PersistError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut warnings = Vec::new();
        for spec in PARAM_SPECS {
            let value = table
                .get(spec.command)
                .expect("registered params are always readable");
            if !value.is_finite() || value < spec.min || value > spec.max {
                table
                    .set(spec.command, spec.default)
                    .expect("defaults are in range");
                warnings.push(format!(
                    "{}={} out of range {}-{}, using default {}",
                    spec.key, value, spec.min, spec.max, spec.default
                ));
            }
        }
        Ok((table, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_all_in_declared_range() {
        let table = Tunables::default();
        for spec in PARAM_SPECS {
            let v = table.get(spec.command).unwrap();
            assert!(
                v >= spec.min && v <= spec.max,
                "{} default {} outside {}-{}",
                spec.command,
                v,
                spec.min,
                spec.max
            );
        }
    }

    #[test]
    fn test_set_rejects_out_of_range_without_mutation() {
        let mut table = Tunables::default();
        let before = table;
        let err = table.set("SET_TICK_THRESHOLD", 10.0);
        assert!(err.is_err());
        assert_eq!(table, before);
    }

    #[test]
    fn test_set_applies_in_range() {
        let mut table = Tunables::default();
        let spec = table.set("SET_TICK_THRESHOLD", 3.5).unwrap();
        assert_eq!(spec.key, "threshold_multiplier");
        assert_eq!(table.tick_detector.threshold_multiplier, 3.5);
    }

    #[test]
    fn test_unknown_command() {
        let mut table = Tunables::default();
        assert!(matches!(table.set("SET_BOGUS", 1.0), Err(None)));
    }

    #[test]
    fn test_ini_sections_present() {
        let text = Tunables::default().to_ini_string().unwrap();
        for section in [
            "[tick_detector]",
            "[tick_correlator]",
            "[marker_detector]",
            "[sync_detector]",
        ] {
            assert!(text.contains(section), "missing {section} in:\n{text}");
        }
    }

    #[test]
    fn test_save_load_save_is_idempotent() {
        let dir = std::env::temp_dir().join("wwvlock-tunables-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("params.ini");

        let mut table = Tunables::default();
        table.set("SET_TICK_THRESHOLD", 3.5).unwrap();
        table.save(&path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();

        let (loaded, warnings) = Tunables::load(&path).unwrap();
        assert!(warnings.is_empty());
        loaded.save(&path).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_replaces_out_of_range_with_default() {
        let dir = std::env::temp_dir().join("wwvlock-tunables-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad-params.ini");

        let mut table = Tunables::default();
        table.tick_detector.threshold_multiplier = 99.0;
        table.save(&path).unwrap();

        let (loaded, warnings) = Tunables::load(&path).unwrap();
        assert_eq!(loaded.tick_detector.threshold_multiplier, 2.0);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("threshold_multiplier"));
        std::fs::remove_file(&path).ok();
    }
}
