//! Structured in-process logging.
//!
//! The pipeline runs single-threaded and latency-sensitive, so log entries
//! are collected into a bounded in-memory buffer that the host drains at its
//! own pace instead of writing to a sink inline.

use std::fmt;

/// Log level for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to record.
    pub level: LogLevel,

    /// Per-subsystem enables.
    pub enable_ingest: bool,
    pub enable_detectors: bool,
    pub enable_sync: bool,
    pub enable_control: bool,

    /// Maximum number of entries kept before the oldest is dropped.
    pub max_entries: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            enable_ingest: true,
            enable_detectors: true,
            enable_sync: true,
            enable_control: true,
            max_entries: 1000,
        }
    }
}

impl LogConfig {
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            max_entries: 5000,
            ..Self::default()
        }
    }

    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Warn,
            enable_ingest: false,
            enable_detectors: false,
            enable_sync: false,
            enable_control: false,
            max_entries: 100,
        }
    }
}

/// A single log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub subsystem: &'static str,
    pub message: String,
}

/// Bounded collector of structured log entries.
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    config: LogConfig,
    entries: Vec<LogEntry>,
}

impl PipelineLogger {
    pub fn new(config: LogConfig) -> Self {
        let capacity = config.max_entries.min(1000);
        Self {
            config,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn log(&mut self, level: LogLevel, subsystem: &'static str, message: impl fmt::Display) {
        if level < self.config.level {
            return;
        }

        let enabled = match subsystem {
            "INGEST" | "DECIM" => self.config.enable_ingest,
            "TICK" | "MARKER" | "BCD" | "SUBC" | "CHAN" => self.config.enable_detectors,
            "SYNC" | "EPOCH" => self.config.enable_sync,
            "CONTROL" | "PERSIST" => self.config.enable_control,
            _ => true,
        };

        if !enabled {
            return;
        }

        let entry = LogEntry {
            level,
            subsystem,
            message: message.to_string(),
        };

        if self.config.max_entries > 0 {
            if self.entries.len() >= self.config.max_entries {
                self.entries.remove(0);
            }
            self.entries.push(entry);
        }

        #[cfg(any(test, debug_assertions))]
        {
            let e = self.entries.last();
            if let Some(e) = e {
                eprintln!("[{}] {}: {}", e.level, e.subsystem, e.message);
            }
        }
    }

    pub fn debug(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Debug, subsystem, message);
    }

    pub fn info(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Info, subsystem, message);
    }

    pub fn warn(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Warn, subsystem, message);
    }

    pub fn error(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Error, subsystem, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Drain all collected entries, oldest first.
    pub fn drain(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.entries)
    }
}

impl Default for PipelineLogger {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filtering() {
        let mut logger = PipelineLogger::new(LogConfig {
            level: LogLevel::Info,
            ..Default::default()
        });

        logger.debug("TICK", "dropped");
        logger.info("TICK", "kept");
        logger.warn("SYNC", "kept");

        assert_eq!(logger.entries().len(), 2);
    }

    #[test]
    fn test_subsystem_filtering() {
        let mut logger = PipelineLogger::new(LogConfig {
            level: LogLevel::Debug,
            enable_detectors: false,
            ..Default::default()
        });

        logger.info("TICK", "dropped");
        logger.info("SYNC", "kept");

        assert_eq!(logger.entries().len(), 1);
        assert_eq!(logger.entries()[0].subsystem, "SYNC");
    }

    #[test]
    fn test_bounded_entries() {
        let mut logger = PipelineLogger::new(LogConfig {
            level: LogLevel::Debug,
            max_entries: 2,
            ..Default::default()
        });

        logger.info("SYNC", "one");
        logger.info("SYNC", "two");
        logger.info("SYNC", "three");

        assert_eq!(logger.entries().len(), 2);
        assert_eq!(logger.entries()[0].message, "two");
    }
}
