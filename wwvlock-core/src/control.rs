//! Control-plane command handling.
//!
//! Single-line `CMD ARG` grammar. Parameter commands validate against the
//! declared ranges in [`crate::tunables::PARAM_SPECS`]; telemetry commands
//! flip channel masks. A sliding-window rate limiter on the monotonic clock
//! bounds command throughput.

use std::collections::VecDeque;

use crate::telemetry::TelemetryChannel;
use crate::tunables::Tunables;

/// Commands accepted per second before rate limiting kicks in.
const RATE_LIMIT_PER_SEC: usize = 10;

/// A parsed control command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetParam { command: String, value: f64 },
    EnableTelem(TelemetryChannel),
    DisableTelem(TelemetryChannel),
}

/// Outcome of handling one command line.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Response line for the control channel.
    pub response: String,
    /// Whether the tunable table changed (triggers INI write-back).
    pub params_updated: bool,
    /// Telemetry mask change, if any.
    pub telem_change: Option<(TelemetryChannel, bool)>,
}

impl CommandOutcome {
    fn rejected(response: String) -> Self {
        Self {
            response,
            params_updated: false,
            telem_change: None,
        }
    }
}

/// Why a command line failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Malformed(String),
    UnknownCommand(String),
}

/// Parse a command line into a [`Command`].
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let mut parts = line.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| ParseError::Malformed("empty command".to_string()))?;
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(ParseError::Malformed("too many arguments".to_string()));
    }

    match name {
        "ENABLE_TELEM" | "DISABLE_TELEM" => {
            let arg =
                arg.ok_or_else(|| ParseError::Malformed(format!("{name} requires a channel")))?;
            let channel = TelemetryChannel::parse(arg)
                .ok_or_else(|| ParseError::Malformed(format!("unknown telemetry channel {arg}")))?;
            if name == "ENABLE_TELEM" {
                Ok(Command::EnableTelem(channel))
            } else {
                Ok(Command::DisableTelem(channel))
            }
        }
        _ if name.starts_with("SET_") => {
            let arg =
                arg.ok_or_else(|| ParseError::Malformed(format!("{name} requires a value")))?;
            let value: f64 = arg
                .parse()
                .map_err(|_| ParseError::Malformed(format!("non-numeric value {arg}")))?;
            Ok(Command::SetParam {
                command: name.to_string(),
                value,
            })
        }
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

/// Rate-limited command processor mutating a tunable table.
pub struct CommandProcessor {
    recent_ms: VecDeque<f64>,
}

impl CommandProcessor {
    pub fn new() -> Self {
        Self {
            recent_ms: VecDeque::with_capacity(RATE_LIMIT_PER_SEC + 1),
        }
    }

    /// Handle one raw command line at stream time `now_ms`.
    pub fn handle_line(
        &mut self,
        line: &str,
        now_ms: f64,
        tunables: &mut Tunables,
    ) -> CommandOutcome {
        while self
            .recent_ms
            .front()
            .map_or(false, |&t| now_ms - t >= 1000.0)
        {
            self.recent_ms.pop_front();
        }
        if self.recent_ms.len() >= RATE_LIMIT_PER_SEC {
            return CommandOutcome::rejected(format!(
                "ERR RATE_LIMIT exceeded ({RATE_LIMIT_PER_SEC}/sec)"
            ));
        }
        self.recent_ms.push_back(now_ms);

        let command = match parse_line(line) {
            Ok(c) => c,
            Err(ParseError::Malformed(reason)) => {
                return CommandOutcome::rejected(format!("ERR PARSE {reason}"));
            }
            Err(ParseError::UnknownCommand(name)) => {
                return CommandOutcome::rejected(format!("ERR UNKNOWN_CMD {name}"));
            }
        };

        match command {
            Command::SetParam { command, value } => match tunables.set(&command, value) {
                Ok(spec) => CommandOutcome {
                    response: format!("OK {}={:.3}", spec.key, value),
                    params_updated: true,
                    telem_change: None,
                },
                Err(Some(spec)) => CommandOutcome::rejected(format!(
                    "ERR 400 Invalid {}={:.3} (range {:?}-{:?})",
                    spec.key, value, spec.min, spec.max
                )),
                Err(None) => CommandOutcome::rejected(format!("ERR UNKNOWN_CMD {command}")),
            },
            Command::EnableTelem(channel) => CommandOutcome {
                response: format!("OK telem_{}=1", channel.as_str().to_lowercase()),
                params_updated: false,
                telem_change: Some((channel, true)),
            },
            Command::DisableTelem(channel) => CommandOutcome {
                response: format!("OK telem_{}=0", channel.as_str().to_lowercase()),
                params_updated: false,
                telem_change: Some((channel, false)),
            },
        }
    }
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("recent", &self.recent_ms.len())
            .finish()
    }
}
