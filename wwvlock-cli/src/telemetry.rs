//! Telemetry transports: stdout, CSV file, and UDP datagrams.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::net::UdpSocket;
use std::path::Path;

use chrono::Local;
use color_eyre::eyre::{Context, Result};
use wwvlock_core::telemetry::TelemetryRecord;

use crate::config::TelemetryConfig;

enum Sink {
    Stdout,
    Csv(BufWriter<std::fs::File>),
    Udp { socket: UdpSocket, target: String },
}

/// Fan-out emitter. Records are totally ordered per sink; the UDP sink is
/// fire-and-forget.
pub struct TelemetryEmitter {
    sinks: Vec<Sink>,
    json: bool,
    emitted: u64,
}

impl TelemetryEmitter {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let mut sinks = Vec::new();

        if config.stdout {
            sinks.push(Sink::Stdout);
        }
        if let Some(path) = &config.csv_path {
            sinks.push(Sink::Csv(open_csv(path)?));
        }
        if let Some(target) = &config.udp_target {
            let socket = UdpSocket::bind("0.0.0.0:0").wrap_err("binding telemetry socket")?;
            sinks.push(Sink::Udp {
                socket,
                target: target.clone(),
            });
        }

        Ok(Self {
            sinks,
            json: config.json,
            emitted: 0,
        })
    }

    pub fn emit_all(&mut self, records: &[TelemetryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let wall = Local::now().format("%H:%M:%S%.3f").to_string();

        for record in records {
            let line = if self.json {
                serde_json::to_string(record)?
            } else {
                record.format_line(&wall)
            };

            for sink in &mut self.sinks {
                match sink {
                    Sink::Stdout => println!("{line}"),
                    Sink::Csv(writer) => {
                        writeln!(writer, "{line}").wrap_err("writing telemetry CSV")?;
                    }
                    Sink::Udp { socket, target } => {
                        // Lossy by contract; errors are not retried.
                        let _ = socket.send_to(line.as_bytes(), target.as_str());
                    }
                }
            }
            self.emitted += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            if let Sink::Csv(writer) = sink {
                writer.flush().wrap_err("flushing telemetry CSV")?;
            }
        }
        Ok(())
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

fn open_csv(path: &Path) -> Result<BufWriter<std::fs::File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("opening telemetry CSV {}", path.display()))?;
    Ok(BufWriter::new(file))
}
