mod config;
mod control;
mod source;
mod telemetry;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Context, Result};

use wwvlock_core::pipeline::{Pipeline, PipelineConfig};
use wwvlock_core::Tunables;

use config::{CliConfig, SourceKind};
use control::ControlEndpoint;
use source::SampleSource;
use telemetry::TelemetryEmitter;

#[derive(Parser, Debug)]
#[command(author, version, about = "WWV/WWVH broadcast-cycle receiver", long_about = None)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override: WAV input file (two channels, I/Q).
    #[arg(short = 'w', long)]
    wav: Option<PathBuf>,

    /// Override: run the synthetic noise source instead of a signal.
    #[arg(long)]
    noise: bool,

    /// Override: seconds to run (0 = until source ends).
    #[arg(short, long)]
    duration: Option<f64>,

    /// Override: tunable-table INI path.
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Load and apply the tunable INI at startup.
    #[arg(short, long)]
    reload: bool,

    /// Verbose pipeline logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };

    if let Some(wav) = args.wav {
        config.source.kind = SourceKind::Wav;
        config.source.path = Some(wav);
    }
    if args.noise {
        config.source.kind = SourceKind::Noise;
    }
    if let Some(duration) = args.duration {
        config.source.duration_secs = duration;
    }
    if let Some(params) = args.params {
        config.params_path = params;
    }
    if args.reload {
        config.reload_params = true;
    }

    run(config, args.verbose)
}

fn run(config: CliConfig, verbose: bool) -> Result<()> {
    let mut source = SampleSource::open(&config.source)?;
    let header = source.header(&config.source);

    let mut pipeline_config = PipelineConfig::new(header.sample_rate_hz);
    if verbose {
        pipeline_config.log = wwvlock_core::pipeline::LogConfigChoice::Verbose;
    }

    let mut pipeline = Pipeline::new(pipeline_config, Tunables::default())?;
    pipeline.on_stream_header(header)?;

    // Startup reload: out-of-range entries fall back to defaults with a
    // warning, a missing file is not an error.
    if config.reload_params {
        match Tunables::load(&config.params_path) {
            Ok((tunables, warnings)) => {
                for warning in warnings {
                    eprintln!("[WARN] PERSIST: {warning}");
                }
                pipeline.apply_tunables(tunables);
            }
            Err(e) => eprintln!("[WARN] PERSIST: {e}, using defaults"),
        }
    }

    let mut emitter = TelemetryEmitter::new(&config.telemetry)?;
    let mut control = match &config.control.bind {
        Some(address) => Some(ControlEndpoint::bind(address)?),
        None => None,
    };

    // Ingest loop: ~100 ms blocks through the whole graph, then the
    // out-of-band work (control, telemetry flush, logs).
    let block = (header.sample_rate_hz / 10) as usize;
    let duration = config.source.duration_secs;

    loop {
        let Some((i, q)) = source.next_block(block) else {
            break;
        };
        pipeline.on_samples(&i, &q, false)?;

        let records = pipeline.drain_telemetry();
        emitter.emit_all(&records)?;

        if let Some(endpoint) = control.as_mut() {
            for (line, addr) in endpoint.poll() {
                let outcome = pipeline.handle_command(&line);
                if outcome.params_updated {
                    if let Err(e) = pipeline.tunables().save(&config.params_path) {
                        eprintln!("[WARN] PERSIST: {e}");
                    }
                }
                endpoint.respond(addr, &outcome.response);
            }
        }

        for entry in pipeline.drain_logs() {
            eprintln!("[{}] {}: {}", entry.level, entry.subsystem, entry.message);
        }

        if duration > 0.0 && pipeline.now_ms() >= duration * 1000.0 {
            break;
        }
    }

    emitter.flush()?;

    let context = pipeline.sync_context();
    eprintln!(
        "done: {:.1} s processed, sync {} (confidence {:.3}), {} records emitted",
        pipeline.now_ms() / 1000.0,
        context.state.as_str(),
        context.confidence,
        emitter.emitted()
    );

    pipeline
        .tunables()
        .save(&config.params_path)
        .wrap_err("final parameter save")?;

    Ok(())
}
