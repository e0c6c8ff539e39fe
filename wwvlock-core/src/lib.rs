//! wwvlock core library
//!
//! Detection and synchronization pipeline for the WWV/WWVH time-standard
//! broadcast: a complex baseband stream in, a confidence-scored phase lock
//! on the broadcast cycle out, with structured telemetry for every
//! detection along the way.

pub mod bus;
pub mod calib;
pub mod clock;
pub mod control;
pub mod correlators;
pub mod detectors;
pub mod dsp;
pub mod epoch;
pub mod errors;
pub mod events;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod sync;
pub mod synth;
pub mod telemetry;
pub mod tunables;

// Re-export the canonical pipeline interface.
pub use epoch::{EpochEstimate, EpochSource};
pub use errors::{Result, WwvError};
pub use events::{SyncContext, SyncState};
pub use pipeline::{Pipeline, PipelineConfig};
pub use telemetry::{TelemetryChannel, TelemetryRecord};
pub use tunables::Tunables;
