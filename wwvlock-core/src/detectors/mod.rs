//! Detector stages operating on the decimated sample streams.

pub mod bcd_freq;
pub mod bcd_time;
pub mod channel_quality;
pub mod marker_fast;
pub mod marker_slow;
pub mod subcarrier;
pub mod tick;

pub use bcd_freq::BcdFreqDetector;
pub use bcd_time::BcdTimeDetector;
pub use channel_quality::ChannelQualityMonitor;
pub use marker_fast::FastMarkerDetector;
pub use marker_slow::SlowMarkerDetector;
pub use subcarrier::SubcarrierMonitor;
pub use tick::{TickDetector, TickOutput};
