//! Correlator stages fusing detector evidence into confirmed events.

pub mod bcd;
pub mod marker;
pub mod tick_chain;

pub use bcd::BcdCorrelator;
pub use marker::MarkerCorrelator;
pub use tick_chain::TickCorrelator;
