//! Second-epoch estimate and source precedence.
//!
//! The epoch is the estimated phase of second-0 relative to the monotonic
//! clock, always held in `[0, 1000)` ms. Two producers compete: the tick
//! correlator (source `TickChain`) and marker-derived installs (source
//! `Marker`). Precedence is a total order on `(source, confidence)`:
//! `TickChain` replaces `Marker` only with strictly higher confidence, and
//! `Marker` may install only over `None`.

use serde::{Deserialize, Serialize};

use crate::calib::SECOND_MS;
use crate::clock::wrap_ms;

/// Who produced an epoch estimate. Ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EpochSource {
    None,
    Marker,
    TickChain,
}

impl EpochSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochSource::None => "NONE",
            EpochSource::Marker => "MARKER",
            EpochSource::TickChain => "TICK_CHAIN",
        }
    }
}

/// An estimate of the one-second epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochEstimate {
    /// Phase of second-0 on the monotonic clock, in `[0, 1000)` ms.
    pub offset_ms: f64,
    pub source: EpochSource,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl EpochEstimate {
    pub fn new(offset_ms: f64, source: EpochSource, confidence: f64) -> Self {
        Self {
            offset_ms: wrap_ms(offset_ms, SECOND_MS),
            source,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The absent estimate.
    pub fn none() -> Self {
        Self {
            offset_ms: 0.0,
            source: EpochSource::None,
            confidence: 0.0,
        }
    }

    /// Whether this estimate should replace `current` under the source
    /// precedence rule.
    ///
    /// A same-or-stronger source installs only with strictly higher
    /// confidence; a stronger source never yields to a weaker one. In
    /// particular `Marker` installs only over `None`, and `TickChain`
    /// replaces `Marker` or an older `TickChain` only by out-scoring it.
    pub fn supersedes(&self, current: &EpochEstimate) -> bool {
        if self.source == EpochSource::None {
            return false;
        }
        match self.source.cmp(&current.source) {
            std::cmp::Ordering::Greater => self.confidence > current.confidence,
            std::cmp::Ordering::Equal => self.confidence > current.confidence,
            std::cmp::Ordering::Less => false,
        }
    }

    /// Phase of a timestamp relative to this epoch, in `[0, 1000)` ms.
    pub fn phase_of(&self, t_ms: f64) -> f64 {
        wrap_ms(t_ms - self.offset_ms, SECOND_MS)
    }
}

impl Default for EpochEstimate {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_offset_is_wrapped_on_construction() {
        let e = EpochEstimate::new(2340.0, EpochSource::TickChain, 0.9);
        assert_relative_eq!(e.offset_ms, 340.0);
        let e = EpochEstimate::new(-20.0, EpochSource::Marker, 0.7);
        assert_relative_eq!(e.offset_ms, 980.0);
    }

    #[test]
    fn test_marker_installs_only_over_none() {
        let none = EpochEstimate::none();
        let marker = EpochEstimate::new(100.0, EpochSource::Marker, 0.7);
        let chain = EpochEstimate::new(100.0, EpochSource::TickChain, 0.8);

        assert!(marker.supersedes(&none));
        assert!(!marker.supersedes(&chain));
    }

    #[test]
    fn test_marker_over_marker_requires_higher_confidence() {
        let marker = EpochEstimate::new(100.0, EpochSource::Marker, 0.7);
        let better = EpochEstimate::new(150.0, EpochSource::Marker, 0.8);
        let worse = EpochEstimate::new(150.0, EpochSource::Marker, 0.6);
        assert!(better.supersedes(&marker));
        assert!(!worse.supersedes(&marker));
    }

    #[test]
    fn test_tick_chain_needs_strictly_higher_confidence() {
        let marker = EpochEstimate::new(100.0, EpochSource::Marker, 0.7);
        let chain_weak = EpochEstimate::new(120.0, EpochSource::TickChain, 0.7);
        let chain_strong = EpochEstimate::new(120.0, EpochSource::TickChain, 0.71);

        assert!(!chain_weak.supersedes(&marker));
        assert!(chain_strong.supersedes(&marker));
    }

    #[test]
    fn test_none_never_supersedes() {
        let none = EpochEstimate::none();
        assert!(!none.supersedes(&EpochEstimate::none()));
        assert!(!none.supersedes(&EpochEstimate::new(0.0, EpochSource::Marker, 0.1)));
    }

    #[test]
    fn test_phase_of() {
        let e = EpochEstimate::new(250.0, EpochSource::TickChain, 0.9);
        assert_relative_eq!(e.phase_of(1250.0), 0.0);
        assert_relative_eq!(e.phase_of(1300.0), 50.0);
        assert_relative_eq!(e.phase_of(1200.0), 950.0);
    }
}
