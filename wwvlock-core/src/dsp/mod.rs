//! DSP primitives shared by the detector stages.

pub mod biquad;
pub mod decimator;
pub mod goertzel;
pub mod slow_fft;
pub mod tone;
pub mod window;

pub use biquad::{Biquad, ComplexBiquad};
pub use decimator::{DecimationChain, Normalizer};
pub use goertzel::Goertzel;
pub use slow_fft::{SlowFft, SlowFftFrame};
pub use tone::{mirror_bins, FramePower};
