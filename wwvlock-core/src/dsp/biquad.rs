//! Second-order IIR sections (RBJ cookbook designs).

use std::f64::consts::TAU;

use num_complex::Complex64;

/// Direct Form II transposed biquad with normalized coefficients.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    /// Low-pass section at `f0` Hz with quality factor `q`.
    pub fn lowpass(sample_rate_hz: f64, f0_hz: f64, q: f64) -> Self {
        let w0 = TAU * f0_hz / sample_rate_hz;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b0 = (1.0 - cos_w0) / 2.0;
        let b1 = 1.0 - cos_w0;
        let b2 = (1.0 - cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Band-pass section (constant 0 dB peak gain) at `f0` Hz.
    pub fn bandpass(sample_rate_hz: f64, f0_hz: f64, q: f64) -> Self {
        let w0 = TAU * f0_hz / sample_rate_hz;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// A real-coefficient biquad applied to I and Q independently.
///
/// Real coefficients keep the response symmetric around DC, so a band-pass
/// at 1 kHz passes both AM sidebands of a 1 kHz audio tone.
#[derive(Debug, Clone, Copy)]
pub struct ComplexBiquad {
    re: Biquad,
    im: Biquad,
}

impl ComplexBiquad {
    pub fn lowpass(sample_rate_hz: f64, f0_hz: f64, q: f64) -> Self {
        let section = Biquad::lowpass(sample_rate_hz, f0_hz, q);
        Self {
            re: section,
            im: section,
        }
    }

    pub fn bandpass(sample_rate_hz: f64, f0_hz: f64, q: f64) -> Self {
        let section = Biquad::bandpass(sample_rate_hz, f0_hz, q);
        Self {
            re: section,
            im: section,
        }
    }

    #[inline]
    pub fn process(&mut self, x: Complex64) -> Complex64 {
        Complex64::new(self.re.process(x.re), self.im.process(x.im))
    }

    pub fn reset(&mut self) {
        self.re.reset();
        self.im.reset();
    }
}
