//! Block Goertzel single-bin DFT.

use std::f64::consts::TAU;

/// Narrowband magnitude extraction at one frequency over fixed-length blocks.
#[derive(Debug, Clone)]
pub struct Goertzel {
    coeff: f64,
    block_len: usize,
    s1: f64,
    s2: f64,
    count: usize,
}

impl Goertzel {
    pub fn new(block_len: usize, target_hz: f64, sample_rate_hz: f64) -> Self {
        let k = (block_len as f64 * target_hz / sample_rate_hz).round();
        let omega = TAU * k / block_len as f64;
        Self {
            coeff: 2.0 * omega.cos(),
            block_len,
            s1: 0.0,
            s2: 0.0,
            count: 0,
        }
    }

    /// Push one real sample; returns the normalized bin magnitude when a
    /// block completes.
    #[inline]
    pub fn push(&mut self, x: f64) -> Option<f64> {
        let s0 = x + self.coeff * self.s1 - self.s2;
        self.s2 = self.s1;
        self.s1 = s0;
        self.count += 1;

        if self.count == self.block_len {
            let power = self.s1 * self.s1 + self.s2 * self.s2 - self.coeff * self.s1 * self.s2;
            self.s1 = 0.0;
            self.s2 = 0.0;
            self.count = 0;
            // Scale so a full-scale tone at the target bin reads ~1.0.
            Some(power.max(0.0).sqrt() * 2.0 / self.block_len as f64)
        } else {
            None
        }
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_target_tone() {
        let fs = 50_000.0;
        let mut g = Goertzel::new(500, 100.0, fs);
        let mut out = None;
        for i in 0..500 {
            out = g.push((TAU * 100.0 * i as f64 / fs).sin()).or(out);
        }
        let mag = out.expect("block should complete");
        assert!(mag > 0.9 && mag < 1.1, "magnitude {mag}");
    }

    #[test]
    fn test_rejects_off_frequency_tone() {
        let fs = 50_000.0;
        let mut g = Goertzel::new(500, 100.0, fs);
        let mut out = None;
        for i in 0..500 {
            out = g.push((TAU * 1000.0 * i as f64 / fs).sin()).or(out);
        }
        let mag = out.expect("block should complete");
        assert!(mag < 0.05, "magnitude {mag}");
    }

    #[test]
    fn test_emits_once_per_block() {
        let mut g = Goertzel::new(500, 100.0, 50_000.0);
        let mut emitted = 0;
        for _ in 0..1500 {
            if g.push(0.1).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 3);
    }
}
