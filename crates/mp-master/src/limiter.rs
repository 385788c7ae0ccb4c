//! Safety limiter
//!
//! Last line of defense against overs. Samples below a knee 3 dB under the
//! ceiling are untouched; above it a tanh curve bends them toward the
//! ceiling without ever reaching it. The limiter never adds gain: making
//! up the RMS lost to clipping would push the peaks straight back over the
//! ceiling.

use mp_core::AudioBuffer;
use mp_core::numeric::db_to_linear;

/// Fixed output ceiling (dBFS)
pub const SAFETY_CEILING_DB: f64 = -0.1;

/// Knee distance below the ceiling (dB)
pub const KNEE_DB: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyLimiter {
    ceiling: f32,
    knee: f32,
}

impl Default for SafetyLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyLimiter {
    pub fn new() -> Self {
        Self {
            ceiling: db_to_linear(SAFETY_CEILING_DB) as f32,
            knee: db_to_linear(SAFETY_CEILING_DB - KNEE_DB) as f32,
        }
    }

    /// Ceiling as linear amplitude
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Whether a buffer with this peak needs limiting
    #[inline]
    pub fn is_triggered(&self, peak: f32) -> bool {
        peak > self.ceiling
    }

    /// Transfer curve. Continuous with slope 1 at the knee, strictly below
    /// the ceiling above it, and never larger in magnitude than the input.
    #[inline]
    pub fn shape(&self, x: f32) -> f32 {
        let magnitude = x.abs();
        if magnitude <= self.knee {
            return x;
        }
        let headroom = self.ceiling - self.knee;
        let shaped = self.knee + headroom * ((magnitude - self.knee) / headroom).tanh();
        shaped.min(magnitude).copysign(x)
    }

    /// Limit in place; returns whether anything was done.
    ///
    /// A buffer whose peak is at or below the ceiling passes through
    /// bit-identical.
    pub fn process(&self, buffer: &mut AudioBuffer) -> bool {
        if !self.is_triggered(buffer.peak()) {
            return false;
        }
        buffer.map_samples(|s| self.shape(s));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_below_ceiling_passes_through() {
        let limiter = SafetyLimiter::new();
        let samples: Vec<f32> = (0..1000).map(|i| 0.9 * (i as f32 * 0.05).sin()).collect();
        let mut buffer = AudioBuffer::mono(samples.clone(), 48000).unwrap();
        assert!(!limiter.process(&mut buffer));
        assert_eq!(buffer.left(), samples.as_slice());
    }

    #[test]
    fn test_hot_input_lands_under_ceiling() {
        let limiter = SafetyLimiter::new();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let samples: Vec<f32> = (0..48000).map(|_| (rng.random::<f32>() * 2.0 - 1.0) * 4.0).collect();
        let mut buffer = AudioBuffer::mono(samples, 48000).unwrap();
        let rms_before = buffer.rms();
        assert!(limiter.process(&mut buffer));
        assert!(buffer.peak() <= limiter.ceiling());
        assert!(buffer.rms() <= rms_before);
    }

    #[test]
    fn test_shape_never_amplifies() {
        let limiter = SafetyLimiter::new();
        for step in -2000..=2000 {
            let x = step as f32 / 500.0;
            let y = limiter.shape(x);
            assert!(y.abs() <= x.abs(), "{x} -> {y}");
            assert!(y.abs() <= limiter.ceiling());
            assert_eq!(y.signum(), x.signum());
        }
    }

    #[test]
    fn test_shape_is_continuous_at_knee() {
        let limiter = SafetyLimiter::new();
        let knee = limiter.knee;
        let below = limiter.shape(knee);
        let above = limiter.shape(knee + 1e-4);
        assert!((above - below).abs() < 2e-4);
    }
}
