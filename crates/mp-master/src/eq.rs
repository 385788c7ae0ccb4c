//! Seven-band mastering EQ
//!
//! RBJ cookbook sections: low shelf on the sub-bass band, bells on the five
//! middle bands, high shelf on the air band. Bands with negligible gain are
//! skipped entirely.

use std::f64::consts::PI;

use crate::params::{EQ_BANDS, EQ_CENTERS_HZ};

/// Gains below this are treated as flat (dB)
const FLAT_DB: f64 = 0.01;

/// Bell bandwidth
const BELL_Q: f64 = 0.9;

/// Shelf slope
const SHELF_Q: f64 = 0.707;

/// Normalized biquad coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_omega) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_omega) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    pub fn low_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * sin_omega / (2.0 * q);

        let a0 = (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        Self {
            b0: a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha) / a0,
            b1: 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega) / a0,
            b2: a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha) / a0,
            a1: -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha) / a0,
        }
    }

    pub fn high_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * sin_omega / (2.0 * q);

        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        Self {
            b0: a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha) / a0,
            b1: -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega) / a0,
            b2: a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha) / a0,
            a1: 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha) / a0,
        }
    }

    /// Magnitude response at `freq` (linear)
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * freq / sample_rate;
        let (s1, c1) = omega.sin_cos();
        let (s2, c2) = (2.0 * omega).sin_cos();
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// Transposed direct form II state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, c: &BiquadCoeffs, input: f64) -> f64 {
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }
}

/// One active band
#[derive(Debug, Clone)]
struct EqSection {
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

/// Static seven-band EQ
#[derive(Debug, Clone)]
pub struct MasteringEq {
    sample_rate: u32,
    gains_db: [f64; EQ_BANDS],
    sections: Vec<EqSection>,
}

impl MasteringEq {
    pub fn new(sample_rate: u32, channels: usize, gains_db: [f64; EQ_BANDS]) -> Self {
        let sr = sample_rate as f64;
        let nyquist = sr / 2.0;
        let sections = EQ_CENTERS_HZ
            .iter()
            .zip(gains_db)
            .enumerate()
            .filter(|&(_, (&freq, gain))| gain.abs() >= FLAT_DB && freq < 0.9 * nyquist)
            .map(|(band, (&freq, gain))| {
                let coeffs = match band {
                    0 => BiquadCoeffs::low_shelf(freq, SHELF_Q, gain, sr),
                    b if b == EQ_BANDS - 1 => BiquadCoeffs::high_shelf(freq, SHELF_Q, gain, sr),
                    _ => BiquadCoeffs::peaking(freq, BELL_Q, gain, sr),
                };
                EqSection {
                    coeffs,
                    states: vec![BiquadState::default(); channels],
                }
            })
            .collect();

        Self {
            sample_rate,
            gains_db,
            sections,
        }
    }

    pub fn gains_db(&self) -> &[f64; EQ_BANDS] {
        &self.gains_db
    }

    /// Bands that actually filter
    pub fn active_bands(&self) -> usize {
        self.sections.len()
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.sections.is_empty()
    }

    /// Combined magnitude response at `freq` in dB
    pub fn response_db(&self, freq: f64) -> f64 {
        let sr = self.sample_rate as f64;
        self.sections
            .iter()
            .map(|s| 20.0 * s.coeffs.magnitude(freq, sr).log10())
            .sum()
    }

    pub fn process(&mut self, channels: &mut [&mut [f32]]) {
        for section in &mut self.sections {
            for (state, channel) in section.states.iter_mut().zip(channels.iter_mut()) {
                for sample in channel.iter_mut() {
                    *sample = state.process(&section.coeffs, *sample as f64) as f32;
                }
            }
        }
    }

    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.states.fill(BiquadState::default());
        }
    }
}
