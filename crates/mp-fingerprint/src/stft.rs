//! Windowed real FFT for frame-wise spectral analysis

use std::sync::Arc;

use num_complex::Complex64;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::{FingerprintError, FingerprintResult};

/// Hann-windowed power spectrum of single frames
#[derive(Clone)]
pub struct Stft {
    fft_size: usize,
    sample_rate: u32,
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("fft_size", &self.fft_size)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl Stft {
    pub fn new(fft_size: usize, sample_rate: u32) -> FingerprintResult<Self> {
        if !fft_size.is_power_of_two() {
            return Err(FingerprintError::Config(format!(
                "FFT size must be power of 2, got {}",
                fft_size
            )));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Hann window
        let window: Vec<f64> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / fft_size as f64).cos()))
            .collect();

        Ok(Self {
            fft_size,
            sample_rate,
            fft,
            window,
        })
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Power spectrum (|X|², normalized) of one frame; shorter frames are
    /// zero-padded. `None` if the transform fails.
    pub fn power_spectrum(&self, frame: &[f32]) -> Option<Vec<f64>> {
        let mut input = vec![0.0f64; self.fft_size];
        for ((slot, &sample), &w) in input.iter_mut().zip(frame).zip(&self.window) {
            *slot = sample as f64 * w;
        }

        let mut spectrum = vec![Complex64::new(0.0, 0.0); self.num_bins()];
        self.fft.process(&mut input, &mut spectrum).ok()?;

        let normalization = 2.0 / self.fft_size as f64;
        Some(
            spectrum
                .iter()
                .map(|bin| {
                    let mag = bin.norm() * normalization;
                    mag * mag
                })
                .collect(),
        )
    }

    /// Get frequency for a given bin index
    pub fn bin_to_freq(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate as f64 / self.fft_size as f64
    }

    /// Get bin index for a given frequency
    pub fn freq_to_bin(&self, freq: f64) -> usize {
        ((freq * self.fft_size as f64 / self.sample_rate as f64).round().max(0.0) as usize)
            .min(self.fft_size / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let sr = 48000;
        let stft = Stft::new(2048, sr).unwrap();
        let freq = stft.bin_to_freq(100);
        let frame: Vec<f32> = (0..2048)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sr as f64).sin() as f32)
            .collect();
        let power = stft.power_spectrum(&frame).unwrap();
        let peak = power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(100));
        assert_eq!(stft.freq_to_bin(freq), 100);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(Stft::new(1000, 44100).is_err());
    }
}
