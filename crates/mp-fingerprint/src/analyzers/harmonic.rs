//! Harmonicity, pitch stability and chroma concentration

use std::sync::Arc;

use mp_core::numeric;
use mp_core::AudioBuffer;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::{AnalyzerKind, Degradation, FeatureAnalyzer};
use crate::config::AnalysisConfig;
use crate::dimension::Dimension;
use crate::fingerprint::Features;
use crate::framing::FrameSplitter;

/// Pitch search range
const MIN_PITCH_HZ: f64 = 50.0;
const MAX_PITCH_HZ: f64 = 1000.0;

/// Chroma is gathered from this band
const CHROMA_LOW_HZ: f64 = 55.0;
const CHROMA_HIGH_HZ: f64 = 5000.0;

/// Frames quieter than this are skipped (dBFS)
const FRAME_GATE_DB: f64 = -50.0;

/// Normalized autocorrelation needed to call a frame voiced
const VOICING_THRESHOLD: f64 = 0.5;

/// Earliest lag within this fraction of the best peak wins (octave guard)
const PEAK_TOLERANCE: f64 = 0.9;

/// Semitone spread at which pitch stability reaches zero
const PITCH_SPREAD_SEMITONES: f64 = 12.0;

/// Per-frame harmonic measurements
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameHarmonics {
    ratio: f64,
    pitch_hz: Option<f64>,
    chroma_concentration: f64,
}

/// Autocorrelation pitch tracker.
///
/// Uses the windowed-signal autocorrelation divided by the window's own
/// autocorrelation, which removes the taper bias at long lags.
struct PitchTracker {
    frame_size: usize,
    fft_size: usize,
    sample_rate: f64,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    window_acf: Vec<f64>,
}

impl PitchTracker {
    fn new(frame_size: usize, sample_rate: u32) -> Self {
        let fft_size = frame_size * 2;
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let window: Vec<f64> = (0..frame_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / frame_size as f64).cos()))
            .collect();

        let mut tracker = Self {
            frame_size,
            fft_size,
            sample_rate: sample_rate as f64,
            forward,
            inverse,
            window_acf: Vec::new(),
            window: window.clone(),
        };
        let (acf, _) = tracker.autocorrelation(&window);
        tracker.window_acf = acf;
        tracker
    }

    /// Autocorrelation (lags `0..frame_size`) and the power spectrum of the
    /// zero-padded input
    fn autocorrelation(&self, input: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];
        for (slot, &x) in buffer.iter_mut().zip(input) {
            *slot = Complex::new(x, 0.0);
        }
        self.forward.process(&mut buffer);

        let power: Vec<f64> = buffer.iter().map(|c| c.norm_sqr()).collect();
        for (slot, &p) in buffer.iter_mut().zip(&power) {
            *slot = Complex::new(p, 0.0);
        }
        self.inverse.process(&mut buffer);

        let acf = buffer[..self.frame_size].iter().map(|c| c.re).collect();
        (acf, power)
    }

    fn analyze(&self, frame: &[f32]) -> Option<FrameHarmonics> {
        let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = numeric::safe_divide(sum_sq, frame.len() as f64, 0.0).sqrt();
        if numeric::linear_to_db(rms) < FRAME_GATE_DB {
            return None;
        }

        let mean = frame.iter().map(|&s| s as f64).sum::<f64>() / frame.len() as f64;
        let windowed: Vec<f64> = frame
            .iter()
            .zip(&self.window)
            .map(|(&s, &w)| (s as f64 - mean) * w)
            .collect();
        let (acf, power) = self.autocorrelation(&windowed);
        if acf[0] <= numeric::EPSILON {
            return None;
        }

        let min_lag = (self.sample_rate / MAX_PITCH_HZ).ceil().max(1.0) as usize;
        let max_lag = ((self.sample_rate / MIN_PITCH_HZ).floor() as usize).min(self.frame_size / 2);
        let normalized: Vec<(usize, f64)> = (min_lag..=max_lag)
            .map(|lag| {
                let r = acf[lag] / acf[0];
                let w = numeric::safe_divide(self.window_acf[lag], self.window_acf[0], 1.0);
                (lag, numeric::safe_divide(r, w, 0.0))
            })
            .collect();

        let best = normalized.iter().map(|&(_, v)| v).fold(0.0f64, f64::max);
        let ratio = best.clamp(0.0, 1.0);

        let pitch_hz = if ratio >= VOICING_THRESHOLD {
            // Earliest local peak close to the best one
            normalized
                .windows(3)
                .find(|w| w[1].1 >= w[0].1 && w[1].1 >= w[2].1 && w[1].1 >= best * PEAK_TOLERANCE)
                .map(|w| self.sample_rate / w[1].0 as f64)
        } else {
            None
        };

        Some(FrameHarmonics {
            ratio,
            pitch_hz,
            chroma_concentration: self.chroma_concentration(&power),
        })
    }

    /// How much of the 12-bin chroma energy sits in its strongest pitch class,
    /// rescaled so uniform chroma reads 0 and a single class reads 1
    fn chroma_concentration(&self, power: &[f64]) -> f64 {
        let mut chroma = [0.0f64; 12];
        let bin_hz = self.sample_rate / self.fft_size as f64;
        for (bin, &p) in power.iter().enumerate().take(self.fft_size / 2 + 1).skip(1) {
            let freq = bin as f64 * bin_hz;
            if !(CHROMA_LOW_HZ..=CHROMA_HIGH_HZ).contains(&freq) {
                continue;
            }
            let midi = (12.0 * (freq / 440.0).log2() + 69.0).round() as i64;
            chroma[midi.rem_euclid(12) as usize] += p;
        }

        let total: f64 = chroma.iter().sum();
        let max = chroma.iter().copied().fold(0.0, f64::max);
        let share = numeric::safe_divide(max, total, 1.0 / 12.0);
        ((share - 1.0 / 12.0) / (11.0 / 12.0)).clamp(0.0, 1.0)
    }
}

/// Harmonic-to-total ratio, pitch stability and chroma concentration
#[derive(Debug, Clone, Copy, Default)]
pub struct HarmonicAnalyzer;

impl FeatureAnalyzer for HarmonicAnalyzer {
    const KIND: AnalyzerKind = AnalyzerKind::Harmonic;

    const DIMENSIONS: &'static [Dimension] = &[
        Dimension::HarmonicRatio,
        Dimension::PitchStability,
        Dimension::ChromaEnergy,
    ];

    const DEFAULT_FEATURES: &'static [(Dimension, f64)] = &[
        (Dimension::HarmonicRatio, 0.5),
        (Dimension::PitchStability, 0.5),
        (Dimension::ChromaEnergy, 0.3),
    ];

    fn compute(&self, buffer: &AudioBuffer, config: &AnalysisConfig) -> Result<Features, Degradation> {
        let tracker = PitchTracker::new(config.harmonic_frame_size, buffer.sample_rate());
        let mono = buffer.mono_mix();

        let mut frames = Vec::new();
        let mut splitter = FrameSplitter::new(config.harmonic_frame_size, config.harmonic_hop_size);
        let mut on_frame = |frame: &[f32]| {
            if let Some(harmonics) = tracker.analyze(frame) {
                frames.push(harmonics);
            }
        };
        splitter.push(&mono, &mut on_frame);
        splitter.flush_padded(&mut on_frame);

        if frames.is_empty() {
            return Err(Degradation::Silent);
        }

        let ratios: Vec<f64> = frames.iter().map(|f| f.ratio).collect();
        let chroma: Vec<f64> = frames.iter().map(|f| f.chroma_concentration).collect();
        let semitones: Vec<f64> = frames
            .iter()
            .filter_map(|f| f.pitch_hz)
            .map(|hz| 12.0 * (hz / 440.0).log2() + 69.0)
            .collect();

        let pitch_stability = if semitones.len() >= 2 {
            let spread = Dimension::PitchStability.collapse(&semitones, PITCH_SPREAD_SEMITONES);
            1.0 - (spread / PITCH_SPREAD_SEMITONES).min(1.0)
        } else {
            0.0
        };

        let mut features = Features::new();
        features.insert(
            Dimension::HarmonicRatio,
            Dimension::HarmonicRatio.collapse(&ratios, 0.5).clamp(0.0, 1.0),
        );
        features.insert(Dimension::PitchStability, pitch_stability.clamp(0.0, 1.0));
        features.insert(
            Dimension::ChromaEnergy,
            Dimension::ChromaEnergy.collapse(&chroma, 0.3).clamp(0.0, 1.0),
        );
        Ok(features)
    }
}
