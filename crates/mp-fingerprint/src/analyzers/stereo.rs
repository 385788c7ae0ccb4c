//! Stereo width and phase correlation
//!
//! Both values are energy-weighted over the whole signal: running sums of
//! `L·R`, `L²`, `R²` and of mid/side energy are kept, so the result does not
//! depend on how the audio was chunked.

use mp_core::numeric::{self, EPSILON};
use mp_core::AudioBuffer;

use super::{AnalyzerKind, Degradation, FeatureAnalyzer};
use crate::config::AnalysisConfig;
use crate::dimension::Dimension;
use crate::fingerprint::Features;

/// Running stereo energy sums shared by batch and streaming analysis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoAccumulator {
    sum_lr: f64,
    sum_ll: f64,
    sum_rr: f64,
    mid_energy: f64,
    side_energy: f64,
    frames: u64,
}

impl StereoAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a buffer; mono reads as identical left and right
    pub fn push(&mut self, buffer: &AudioBuffer) {
        let left = buffer.left();
        let right = buffer.right();
        for (&l, &r) in left.iter().zip(right) {
            let (l, r) = (l as f64, r as f64);
            self.sum_lr += l * r;
            self.sum_ll += l * l;
            self.sum_rr += r * r;
            let mid = 0.5 * (l + r);
            let side = 0.5 * (l - r);
            self.mid_energy += mid * mid;
            self.side_energy += side * side;
        }
        self.frames += left.len() as u64;
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// True once any non-silent frame has been seen
    pub fn has_energy(&self) -> bool {
        self.sum_ll + self.sum_rr > EPSILON
    }

    pub fn correlation(&self) -> f64 {
        let norm = (self.sum_ll * self.sum_rr).sqrt();
        if norm < EPSILON {
            // Silence or one silent channel carries no phase information
            return 1.0;
        }
        numeric::safe_divide(self.sum_lr, norm, 1.0).clamp(-1.0, 1.0)
    }

    pub fn width(&self) -> f64 {
        numeric::safe_divide(self.side_energy, self.mid_energy + self.side_energy, 0.0).clamp(0.0, 1.0)
    }

    pub fn features(&self) -> Features {
        let mut features = Features::new();
        features.insert(Dimension::StereoWidth, self.width());
        features.insert(Dimension::PhaseCorrelation, self.correlation());
        features
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Mid/side width and L/R phase correlation
#[derive(Debug, Clone, Copy, Default)]
pub struct StereoAnalyzer;

impl FeatureAnalyzer for StereoAnalyzer {
    const KIND: AnalyzerKind = AnalyzerKind::Stereo;

    const DIMENSIONS: &'static [Dimension] = &[Dimension::StereoWidth, Dimension::PhaseCorrelation];

    // What a mono signal measures
    const DEFAULT_FEATURES: &'static [(Dimension, f64)] =
        &[(Dimension::StereoWidth, 0.0), (Dimension::PhaseCorrelation, 1.0)];

    fn compute(&self, buffer: &AudioBuffer, _config: &AnalysisConfig) -> Result<Features, Degradation> {
        let mut accumulator = StereoAccumulator::new();
        accumulator.push(buffer);
        Ok(accumulator.features())
    }
}
