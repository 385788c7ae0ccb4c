//! Feature analyzers
//!
//! Five independent analyzers each own a fixed subset of the fingerprint
//! dimensions. They are stateless, share no mutable data and can run in
//! any order or concurrently. An analyzer that cannot compute its features
//! degrades to its documented defaults instead of failing the fingerprint.

pub mod harmonic;
pub mod spectral;
pub mod stereo;
pub mod temporal;
pub mod variation;

use mp_core::AudioBuffer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::dimension::Dimension;
use crate::fingerprint::Features;

pub use harmonic::HarmonicAnalyzer;
pub use spectral::SpectralAnalyzer;
pub use stereo::StereoAnalyzer;
pub use temporal::TemporalAnalyzer;
pub use variation::VariationAnalyzer;

/// Analyzer family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Spectral,
    Temporal,
    Harmonic,
    Variation,
    Stereo,
}

/// Why an analyzer fell back to its defaults
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Degradation {
    #[error("input carries no measurable energy")]
    Silent,

    #[error("input too short: need {needed} frames, got {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("dimension {0} missing from analyzer output")]
    Missing(Dimension),

    #[error("dimension {0} produced a non-finite value")]
    NonFinite(Dimension),

    #[error("spectral transform failed")]
    Transform,
}

/// Output of one analyzer run
#[derive(Debug, Clone)]
pub struct AnalyzerOutput {
    pub kind: AnalyzerKind,
    pub features: Features,
    /// Set when the defaults were substituted
    pub degradation: Option<Degradation>,
}

impl AnalyzerOutput {
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}

/// A stateless analyzer producing a fixed set of dimensions
pub trait FeatureAnalyzer: Send + Sync {
    const KIND: AnalyzerKind;

    /// Dimensions produced, in canonical order
    const DIMENSIONS: &'static [Dimension];

    /// Values substituted when computation is impossible
    const DEFAULT_FEATURES: &'static [(Dimension, f64)];

    /// Compute the features, or explain why they cannot be computed
    fn compute(&self, buffer: &AudioBuffer, config: &AnalysisConfig) -> Result<Features, Degradation>;

    /// Compute with graceful degradation: never fails, never emits NaN
    fn analyze(&self, buffer: &AudioBuffer, config: &AnalysisConfig) -> AnalyzerOutput {
        match self.compute(buffer, config).and_then(Self::complete) {
            Ok(features) => AnalyzerOutput {
                kind: Self::KIND,
                features,
                degradation: None,
            },
            Err(reason) => {
                log::debug!("{:?} analyzer degraded to defaults: {}", Self::KIND, reason);
                AnalyzerOutput {
                    kind: Self::KIND,
                    features: Self::DEFAULT_FEATURES.iter().copied().collect(),
                    degradation: Some(reason),
                }
            }
        }
    }

    /// Keep exactly the analyzer's dimensions and require all of them finite
    fn complete(features: Features) -> Result<Features, Degradation> {
        let mut out = Features::new();
        for &dim in Self::DIMENSIONS {
            match features.get(&dim) {
                None => return Err(Degradation::Missing(dim)),
                Some(v) if !v.is_finite() => return Err(Degradation::NonFinite(dim)),
                Some(&v) => {
                    out.insert(dim, v);
                }
            }
        }
        Ok(out)
    }
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 5] = [
        AnalyzerKind::Spectral,
        AnalyzerKind::Temporal,
        AnalyzerKind::Harmonic,
        AnalyzerKind::Variation,
        AnalyzerKind::Stereo,
    ];

    /// Run the analyzer of this kind
    pub fn analyze(self, buffer: &AudioBuffer, config: &AnalysisConfig) -> AnalyzerOutput {
        match self {
            AnalyzerKind::Spectral => SpectralAnalyzer.analyze(buffer, config),
            AnalyzerKind::Temporal => TemporalAnalyzer.analyze(buffer, config),
            AnalyzerKind::Harmonic => HarmonicAnalyzer.analyze(buffer, config),
            AnalyzerKind::Variation => VariationAnalyzer.analyze(buffer, config),
            AnalyzerKind::Stereo => StereoAnalyzer.analyze(buffer, config),
        }
    }

    pub fn dimensions(self) -> &'static [Dimension] {
        match self {
            AnalyzerKind::Spectral => SpectralAnalyzer::DIMENSIONS,
            AnalyzerKind::Temporal => TemporalAnalyzer::DIMENSIONS,
            AnalyzerKind::Harmonic => HarmonicAnalyzer::DIMENSIONS,
            AnalyzerKind::Variation => VariationAnalyzer::DIMENSIONS,
            AnalyzerKind::Stereo => StereoAnalyzer::DIMENSIONS,
        }
    }

    pub fn default_features(self) -> &'static [(Dimension, f64)] {
        match self {
            AnalyzerKind::Spectral => SpectralAnalyzer::DEFAULT_FEATURES,
            AnalyzerKind::Temporal => TemporalAnalyzer::DEFAULT_FEATURES,
            AnalyzerKind::Harmonic => HarmonicAnalyzer::DEFAULT_FEATURES,
            AnalyzerKind::Variation => VariationAnalyzer::DEFAULT_FEATURES,
            AnalyzerKind::Stereo => StereoAnalyzer::DEFAULT_FEATURES,
        }
    }

    /// Default value for one of this analyzer's dimensions
    pub fn default_value(self, dim: Dimension) -> Option<f64> {
        self.default_features()
            .iter()
            .find(|(d, _)| *d == dim)
            .map(|&(_, v)| v)
    }

    /// Time constant (seconds) with which streaming estimates of this
    /// family converge; drives streaming confidence
    pub fn convergence_secs(self) -> f64 {
        match self {
            AnalyzerKind::Spectral => 1.5,
            AnalyzerKind::Stereo => 2.0,
            AnalyzerKind::Variation => 6.0,
            AnalyzerKind::Temporal => 8.0,
            AnalyzerKind::Harmonic => 6.0,
        }
    }
}
