//! The 25 fingerprint dimensions, their canonical order and value ranges

use std::fmt;

use mp_core::numeric::{self, Aggregation};
use serde::{Deserialize, Serialize};

use crate::analyzers::AnalyzerKind;

/// Number of dimensions in a complete fingerprint
pub const FINGERPRINT_DIMENSIONS: usize = 25;

/// One named fingerprint dimension.
///
/// Declaration order is the canonical fingerprint order, so `Ord` and
/// [`Dimension::index`] agree with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    SubBassPct,
    BassPct,
    LowMidPct,
    MidPct,
    UpperMidPct,
    PresencePct,
    AirPct,
    BassMidRatio,
    SpectralCentroid,
    SpectralRolloff,
    SpectralFlatness,
    Lufs,
    CrestDb,
    DynamicRangeVariation,
    LoudnessVariation,
    PeakConsistency,
    TempoBpm,
    RhythmStability,
    TransientDensity,
    SilenceRatio,
    HarmonicRatio,
    PitchStability,
    ChromaEnergy,
    StereoWidth,
    PhaseCorrelation,
}

impl Dimension {
    /// All dimensions in canonical order
    pub const ALL: [Dimension; FINGERPRINT_DIMENSIONS] = [
        Dimension::SubBassPct,
        Dimension::BassPct,
        Dimension::LowMidPct,
        Dimension::MidPct,
        Dimension::UpperMidPct,
        Dimension::PresencePct,
        Dimension::AirPct,
        Dimension::BassMidRatio,
        Dimension::SpectralCentroid,
        Dimension::SpectralRolloff,
        Dimension::SpectralFlatness,
        Dimension::Lufs,
        Dimension::CrestDb,
        Dimension::DynamicRangeVariation,
        Dimension::LoudnessVariation,
        Dimension::PeakConsistency,
        Dimension::TempoBpm,
        Dimension::RhythmStability,
        Dimension::TransientDensity,
        Dimension::SilenceRatio,
        Dimension::HarmonicRatio,
        Dimension::PitchStability,
        Dimension::ChromaEnergy,
        Dimension::StereoWidth,
        Dimension::PhaseCorrelation,
    ];

    /// Position in the canonical order
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable snake_case name, as used in serialized fingerprints
    pub const fn name(self) -> &'static str {
        match self {
            Dimension::SubBassPct => "sub_bass_pct",
            Dimension::BassPct => "bass_pct",
            Dimension::LowMidPct => "low_mid_pct",
            Dimension::MidPct => "mid_pct",
            Dimension::UpperMidPct => "upper_mid_pct",
            Dimension::PresencePct => "presence_pct",
            Dimension::AirPct => "air_pct",
            Dimension::BassMidRatio => "bass_mid_ratio",
            Dimension::SpectralCentroid => "spectral_centroid",
            Dimension::SpectralRolloff => "spectral_rolloff",
            Dimension::SpectralFlatness => "spectral_flatness",
            Dimension::Lufs => "lufs",
            Dimension::CrestDb => "crest_db",
            Dimension::DynamicRangeVariation => "dynamic_range_variation",
            Dimension::LoudnessVariation => "loudness_variation",
            Dimension::PeakConsistency => "peak_consistency",
            Dimension::TempoBpm => "tempo_bpm",
            Dimension::RhythmStability => "rhythm_stability",
            Dimension::TransientDensity => "transient_density",
            Dimension::SilenceRatio => "silence_ratio",
            Dimension::HarmonicRatio => "harmonic_ratio",
            Dimension::PitchStability => "pitch_stability",
            Dimension::ChromaEnergy => "chroma_energy",
            Dimension::StereoWidth => "stereo_width",
            Dimension::PhaseCorrelation => "phase_correlation",
        }
    }

    /// Look a dimension up by its snake_case name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.name() == name)
    }

    /// Inclusive value range
    pub const fn range(self) -> (f64, f64) {
        match self {
            Dimension::Lufs => (-70.0, 0.0),
            Dimension::CrestDb => (0.0, 40.0),
            Dimension::TempoBpm => (40.0, 200.0),
            Dimension::PhaseCorrelation => (-1.0, 1.0),
            _ => (0.0, 1.0),
        }
    }

    /// Whether `value` is finite and inside [`Dimension::range`]
    #[inline]
    pub fn contains(self, value: f64) -> bool {
        let (min, max) = self.range();
        value.is_finite() && value >= min && value <= max
    }

    /// Dimensions measured in physical units (LUFS, dB, BPM); validation
    /// measures their error relative to the reference value instead of the range
    #[inline]
    pub const fn is_wide_range(self) -> bool {
        matches!(self, Dimension::Lufs | Dimension::CrestDb | Dimension::TempoBpm)
    }

    /// Position of `value` inside the range, in `[0, 1]`
    #[inline]
    pub fn normalize(self, value: f64) -> f64 {
        let (min, max) = self.range();
        numeric::normalize_to_range(value, min, max)
    }

    /// Analyzer family that produces this dimension
    pub const fn analyzer(self) -> AnalyzerKind {
        match self {
            Dimension::SubBassPct
            | Dimension::BassPct
            | Dimension::LowMidPct
            | Dimension::MidPct
            | Dimension::UpperMidPct
            | Dimension::PresencePct
            | Dimension::AirPct
            | Dimension::BassMidRatio
            | Dimension::SpectralCentroid
            | Dimension::SpectralRolloff
            | Dimension::SpectralFlatness => AnalyzerKind::Spectral,
            Dimension::Lufs
            | Dimension::CrestDb
            | Dimension::DynamicRangeVariation
            | Dimension::LoudnessVariation
            | Dimension::PeakConsistency => AnalyzerKind::Variation,
            Dimension::TempoBpm
            | Dimension::RhythmStability
            | Dimension::TransientDensity
            | Dimension::SilenceRatio => AnalyzerKind::Temporal,
            Dimension::HarmonicRatio | Dimension::PitchStability | Dimension::ChromaEnergy => {
                AnalyzerKind::Harmonic
            }
            Dimension::StereoWidth | Dimension::PhaseCorrelation => AnalyzerKind::Stereo,
        }
    }

    /// How per-frame or per-block observations are collapsed.
    ///
    /// Band shares come from the frame-mean spectrum and the silence ratio
    /// is the mean of a per-frame indicator (`Mean`); the variation measures
    /// are spreads (`Std`). `None` marks dimensions measured over the whole
    /// track at once: gated loudness, crest, the peak coefficient of
    /// variation, the tempo autocorrelation, onset counts and the
    /// energy-weighted stereo sums.
    pub const fn aggregation(self) -> Option<Aggregation> {
        match self {
            Dimension::SubBassPct
            | Dimension::BassPct
            | Dimension::LowMidPct
            | Dimension::MidPct
            | Dimension::UpperMidPct
            | Dimension::PresencePct
            | Dimension::AirPct
            | Dimension::BassMidRatio
            | Dimension::SilenceRatio => Some(Aggregation::Mean),
            Dimension::SpectralCentroid
            | Dimension::SpectralRolloff
            | Dimension::SpectralFlatness
            | Dimension::HarmonicRatio
            | Dimension::ChromaEnergy => Some(Aggregation::Median),
            Dimension::DynamicRangeVariation
            | Dimension::LoudnessVariation
            | Dimension::PitchStability => Some(Aggregation::Std),
            Dimension::Lufs
            | Dimension::CrestDb
            | Dimension::PeakConsistency
            | Dimension::TempoBpm
            | Dimension::RhythmStability
            | Dimension::TransientDensity
            | Dimension::StereoWidth
            | Dimension::PhaseCorrelation => None,
        }
    }

    /// Collapse per-frame observations with this dimension's
    /// [`Dimension::aggregation`]; `fallback` when nothing finite remains
    pub fn collapse(self, values: &[f64], fallback: f64) -> f64 {
        debug_assert!(self.aggregation().is_some(), "{self} is not aggregated per frame");
        match self.aggregation() {
            Some(method) => numeric::aggregate(values, method, fallback),
            None => fallback,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
