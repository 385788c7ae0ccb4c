//! Recording-type classification from the fingerprint alone
//!
//! Each type collects logistic evidence from a few fingerprint dimensions;
//! the weights are the evidence normalized to sum to one (a softmax over
//! log-evidence). `Contemporary` carries a flat prior, so it wins whenever
//! nothing else is convincing.

use std::fmt;

use mp_fingerprint::{Dimension, Fingerprint};
use serde::{Deserialize, Serialize};

use crate::error::{MasterError, MasterResult};

/// Broad production era / style of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingType {
    /// Hot, heavily limited masters with little crest left
    LoudnessWar,
    /// Dark top end, moderate level, natural dynamics
    VintageAnalog,
    /// Grid-locked rhythm with a heavy low end
    ElectronicDeterministic,
    /// Nothing distinctive; modern balanced production
    Contemporary,
}

impl RecordingType {
    pub const ALL: [RecordingType; 4] = [
        RecordingType::LoudnessWar,
        RecordingType::VintageAnalog,
        RecordingType::ElectronicDeterministic,
        RecordingType::Contemporary,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RecordingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingType::LoudnessWar => "loudness_war",
            RecordingType::VintageAnalog => "vintage_analog",
            RecordingType::ElectronicDeterministic => "electronic_deterministic",
            RecordingType::Contemporary => "contemporary",
        };
        f.write_str(name)
    }
}

/// Decision boundaries of the classifier.
///
/// Every logistic term is `σ((x - center) / slope)`; a negative slope flips
/// the direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Loudness above which material reads as loudness-war (LUFS)
    pub war_lufs: f64,
    pub war_lufs_slope: f64,
    /// Crest below which material reads as loudness-war (dB)
    pub war_crest_db: f64,
    pub war_crest_slope: f64,
    /// Air-band share below which material reads as vintage
    pub vintage_air: f64,
    pub vintage_air_slope: f64,
    /// Loudness below which material reads as vintage (LUFS)
    pub vintage_lufs: f64,
    pub vintage_lufs_slope: f64,
    /// Rhythm stability above which material reads as electronic
    pub electronic_rhythm: f64,
    pub electronic_rhythm_slope: f64,
    /// Combined sub-bass and bass share above which material reads as electronic
    pub electronic_low_end: f64,
    pub electronic_low_end_slope: f64,
    /// Flat evidence for [`RecordingType::Contemporary`]
    pub contemporary_prior: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            war_lufs: -12.0,
            war_lufs_slope: 2.0,
            war_crest_db: 10.0,
            war_crest_slope: 1.5,
            vintage_air: 0.06,
            vintage_air_slope: 0.02,
            vintage_lufs: -14.0,
            vintage_lufs_slope: 3.0,
            electronic_rhythm: 0.6,
            electronic_rhythm_slope: 0.1,
            electronic_low_end: 0.3,
            electronic_low_end_slope: 0.08,
            contemporary_prior: 0.25,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> MasterResult<()> {
        let slopes = [
            ("war_lufs_slope", self.war_lufs_slope),
            ("war_crest_slope", self.war_crest_slope),
            ("vintage_air_slope", self.vintage_air_slope),
            ("vintage_lufs_slope", self.vintage_lufs_slope),
            ("electronic_rhythm_slope", self.electronic_rhythm_slope),
            ("electronic_low_end_slope", self.electronic_low_end_slope),
        ];
        for (name, slope) in slopes {
            if !(slope.is_finite() && slope > 0.0) {
                return Err(MasterError::InvalidParameter(format!("{name} must be positive, got {slope}")));
            }
        }
        if !(self.contemporary_prior.is_finite() && self.contemporary_prior > 0.0 && self.contemporary_prior < 1.0) {
            return Err(MasterError::InvalidParameter(format!(
                "contemporary_prior must be in (0, 1), got {}",
                self.contemporary_prior
            )));
        }
        Ok(())
    }
}

/// Confidence-weighted guess at the recording type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingClassification {
    /// One weight per [`RecordingType`], in `RecordingType::ALL` order, summing to 1
    pub weights: [f64; 4],
    pub dominant: RecordingType,
    /// How far the dominant weight stands above an even split, in `[0, 1]`
    pub confidence: f64,
}

impl RecordingClassification {
    #[inline]
    pub fn weight(&self, kind: RecordingType) -> f64 {
        self.weights[kind.index()]
    }

    /// Evenly split classification with zero confidence
    pub fn uncertain() -> Self {
        Self {
            weights: [0.25; 4],
            dominant: RecordingType::Contemporary,
            confidence: 0.0,
        }
    }
}

#[inline]
fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Pure fingerprint → classification mapping
#[derive(Debug, Clone, Default)]
pub struct RecordingClassifier {
    config: ClassifierConfig,
}

impl RecordingClassifier {
    pub fn new(config: ClassifierConfig) -> MasterResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Unnormalized evidence per type, each in `(0, 1)`
    pub fn evidence(&self, fp: &Fingerprint) -> [f64; 4] {
        let c = &self.config;
        let lufs = fp.get(Dimension::Lufs);
        let crest = fp.get(Dimension::CrestDb);

        let war = logistic((lufs - c.war_lufs) / c.war_lufs_slope)
            * logistic((c.war_crest_db - crest) / c.war_crest_slope);
        let vintage = logistic((c.vintage_air - fp.get(Dimension::AirPct)) / c.vintage_air_slope)
            * logistic((c.vintage_lufs - lufs) / c.vintage_lufs_slope);
        let low_end = fp.get(Dimension::SubBassPct) + fp.get(Dimension::BassPct);
        let electronic = logistic((fp.get(Dimension::RhythmStability) - c.electronic_rhythm) / c.electronic_rhythm_slope)
            * logistic((low_end - c.electronic_low_end) / c.electronic_low_end_slope);

        [war, vintage, electronic, c.contemporary_prior]
    }

    pub fn classify(&self, fp: &Fingerprint) -> RecordingClassification {
        let evidence = self.evidence(fp);
        let total: f64 = evidence.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return RecordingClassification::uncertain();
        }

        let weights = evidence.map(|e| e / total);
        let (dominant, w_max) = RecordingType::ALL
            .iter()
            .zip(weights)
            .fold((RecordingType::Contemporary, f64::MIN), |best, (&kind, w)| {
                if w > best.1 { (kind, w) } else { best }
            });

        let even = 1.0 / weights.len() as f64;
        let confidence = ((w_max - even) / (1.0 - even)).clamp(0.0, 1.0);

        log::debug!("Classified as {} (confidence {:.2}, weights {:?})", dominant, confidence, weights);
        RecordingClassification {
            weights,
            dominant,
            confidence,
        }
    }
}
