//! Streaming vs batch fingerprint validation

use mp_core::numeric::{self, EPSILON};
use serde::{Deserialize, Serialize};

use crate::dimension::Dimension;
use crate::error::{FingerprintError, FingerprintResult};
use crate::fingerprint::{Features, Fingerprint};
use crate::streaming::StreamingFingerprint;

/// How far a streaming estimate can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Thresholds for validity and confidence classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Cosine similarity required for `is_valid`
    pub valid_similarity: f64,
    /// Mean dimension accuracy required for `is_valid`
    pub min_valid_accuracy: f64,
    pub high_similarity: f64,
    pub high_accuracy: f64,
    pub medium_similarity: f64,
    pub medium_accuracy: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            valid_similarity: 0.95,
            min_valid_accuracy: 0.75,
            high_similarity: 0.97,
            high_accuracy: 0.90,
            medium_similarity: 0.85,
            medium_accuracy: 0.75,
        }
    }
}

impl ValidationConfig {
    /// Tighter thresholds for callers that act on streaming results
    pub fn strict() -> Self {
        Self {
            valid_similarity: 0.98,
            min_valid_accuracy: 0.85,
            high_similarity: 0.99,
            high_accuracy: 0.95,
            medium_similarity: 0.93,
            medium_accuracy: 0.85,
        }
    }

    /// Looser thresholds for previews
    pub fn lenient() -> Self {
        Self {
            valid_similarity: 0.90,
            min_valid_accuracy: 0.65,
            high_similarity: 0.95,
            high_accuracy: 0.85,
            medium_similarity: 0.80,
            medium_accuracy: 0.65,
        }
    }

    pub fn validate(&self) -> FingerprintResult<()> {
        let thresholds = [
            ("valid_similarity", self.valid_similarity),
            ("min_valid_accuracy", self.min_valid_accuracy),
            ("high_similarity", self.high_similarity),
            ("high_accuracy", self.high_accuracy),
            ("medium_similarity", self.medium_similarity),
            ("medium_accuracy", self.medium_accuracy),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(FingerprintError::Config(format!("{name} must be in [0, 1], got {value}")));
            }
        }
        if self.medium_similarity > self.high_similarity || self.medium_accuracy > self.high_accuracy {
            return Err(FingerprintError::Config(
                "Medium thresholds must not exceed high thresholds".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> FingerprintResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> FingerprintResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Outcome of comparing one streaming fingerprint against one batch
/// fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Cosine similarity of the range-normalized shared dimensions, `[0, 1]`
    pub cosine_similarity: f64,
    /// Accuracy in `[0, 1]` per shared dimension
    pub dimension_accuracy: Features,
    pub mean_accuracy: f64,
    pub confidence_level: ConfidenceLevel,
    pub is_valid: bool,
}

impl ValidationResult {
    /// Dimensions whose accuracy is below `threshold`, worst first
    pub fn weakest_dimensions(&self, threshold: f64) -> Vec<(Dimension, f64)> {
        let mut weak: Vec<(Dimension, f64)> = self
            .dimension_accuracy
            .iter()
            .filter(|&(_, &a)| a < threshold)
            .map(|(&d, &a)| (d, a))
            .collect();
        weak.sort_by(|a, b| a.1.total_cmp(&b.1));
        weak
    }
}

/// Accuracy of `estimate` against `reference` for one dimension.
///
/// Physical-unit dimensions (tempo, loudness, crest) use relative error;
/// everything else uses error as a fraction of the dimension's range.
pub fn dimension_accuracy(dim: Dimension, estimate: f64, reference: f64) -> f64 {
    let diff = (estimate - reference).abs();
    let error = if dim.is_wide_range() {
        let fallback = if diff < EPSILON { 0.0 } else { 1.0 };
        numeric::safe_divide(diff, reference.abs(), fallback)
    } else {
        let (min, max) = dim.range();
        numeric::safe_divide(diff, max - min, 1.0)
    };
    (1.0 - error.min(1.0)).clamp(0.0, 1.0)
}

/// Checks streaming fingerprints against their batch counterparts
#[derive(Debug, Clone, Default)]
pub struct StreamingValidator {
    config: ValidationConfig,
}

impl StreamingValidator {
    pub fn new(config: ValidationConfig) -> FingerprintResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate(&self, streaming: &StreamingFingerprint, batch: &Fingerprint) -> ValidationResult {
        let mut dot = 0.0;
        let mut norm_s = 0.0;
        let mut norm_b = 0.0;
        let mut accuracy = Features::new();

        for (dim, value, _) in streaming.iter() {
            let reference = batch.get(dim);
            let a = dim.normalize(value);
            let b = dim.normalize(reference);
            dot += a * b;
            norm_s += a * a;
            norm_b += b * b;
            accuracy.insert(dim, dimension_accuracy(dim, value, reference));
        }

        let cosine_similarity = if norm_s < EPSILON && norm_b < EPSILON {
            1.0
        } else {
            numeric::safe_divide(dot, (norm_s * norm_b).sqrt(), 0.0).clamp(0.0, 1.0)
        };
        let mean_accuracy = numeric::mean(&accuracy.values().copied().collect::<Vec<_>>()).unwrap_or(0.0);

        let c = &self.config;
        let confidence_level = if cosine_similarity >= c.high_similarity && mean_accuracy >= c.high_accuracy {
            ConfidenceLevel::High
        } else if cosine_similarity >= c.medium_similarity && mean_accuracy >= c.medium_accuracy {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };
        let is_valid = cosine_similarity >= c.valid_similarity && mean_accuracy >= c.min_valid_accuracy;

        if !is_valid {
            log::debug!(
                "Streaming fingerprint rejected: similarity {:.3}, mean accuracy {:.3}",
                cosine_similarity,
                mean_accuracy
            );
        }

        ValidationResult {
            cosine_similarity,
            dimension_accuracy: accuracy,
            mean_accuracy,
            confidence_level,
            is_valid,
        }
    }
}
