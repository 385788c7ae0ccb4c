//! Error types for fingerprint analysis

use mp_core::CoreError;
use thiserror::Error;

use crate::dimension::Dimension;

/// Fingerprint error type
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Invalid input: {0}")]
    Input(#[from] CoreError),

    #[error("Dimension {dimension} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        dimension: Dimension,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Dimension {0} is not finite")]
    NonFinite(Dimension),

    #[error("Missing dimension: {0}")]
    MissingDimension(Dimension),

    #[error("Confidence for {dimension} must be in [0, 1], got {value}")]
    InvalidConfidence { dimension: Dimension, value: f64 },

    #[error("Stream format mismatch: {0}")]
    StreamMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type FingerprintResult<T> = Result<T, FingerprintError>;

/// Check one dimension value against its range
pub(crate) fn check_value(dimension: Dimension, value: f64) -> FingerprintResult<()> {
    if !value.is_finite() {
        return Err(FingerprintError::NonFinite(dimension));
    }
    if !dimension.contains(value) {
        let (min, max) = dimension.range();
        return Err(FingerprintError::OutOfRange {
            dimension,
            value,
            min,
            max,
        });
    }
    Ok(())
}
