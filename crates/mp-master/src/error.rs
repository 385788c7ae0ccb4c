//! Error types for the mastering engine

use mp_core::CoreError;
use mp_fingerprint::FingerprintError;
use thiserror::Error;

use crate::pipeline::Stage;

/// Mastering error type
#[derive(Error, Debug)]
pub enum MasterError {
    /// Empty buffer, bad sample rate or channel layout
    #[error("Invalid input: {0}")]
    Input(#[from] CoreError),

    /// Fingerprint extraction failed
    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// Profile selector did not name a known profile
    #[error("Unknown recording profile: {0:?}")]
    UnknownProfile(String),

    /// A processing stage was handed a parameter outside its accepted range
    #[error("Stage {stage} rejected its parameter: {reason}")]
    StageParameter {
        /// Stage that refused to run
        stage: Stage,
        /// Why the parameter was rejected
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Parameter (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for mastering operations
pub type MasterResult<T> = Result<T, MasterError>;
