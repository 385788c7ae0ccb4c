//! # mp-fingerprint
//!
//! 25-dimension audio fingerprints for adaptive mastering.
//!
//! ## Features
//!
//! - **Batch analysis**: five independent analyzers (spectral, temporal,
//!   harmonic, variation, stereo) fanned out on rayon and merged into a
//!   range-checked [`Fingerprint`]
//! - **Graceful degradation**: an analyzer that cannot measure its input
//!   substitutes documented defaults instead of failing the fingerprint
//! - **Streaming**: [`StreamingFingerprintEngine`] estimates a 13-dimension
//!   subset chunk by chunk in bounded memory, with per-dimension confidence
//! - **Cache**: [`FingerprintCache`] keeps streaming snapshots and batch
//!   results per content key, validating one against the other
//! - **Query strategy**: [`QueryOptimizer`] decides between serving the
//!   cache and running batch analysis
//!
//! ## Example
//!
//! ```rust,ignore
//! use mp_core::AudioBuffer;
//! use mp_fingerprint::{Dimension, FingerprintAssembler};
//!
//! let buffer = AudioBuffer::from_interleaved(&pcm, 2, 44100)?;
//! let fingerprint = FingerprintAssembler::default().analyze(&buffer)?;
//! println!("{:.1} LUFS", fingerprint.get(Dimension::Lufs));
//! ```

pub mod analyzers;
pub mod assembler;
pub mod cache;
pub mod config;
pub mod dimension;
pub mod error;
pub mod fingerprint;
pub mod framing;
pub mod optimizer;
pub mod stats;
pub mod stft;
pub mod streaming;
pub mod validator;

pub use analyzers::{AnalyzerKind, AnalyzerOutput, Degradation, FeatureAnalyzer};
pub use assembler::{AssemblyReport, FingerprintAssembler};
pub use cache::{
    CacheConfig, CacheLookup, CacheStats, CachedFingerprint, Clock, ContentKey, FingerprintCache, ManualClock,
    SystemClock, ValidationState,
};
pub use config::AnalysisConfig;
pub use dimension::{Dimension, FINGERPRINT_DIMENSIONS};
pub use error::{FingerprintError, FingerprintResult};
pub use fingerprint::{Features, Fingerprint};
pub use optimizer::{select_strategy, QueryOptimizer, QueryResponse, QueryStats, QueryStrategy, StrategyThresholds};
pub use streaming::{StreamingFingerprint, StreamingFingerprintEngine, STREAMING_DIMENSIONS, STREAMING_DIMENSION_COUNT};
pub use validator::{ConfidenceLevel, StreamingValidator, ValidationConfig, ValidationResult};
