//! # mp-master
//!
//! Fingerprint-driven adaptive mastering.
//!
//! ## Features
//!
//! - **Recording classification**: loudness-war, vintage-analog,
//!   electronic-deterministic or contemporary, with a continuous confidence
//! - **Continuous parameter mapping**: closed-form loudness, EQ, dynamics
//!   and width settings from the fingerprint and a recording profile
//! - **Fixed processing pipeline**: EQ → dynamics → width → loudness boost →
//!   peak normalize → safety limit, with per-stage diagnostics
//! - **Profiles**: `adaptive`, `gentle` and `punchy`, each with its own
//!   loudness and peak targets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mp_master::MasteringEngine;
//!
//! let engine = MasteringEngine::new();
//! let result = engine.master_with_profile(&buffer, "adaptive")?;
//! println!("RMS change: {:+.1} dB", result.report.rms_change_db().unwrap_or(0.0));
//! ```

pub mod chain;
pub mod classify;
pub mod dynamics;
pub mod eq;
pub mod error;
pub mod limiter;
pub mod loudness;
pub mod mapper;
pub mod params;
pub mod pipeline;
pub mod profile;
pub mod stereo;

pub use chain::{MasteringEngine, MasteringResult};
pub use classify::{ClassifierConfig, RecordingClassification, RecordingClassifier, RecordingType};
pub use error::{MasterError, MasterResult};
pub use limiter::{SAFETY_CEILING_DB, SafetyLimiter};
pub use loudness::{LoudnessBoost, PeakNormalizer};
pub use mapper::{ContinuousParameterMapper, MapperConfig};
pub use params::{DynamicsParameters, EQ_BANDS, EQ_CENTERS_HZ, MasteringParameters};
pub use pipeline::{AdaptiveProcessingPipeline, PipelineReport, PipelineState, Stage, StageReport};
pub use profile::{ProfileDefaults, RecordingProfile};
