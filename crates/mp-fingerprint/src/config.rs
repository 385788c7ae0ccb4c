//! Analysis configuration

use serde::{Deserialize, Serialize};

use crate::error::{FingerprintError, FingerprintResult};

/// Frame sizes, thresholds and execution options shared by all analyzers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Spectral FFT window size (power of 2)
    pub fft_size: usize,

    /// Spectral hop size
    pub hop_size: usize,

    /// Onset-envelope frame size
    pub onset_frame_size: usize,

    /// Onset-envelope hop size
    pub onset_hop_size: usize,

    /// Harmonic analysis frame size (power of 2)
    pub harmonic_frame_size: usize,

    /// Distance between harmonic analysis frames
    pub harmonic_hop_size: usize,

    /// Loudness / crest block length in milliseconds
    pub block_ms: f64,

    /// Frames and blocks below this RMS level count as silent (dBFS)
    pub silence_threshold_db: f64,

    /// Energy fraction that defines the spectral rolloff
    pub rolloff_fraction: f64,

    /// Length of the onset history used for tempo estimation while streaming
    pub rhythm_window_secs: f64,

    /// Run the five analyzers on the rayon pool
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            hop_size: 1024,
            onset_frame_size: 1024,
            onset_hop_size: 512,
            harmonic_frame_size: 2048,
            harmonic_hop_size: 4096,
            block_ms: 400.0,
            silence_threshold_db: -60.0,
            rolloff_fraction: 0.85,
            rhythm_window_secs: 6.0,
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    /// Coarser framing for quick previews
    pub fn fast() -> Self {
        Self {
            fft_size: 1024,
            hop_size: 1024,
            harmonic_hop_size: 8192,
            ..Default::default()
        }
    }

    /// Single-threaded execution, identical results
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> FingerprintResult<()> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 64 {
            return Err(FingerprintError::Config(format!(
                "FFT size must be a power of 2 >= 64, got {}",
                self.fft_size
            )));
        }
        if !self.harmonic_frame_size.is_power_of_two() || self.harmonic_frame_size < 64 {
            return Err(FingerprintError::Config(format!(
                "Harmonic frame size must be a power of 2 >= 64, got {}",
                self.harmonic_frame_size
            )));
        }
        if self.hop_size == 0 || self.onset_hop_size == 0 || self.harmonic_hop_size == 0 {
            return Err(FingerprintError::Config("Hop sizes must be non-zero".into()));
        }
        if self.onset_frame_size < 2 {
            return Err(FingerprintError::Config(format!(
                "Onset frame size too small: {}",
                self.onset_frame_size
            )));
        }
        if !(self.block_ms.is_finite() && self.block_ms > 0.0) {
            return Err(FingerprintError::Config(format!(
                "Block length must be positive, got {} ms",
                self.block_ms
            )));
        }
        if !(self.rolloff_fraction > 0.0 && self.rolloff_fraction < 1.0) {
            return Err(FingerprintError::Config(format!(
                "Rolloff fraction must be in (0, 1), got {}",
                self.rolloff_fraction
            )));
        }
        if !(self.rhythm_window_secs.is_finite() && self.rhythm_window_secs >= 1.0) {
            return Err(FingerprintError::Config(format!(
                "Rhythm window must be at least 1 s, got {}",
                self.rhythm_window_secs
            )));
        }
        if !self.silence_threshold_db.is_finite() {
            return Err(FingerprintError::Config("Silence threshold must be finite".into()));
        }
        Ok(())
    }

    /// Block length in samples at `sample_rate`
    pub fn block_samples(&self, sample_rate: u32) -> usize {
        ((self.block_ms / 1000.0 * sample_rate as f64).round() as usize).max(1)
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
