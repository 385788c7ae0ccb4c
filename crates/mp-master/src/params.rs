//! Mastering parameters handed from the mapper to the pipeline

use serde::{Deserialize, Serialize};

use crate::error::{MasterError, MasterResult};
use crate::loudness::check_peak_target;
use crate::pipeline::Stage;
use crate::profile::RecordingProfile;

/// Number of EQ bands, one per fingerprint band
pub const EQ_BANDS: usize = 7;

/// EQ band centers (Hz): low shelf, five bells, high shelf
pub const EQ_CENTERS_HZ: [f64; EQ_BANDS] = [40.0, 120.0, 350.0, 1000.0, 3000.0, 5000.0, 10000.0];

/// Largest per-band EQ gain the pipeline accepts (dB)
pub const MAX_EQ_GAIN_DB: f64 = 12.0;

/// Accepted stereo width factor range
pub const WIDTH_RANGE: (f64, f64) = (0.0, 2.0);

/// Compressor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsParameters {
    /// Compression ratio; 1.0 bypasses the compressor
    pub ratio: f64,
    /// Threshold above the measured RMS level (dB)
    pub threshold_offset_db: f64,
    pub knee_db: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
}

impl DynamicsParameters {
    /// Settings that leave the signal untouched
    pub fn bypass() -> Self {
        Self {
            ratio: 1.0,
            threshold_offset_db: 0.0,
            knee_db: 6.0,
            attack_ms: 10.0,
            release_ms: 150.0,
        }
    }

    #[inline]
    pub fn is_bypass(&self) -> bool {
        self.ratio <= 1.001
    }
}

/// Everything one render of one profile needs.
///
/// There is no `Default`: the peak target in particular must come from the
/// profile being rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteringParameters {
    pub profile: RecordingProfile,
    /// Loudness the boost stage aims for (LUFS)
    pub target_lufs: f64,
    /// Peak normalization target (dBFS)
    pub target_peak_db: f64,
    /// Gain per band at [`EQ_CENTERS_HZ`]
    pub eq_gains_db: [f64; EQ_BANDS],
    /// Side gain factor; 1.0 leaves the image alone
    pub stereo_width: f64,
    pub dynamics: DynamicsParameters,
    /// Crest factor the compressor aims for (dB)
    pub target_crest_db: f64,
    /// Confidence of the recording classification behind these settings
    pub classification_confidence: f64,
}

impl MasteringParameters {
    /// Check every value against the range its stage accepts.
    ///
    /// Errors name the stage that would have rejected the value.
    pub fn validate(&self) -> MasterResult<()> {
        let reject = |stage: Stage, reason: String| -> MasterResult<()> {
            log::error!("Rejecting {} parameters for {}: {}", self.profile, stage, reason);
            Err(MasterError::StageParameter { stage, reason })
        };

        for (i, &gain) in self.eq_gains_db.iter().enumerate() {
            if !gain.is_finite() || gain.abs() > MAX_EQ_GAIN_DB {
                return reject(Stage::Eq, format!("band {i} gain {gain} dB outside ±{MAX_EQ_GAIN_DB} dB"));
            }
        }

        let d = &self.dynamics;
        if !(d.ratio.is_finite() && (1.0..=20.0).contains(&d.ratio)) {
            return reject(Stage::Dynamics, format!("ratio {} outside [1, 20]", d.ratio));
        }
        if !(d.attack_ms.is_finite() && d.attack_ms > 0.0 && d.release_ms.is_finite() && d.release_ms > 0.0) {
            return reject(
                Stage::Dynamics,
                format!("attack {} ms / release {} ms must be positive", d.attack_ms, d.release_ms),
            );
        }
        if !(d.knee_db.is_finite() && d.knee_db >= 0.0 && d.threshold_offset_db.is_finite()) {
            return reject(
                Stage::Dynamics,
                format!("knee {} dB / threshold offset {} dB", d.knee_db, d.threshold_offset_db),
            );
        }

        let (min_w, max_w) = WIDTH_RANGE;
        if !(self.stereo_width.is_finite() && (min_w..=max_w).contains(&self.stereo_width)) {
            return reject(
                Stage::StereoWidth,
                format!("width {} outside [{min_w}, {max_w}]", self.stereo_width),
            );
        }

        if !(self.target_lufs.is_finite() && (-70.0..=0.0).contains(&self.target_lufs)) {
            return reject(
                Stage::LoudnessBoost,
                format!("target {} LUFS outside [-70, 0]", self.target_lufs),
            );
        }

        check_peak_target(self.target_peak_db)?;

        if !(0.0..=1.0).contains(&self.classification_confidence) {
            return Err(MasterError::InvalidParameter(format!(
                "classification confidence {} outside [0, 1]",
                self.classification_confidence
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> MasterResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> MasterResult<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }
}
