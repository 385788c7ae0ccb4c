//! Loudness boost and peak normalization

use mp_core::AudioBuffer;
use mp_core::loudness::{LOUDNESS_FLOOR_LUFS, integrated_loudness};
use mp_core::numeric::{db_to_linear, linear_to_db};

use crate::error::{MasterError, MasterResult};
use crate::pipeline::Stage;

/// Largest gain the loudness stage applies in either direction (dB)
pub const MAX_BOOST_DB: f64 = 18.0;

/// Accepted peak normalization targets (dBFS)
pub const PEAK_TARGET_RANGE: (f64, f64) = (-20.0, 0.0);

/// Check a peak target, logging and rejecting anything outside
/// [`PEAK_TARGET_RANGE`]
pub fn check_peak_target(target_peak_db: f64) -> MasterResult<()> {
    let (min, max) = PEAK_TARGET_RANGE;
    if target_peak_db.is_finite() && (min..=max).contains(&target_peak_db) {
        return Ok(());
    }
    let reason = format!("peak target {target_peak_db} dBFS outside [{min}, {max}]");
    log::error!("{}: {}", Stage::PeakNormalize, reason);
    Err(MasterError::StageParameter {
        stage: Stage::PeakNormalize,
        reason,
    })
}

/// Gain toward an integrated loudness target, measured with the same
/// BS.1770 meter the fingerprint uses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessBoost {
    target_lufs: f64,
    max_boost_db: f64,
}

impl LoudnessBoost {
    pub fn new(target_lufs: f64) -> Self {
        Self {
            target_lufs,
            max_boost_db: MAX_BOOST_DB,
        }
    }

    pub fn with_max_boost(mut self, db: f64) -> Self {
        self.max_boost_db = db.abs();
        self
    }

    pub fn target_lufs(&self) -> f64 {
        self.target_lufs
    }

    /// Gain that would be applied to `buffer` (dB); zero for silence
    pub fn gain_for(&self, buffer: &AudioBuffer) -> f64 {
        let measured = integrated_loudness(buffer);
        if measured <= LOUDNESS_FLOOR_LUFS {
            log::debug!("Loudness boost skipped: input reads as silence");
            return 0.0;
        }
        let wanted = self.target_lufs - measured;
        let gain = wanted.clamp(-self.max_boost_db, self.max_boost_db);
        if gain != wanted {
            log::warn!(
                "Loudness boost clamped from {:+.1} dB to {:+.1} dB (measured {:.1} LUFS, target {:.1} LUFS)",
                wanted,
                gain,
                measured,
                self.target_lufs
            );
        }
        gain
    }

    /// Apply the gain; returns it in dB
    pub fn process(&self, buffer: &mut AudioBuffer) -> f64 {
        let gain_db = self.gain_for(buffer);
        if gain_db != 0.0 {
            let gain = db_to_linear(gain_db) as f32;
            buffer.map_samples(|s| s * gain);
        }
        gain_db
    }
}

/// Attenuates the whole buffer so its peak sits at the target.
///
/// Only ever turns down; material already below the target passes through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakNormalizer {
    target_peak_db: f64,
}

impl PeakNormalizer {
    /// The target comes from the parameters of the profile being rendered;
    /// there is no default target.
    pub fn new(target_peak_db: f64) -> MasterResult<Self> {
        check_peak_target(target_peak_db)?;
        Ok(Self { target_peak_db })
    }

    pub fn target_peak_db(&self) -> f64 {
        self.target_peak_db
    }

    /// Gain that would be applied to a buffer with this peak (dB, <= 0)
    pub fn gain_for_peak(&self, peak: f32) -> f64 {
        let peak_db = linear_to_db(peak as f64);
        (self.target_peak_db - peak_db).min(0.0)
    }

    /// Apply the attenuation; returns it in dB
    pub fn process(&self, buffer: &mut AudioBuffer) -> f64 {
        let gain_db = self.gain_for_peak(buffer.peak());
        if gain_db < 0.0 {
            let gain = db_to_linear(gain_db) as f32;
            buffer.map_samples(|s| s * gain);
        }
        gain_db
    }
}
