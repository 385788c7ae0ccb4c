//! Recording profiles: the user-facing preset selector

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MasterError;
use crate::params::EQ_BANDS;

/// Preset selector for a render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingProfile {
    /// Follow the fingerprint with neutral tonal intent
    #[default]
    Adaptive,
    /// Quieter, softer top end, lighter compression
    Gentle,
    /// Louder, fuller low end, firmer compression
    Punchy,
}

impl RecordingProfile {
    pub const ALL: [RecordingProfile; 3] = [
        RecordingProfile::Adaptive,
        RecordingProfile::Gentle,
        RecordingProfile::Punchy,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            RecordingProfile::Adaptive => "adaptive",
            RecordingProfile::Gentle => "gentle",
            RecordingProfile::Punchy => "punchy",
        }
    }

    /// Base loudness target (LUFS)
    pub fn target_lufs(&self) -> f64 {
        match self {
            RecordingProfile::Adaptive => -8.0,
            RecordingProfile::Gentle => -10.0,
            RecordingProfile::Punchy => -7.0,
        }
    }

    /// Peak normalization target (dBFS)
    pub fn target_peak_db(&self) -> f64 {
        match self {
            RecordingProfile::Adaptive => -1.0,
            RecordingProfile::Gentle => -1.5,
            RecordingProfile::Punchy => -0.5,
        }
    }

    /// Everything the mapper takes from the profile
    pub fn defaults(&self) -> ProfileDefaults {
        match self {
            RecordingProfile::Adaptive => ProfileDefaults {
                target_lufs: self.target_lufs(),
                target_peak_db: self.target_peak_db(),
                eq_curve_db: [0.0; EQ_BANDS],
                width_bias: 0.0,
                ratio_scale: 1.0,
                max_boost_db: 8.0,
            },
            RecordingProfile::Gentle => ProfileDefaults {
                target_lufs: self.target_lufs(),
                target_peak_db: self.target_peak_db(),
                eq_curve_db: [0.0, 0.0, -0.3, 0.0, 0.0, 0.3, 0.5],
                width_bias: -0.05,
                ratio_scale: 0.6,
                max_boost_db: 6.0,
            },
            RecordingProfile::Punchy => ProfileDefaults {
                target_lufs: self.target_lufs(),
                target_peak_db: self.target_peak_db(),
                eq_curve_db: [1.0, 1.5, -0.5, 0.0, 0.5, 1.0, 0.5],
                width_bias: 0.05,
                ratio_scale: 1.4,
                max_boost_db: 10.0,
            },
        }
    }
}

impl fmt::Display for RecordingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordingProfile {
    type Err = MasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MasterError::UnknownProfile(s.to_string()))
    }
}

/// Profile-level intent fed to the parameter mapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDefaults {
    /// Loudness the profile aims for before energy weighting
    pub target_lufs: f64,
    /// Peak normalization target (dBFS)
    pub target_peak_db: f64,
    /// Tonal offsets added to the per-band corrections
    pub eq_curve_db: [f64; EQ_BANDS],
    /// Added to the target stereo width
    pub width_bias: f64,
    /// Multiplies the compression ratio excess over 1:1
    pub ratio_scale: f64,
    /// Upper bound on the loudness boost
    pub max_boost_db: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("adaptive".parse::<RecordingProfile>().unwrap(), RecordingProfile::Adaptive);
        assert_eq!("GENTLE".parse::<RecordingProfile>().unwrap(), RecordingProfile::Gentle);
        assert_eq!(" Punchy ".parse::<RecordingProfile>().unwrap(), RecordingProfile::Punchy);
        assert!(matches!(
            "loud".parse::<RecordingProfile>(),
            Err(MasterError::UnknownProfile(name)) if name == "loud"
        ));
    }

    #[test]
    fn test_profiles_are_separated() {
        for (i, a) in RecordingProfile::ALL.iter().enumerate() {
            for b in &RecordingProfile::ALL[i + 1..] {
                assert!((a.target_peak_db() - b.target_peak_db()).abs() >= 0.5, "{a} vs {b}");
                assert!((a.target_lufs() - b.target_lufs()).abs() >= 0.5, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_gentle_is_quieter_than_adaptive() {
        let gentle = RecordingProfile::Gentle.defaults();
        let adaptive = RecordingProfile::Adaptive.defaults();
        assert!(gentle.target_lufs < adaptive.target_lufs);
        assert!(gentle.max_boost_db <= adaptive.max_boost_db);
        assert!(gentle.ratio_scale < adaptive.ratio_scale);
    }

    #[test]
    fn test_display_round_trips() {
        for profile in RecordingProfile::ALL {
            assert_eq!(profile.to_string().parse::<RecordingProfile>().unwrap(), profile);
        }
    }
}
