//! Continuous fingerprint → parameter mapping
//!
//! Closed-form relationships, no lookup tables:
//!
//! - **Energy-aware loudness**: the boost toward the profile target is scaled
//!   down for quiet material instead of applied as a fixed offset
//! - **Bass/mid preservation**: the expected bass share grows with the
//!   loudness target, so louder renders keep their weight in the low end
//! - **Crest target**: pulled down with loudness for loudness-war material,
//!   left near the measured crest for dynamic material
//! - **Band EQ**: gentle correction of each band toward a reference share
//! - **Width**: narrow images widened, wide ones narrowed, out-of-phase
//!   material never widened
//!
//! When the recording classification is unsure, the tonal and dynamic
//! corrections shrink toward no change. The mapping is pure.

use mp_fingerprint::{Dimension, Fingerprint};
use serde::{Deserialize, Serialize};

use crate::classify::{RecordingClassification, RecordingClassifier, RecordingType};
use crate::error::{MasterError, MasterResult};
use crate::params::{DynamicsParameters, EQ_BANDS, MasteringParameters};
use crate::profile::RecordingProfile;

/// Fingerprint dimension measured by each EQ band
pub const EQ_BAND_DIMENSIONS: [Dimension; EQ_BANDS] = [
    Dimension::SubBassPct,
    Dimension::BassPct,
    Dimension::LowMidPct,
    Dimension::MidPct,
    Dimension::UpperMidPct,
    Dimension::PresencePct,
    Dimension::AirPct,
];

/// Constants of the closed-form mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Loudness at or below which the boost weight bottoms out (LUFS)
    pub loudness_floor: f64,
    /// Loudness at or above which the full boost applies (LUFS)
    pub loudness_knee: f64,
    /// Smallest boost weight
    pub min_boost_weight: f64,
    /// Largest cut toward the target (dB, negative)
    pub max_cut_db: f64,

    /// Expected bass/(bass+mid) at -14 LUFS
    pub bass_share_base: f64,
    /// Expected bass share change per LU of target loudness
    pub bass_share_slope: f64,
    pub bass_gain_scale: f64,
    pub max_bass_gain_db: f64,

    /// Reference energy share per band
    pub reference_shares: [f64; EQ_BANDS],
    pub band_gain_scale: f64,
    pub max_band_gain_db: f64,
    /// Share (as a fraction of the reference) below which a band counts as absent
    pub presence_fraction: f64,

    /// Loudness-war crest at -14 LUFS (dB)
    pub war_crest_db: f64,
    /// Crest reduction per LU above -14 LUFS for loudness-war material
    pub war_crest_slope: f64,
    /// Lowest crest target (dB)
    pub min_crest_db: f64,
    pub ratio_gain: f64,
    pub max_ratio: f64,

    /// Stereo width the mapper steers toward
    pub target_width: f64,
    pub width_range: (f64, f64),

    /// Classification confidence below which corrections shrink
    pub min_confidence: f64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            loudness_floor: -45.0,
            loudness_knee: -20.0,
            min_boost_weight: 0.35,
            max_cut_db: -2.0,
            bass_share_base: 0.45,
            bass_share_slope: 0.01,
            bass_gain_scale: 0.5,
            max_bass_gain_db: 3.0,
            reference_shares: [0.05, 0.20, 0.15, 0.28, 0.14, 0.08, 0.10],
            band_gain_scale: 0.35,
            max_band_gain_db: 3.0,
            presence_fraction: 0.25,
            war_crest_db: 8.0,
            war_crest_slope: 0.5,
            min_crest_db: 3.0,
            ratio_gain: 3.0,
            max_ratio: 4.0,
            target_width: 0.3,
            width_range: (0.7, 1.4),
            min_confidence: 0.45,
        }
    }
}

impl MapperConfig {
    pub fn validate(&self) -> MasterResult<()> {
        let fail = |msg: String| Err(MasterError::InvalidParameter(msg));
        if self.loudness_knee <= self.loudness_floor {
            return fail(format!(
                "loudness knee {} must exceed floor {}",
                self.loudness_knee, self.loudness_floor
            ));
        }
        if !(0.0..=1.0).contains(&self.min_boost_weight) {
            return fail(format!("min_boost_weight {} outside [0, 1]", self.min_boost_weight));
        }
        if self.reference_shares.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return fail("reference shares must be positive".into());
        }
        let (lo, hi) = self.width_range;
        if !(0.0 < lo && lo <= 1.0 && 1.0 <= hi) {
            return fail(format!("width range ({lo}, {hi}) must bracket 1.0"));
        }
        if !(self.min_confidence > 0.0 && self.min_confidence <= 1.0) {
            return fail(format!("min_confidence {} outside (0, 1]", self.min_confidence));
        }
        if self.max_ratio < 1.0 || self.min_crest_db <= 0.0 {
            return fail("max_ratio must be >= 1 and min_crest_db positive".into());
        }
        Ok(())
    }

    /// Fraction of the gap to the target that gets applied, rising from
    /// `min_boost_weight` at the floor to 1 at the knee
    pub fn boost_weight(&self, lufs: f64) -> f64 {
        let w = (lufs - self.loudness_floor) / (self.loudness_knee - self.loudness_floor);
        w.clamp(self.min_boost_weight, 1.0)
    }

    /// Expected bass/(bass+mid) share for a loudness target
    pub fn expected_bass_share(&self, target_lufs: f64) -> f64 {
        (self.bass_share_base + self.bass_share_slope * (target_lufs + 14.0)).clamp(0.05, 0.95)
    }
}

/// Fingerprint + profile → [`MasteringParameters`]
#[derive(Debug, Clone, Default)]
pub struct ContinuousParameterMapper {
    config: MapperConfig,
    classifier: RecordingClassifier,
}

impl ContinuousParameterMapper {
    pub fn new(config: MapperConfig, classifier: RecordingClassifier) -> MasterResult<Self> {
        config.validate()?;
        Ok(Self { config, classifier })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn classifier(&self) -> &RecordingClassifier {
        &self.classifier
    }

    /// Classify, then map
    pub fn map(&self, fp: &Fingerprint, profile: RecordingProfile) -> MasteringParameters {
        let classification = self.classifier.classify(fp);
        self.map_classified(fp, &classification, profile)
    }

    pub fn map_classified(
        &self,
        fp: &Fingerprint,
        classification: &RecordingClassification,
        profile: RecordingProfile,
    ) -> MasteringParameters {
        let cfg = &self.config;
        let defaults = profile.defaults();
        let lufs = fp.get(Dimension::Lufs);
        let crest = fp.get(Dimension::CrestDb);

        // Loudness
        let boost = ((defaults.target_lufs - lufs) * cfg.boost_weight(lufs)).clamp(cfg.max_cut_db, defaults.max_boost_db);
        let target_lufs = (lufs + boost).clamp(-70.0, 0.0);

        // Shrink corrections when the classification is unsure
        let certainty = (classification.confidence / cfg.min_confidence).clamp(0.0, 1.0);

        // Tone
        let corrections = self.band_corrections(fp, target_lufs);
        let mut eq_gains_db = [0.0; EQ_BANDS];
        for (gain, (correction, offset)) in eq_gains_db
            .iter_mut()
            .zip(corrections.iter().zip(defaults.eq_curve_db))
        {
            *gain = correction * certainty + offset;
        }

        // Dynamics
        let w_war = classification.weight(RecordingType::LoudnessWar);
        let target_crest_db = self.crest_target(lufs, crest, w_war);
        let raw_ratio = 1.0 + cfg.ratio_gain * (crest - target_crest_db).max(0.0) / crest.max(cfg.min_crest_db);
        let ratio = (1.0 + (raw_ratio - 1.0) * defaults.ratio_scale * certainty).clamp(1.0, cfg.max_ratio);
        let dynamics = DynamicsParameters {
            ratio,
            threshold_offset_db: target_crest_db,
            knee_db: 6.0,
            attack_ms: 5.0 + 20.0 * (1.0 - fp.get(Dimension::TransientDensity)),
            release_ms: 80.0 + 220.0 * fp.get(Dimension::LoudnessVariation),
        };

        // Stereo
        let width = self.width_factor(fp, defaults.width_bias);
        let stereo_width = 1.0 + (width - 1.0) * certainty;

        log::debug!(
            "Mapped {} ({}, confidence {:.2}): {:.1} -> {:.1} LUFS, ratio {:.2}, width {:.2}",
            profile,
            classification.dominant,
            classification.confidence,
            lufs,
            target_lufs,
            ratio,
            stereo_width
        );

        MasteringParameters {
            profile,
            target_lufs,
            target_peak_db: defaults.target_peak_db,
            eq_gains_db,
            stereo_width,
            dynamics,
            target_crest_db,
            classification_confidence: classification.confidence,
        }
    }

    /// Fingerprint-driven EQ correction per band, before the profile curve
    pub fn band_corrections(&self, fp: &Fingerprint, target_lufs: f64) -> [f64; EQ_BANDS] {
        let cfg = &self.config;
        let mut gains = [0.0; EQ_BANDS];
        let presence = |band: usize| {
            let share = fp.get(EQ_BAND_DIMENSIONS[band]);
            (share / (cfg.presence_fraction * cfg.reference_shares[band])).clamp(0.0, 1.0)
        };

        for (band, gain) in gains.iter_mut().enumerate() {
            let share = fp.get(EQ_BAND_DIMENSIONS[band]);
            let reference = cfg.reference_shares[band];
            let correction = cfg.band_gain_scale * 10.0 * mp_core::numeric::safe_log10(reference / share, 0.0);
            *gain = correction.clamp(-cfg.max_band_gain_db, cfg.max_band_gain_db) * presence(band);
        }

        // Bass weight follows the loudness target instead of a fixed share
        let bass_present = presence(1) >= 1.0 && presence(3) >= 1.0;
        if bass_present {
            let ratio = fp.get(Dimension::BassMidRatio);
            let expected = cfg.expected_bass_share(target_lufs);
            let bass = cfg.bass_gain_scale * 10.0 * mp_core::numeric::safe_log10(expected / ratio, 0.0);
            gains[1] += bass.clamp(-cfg.max_bass_gain_db, cfg.max_bass_gain_db);
        }

        gains.map(|g| g.clamp(-2.0 * cfg.max_band_gain_db, 2.0 * cfg.max_band_gain_db))
    }

    /// Crest factor to aim for: loudness-war material is pulled toward a
    /// loudness-dependent crest, everything else keeps what it has
    pub fn crest_target(&self, lufs: f64, crest: f64, war_weight: f64) -> f64 {
        let cfg = &self.config;
        let war_target = cfg.war_crest_db - cfg.war_crest_slope * (lufs + 14.0);
        let blended = war_weight * war_target + (1.0 - war_weight) * crest;
        let floor = cfg.min_crest_db.min(crest);
        blended.clamp(floor, crest)
    }

    /// Side gain factor for the width stage
    pub fn width_factor(&self, fp: &Fingerprint, bias: f64) -> f64 {
        let cfg = &self.config;
        let width = fp.get(Dimension::StereoWidth);
        let correlation = fp.get(Dimension::PhaseCorrelation);
        if width < 1e-3 {
            return 1.0;
        }
        let target = (cfg.target_width + bias).clamp(0.0, 1.0);
        let (lo, hi) = cfg.width_range;
        let factor = mp_core::numeric::safe_divide(target, width, 1.0).clamp(lo, hi);
        if correlation < 0.0 { factor.min(1.0) } else { factor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp_fingerprint::{AnalyzerKind, Features};

    fn fingerprint(overrides: &[(Dimension, f64)]) -> Fingerprint {
        let mut features: Features = AnalyzerKind::ALL
            .iter()
            .flat_map(|kind| kind.default_features())
            .copied()
            .collect();
        features.insert(Dimension::StereoWidth, 0.3);
        for &(dim, value) in overrides {
            features.insert(dim, value);
        }
        Fingerprint::from_features(&features).unwrap()
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let mapper = ContinuousParameterMapper::default();
        let fp = fingerprint(&[(Dimension::Lufs, -16.0)]);
        for profile in RecordingProfile::ALL {
            assert_eq!(mapper.map(&fp, profile), mapper.map(&fp, profile));
        }
    }

    #[test]
    fn test_boost_weight_never_favors_quieter_material() {
        let cfg = MapperConfig::default();
        let mut previous = 0.0;
        for step in 0..=700 {
            let lufs = -70.0 + step as f64 * 0.1;
            let w = cfg.boost_weight(lufs);
            assert!(w >= previous, "{lufs}: {w} < {previous}");
            previous = w;
        }
        assert_eq!(cfg.boost_weight(-60.0), 0.35);
        assert_eq!(cfg.boost_weight(-10.0), 1.0);
    }

    #[test]
    fn test_quiet_material_gets_partial_boost() {
        let mapper = ContinuousParameterMapper::default();
        let fp = fingerprint(&[(Dimension::Lufs, -40.0)]);
        let params = mapper.map(&fp, RecordingProfile::Adaptive);
        // Full gap is 32 dB; weight 0.2 is floored at 0.35, then capped at max boost
        assert_eq!(params.target_lufs, -32.0);

        let fp = fingerprint(&[(Dimension::Lufs, -12.0)]);
        let params = mapper.map(&fp, RecordingProfile::Adaptive);
        assert!((params.target_lufs - -8.0).abs() < 1e-12);
    }

    #[test]
    fn test_hot_material_is_only_trimmed() {
        let mapper = ContinuousParameterMapper::default();
        let fp = fingerprint(&[(Dimension::Lufs, -3.0), (Dimension::CrestDb, 4.0)]);
        let params = mapper.map(&fp, RecordingProfile::Gentle);
        assert!((params.target_lufs - -5.0).abs() < 1e-12);
    }

    #[test]
    fn test_gentle_never_targets_louder_than_adaptive() {
        let mapper = ContinuousParameterMapper::default();
        for step in 0..=60 {
            let lufs = -60.0 + step as f64;
            let fp = fingerprint(&[(Dimension::Lufs, lufs)]);
            let gentle = mapper.map(&fp, RecordingProfile::Gentle);
            let adaptive = mapper.map(&fp, RecordingProfile::Adaptive);
            assert!(gentle.target_lufs <= adaptive.target_lufs, "{lufs} LUFS");
            assert!(gentle.target_peak_db < adaptive.target_peak_db);
        }
    }

    #[test]
    fn test_expected_bass_share_rises_with_target() {
        let cfg = MapperConfig::default();
        assert!(cfg.expected_bass_share(-8.0) > cfg.expected_bass_share(-14.0));
        assert!((cfg.expected_bass_share(-14.0) - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_crest_target_bounds() {
        let mapper = ContinuousParameterMapper::default();
        // Loudness-war material at -6 LUFS aims for 8 - 4 = 4 dB
        assert!((mapper.crest_target(-6.0, 10.0, 1.0) - 4.0).abs() < 1e-12);
        // Dynamic material keeps its crest
        assert_eq!(mapper.crest_target(-20.0, 16.0, 0.0), 16.0);
        // Never above the measured crest
        assert_eq!(mapper.crest_target(-30.0, 6.0, 1.0), 6.0);
        // Never below the floor
        assert_eq!(mapper.crest_target(0.0, 12.0, 1.0), 3.0);
    }

    #[test]
    fn test_width_rules() {
        let mapper = ContinuousParameterMapper::default();
        let narrow = fingerprint(&[(Dimension::StereoWidth, 0.1)]);
        assert_eq!(mapper.width_factor(&narrow, 0.0), 1.4);

        let wide = fingerprint(&[(Dimension::StereoWidth, 0.6)]);
        assert!((mapper.width_factor(&wide, 0.0) - 0.7).abs() < 1e-12);

        let out_of_phase = fingerprint(&[(Dimension::StereoWidth, 0.1), (Dimension::PhaseCorrelation, -0.4)]);
        assert_eq!(mapper.width_factor(&out_of_phase, 0.0), 1.0);

        let mono = fingerprint(&[(Dimension::StereoWidth, 0.0)]);
        assert_eq!(mapper.width_factor(&mono, 0.05), 1.0);
    }

    #[test]
    fn test_low_confidence_is_conservative() {
        let mapper = ContinuousParameterMapper::default();
        let fp = fingerprint(&[
            (Dimension::Lufs, -9.0),
            (Dimension::CrestDb, 9.0),
            (Dimension::StereoWidth, 0.1),
            (Dimension::MidPct, 0.5),
        ]);
        let sure = mapper.classifier().classify(&fp);
        let unsure = RecordingClassification::uncertain();

        let confident = mapper.map_classified(&fp, &sure, RecordingProfile::Adaptive);
        let cautious = mapper.map_classified(&fp, &unsure, RecordingProfile::Adaptive);

        assert_eq!(cautious.stereo_width, 1.0);
        assert_eq!(cautious.dynamics.ratio, 1.0);
        assert!(cautious.eq_gains_db.iter().all(|g| *g == 0.0));
        // Loudness and peak targets stay profile-derived
        assert_eq!(cautious.target_lufs, confident.target_lufs);
        assert_eq!(cautious.target_peak_db, confident.target_peak_db);
        assert!(confident.dynamics.ratio > 1.0);
    }

    #[test]
    fn test_mapped_parameters_validate() {
        let mapper = ContinuousParameterMapper::default();
        for lufs in [-70.0, -40.0, -14.0, -5.0, 0.0] {
            for crest in [0.0, 3.0, 12.0, 40.0] {
                let fp = fingerprint(&[(Dimension::Lufs, lufs), (Dimension::CrestDb, crest)]);
                for profile in RecordingProfile::ALL {
                    mapper.map(&fp, profile).validate().unwrap();
                }
            }
        }
    }
}
