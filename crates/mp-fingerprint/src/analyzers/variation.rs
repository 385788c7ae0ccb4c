//! Loudness, crest factor and their variation over time
//!
//! The signal is cut into fixed blocks (400 ms by default). Per-block RMS and
//! peak feed running statistics; integrated loudness comes from the shared
//! BS.1770 meter.

use mp_core::loudness::{LufsMeter, LOUDNESS_FLOOR_LUFS};
use mp_core::numeric::{self, EPSILON};
use mp_core::AudioBuffer;

use super::{AnalyzerKind, Degradation, FeatureAnalyzer};
use crate::config::AnalysisConfig;
use crate::dimension::Dimension;
use crate::fingerprint::Features;
use crate::stats::RunningStats;

/// Std of block crest (dB) at which dynamic range variation saturates
const CREST_SPREAD_DB: f64 = 6.0;

/// Std of block level (dB) at which loudness variation saturates
const LEVEL_SPREAD_DB: f64 = 10.0;

/// Upper edge of the crest dimension
const MAX_CREST_DB: f64 = 40.0;

/// Incremental block statistics shared by batch and streaming analysis.
///
/// Feeding the same samples in any chunking yields identical features.
#[derive(Debug, Clone)]
pub struct VariationAccumulator {
    block_size: usize,
    silence_threshold_db: f64,
    meter: LufsMeter,
    block_sum_sq: f64,
    block_peak: f32,
    block_fill: usize,
    block_channels: usize,
    level_db: RunningStats,
    crest_db: RunningStats,
    peaks: RunningStats,
    global_sum_sq: f64,
    global_samples: u64,
    global_peak: f32,
}

impl VariationAccumulator {
    pub fn new(config: &AnalysisConfig, sample_rate: u32, channels: usize) -> Self {
        Self {
            block_size: config.block_samples(sample_rate),
            silence_threshold_db: config.silence_threshold_db,
            meter: LufsMeter::new(sample_rate, channels),
            block_sum_sq: 0.0,
            block_peak: 0.0,
            block_fill: 0,
            block_channels: channels.max(1),
            level_db: RunningStats::new(),
            crest_db: RunningStats::new(),
            peaks: RunningStats::new(),
            global_sum_sq: 0.0,
            global_samples: 0,
            global_peak: 0.0,
        }
    }

    pub fn push(&mut self, buffer: &AudioBuffer) {
        self.meter.process(buffer);

        let channels = buffer.channels();
        for frame in 0..buffer.num_frames() {
            for channel in channels {
                let s = channel[frame];
                let sq = (s as f64) * (s as f64);
                self.block_sum_sq += sq;
                self.global_sum_sq += sq;
                self.block_peak = self.block_peak.max(s.abs());
                self.global_peak = self.global_peak.max(s.abs());
            }
            self.global_samples += channels.len() as u64;
            self.block_fill += 1;
            if self.block_fill == self.block_size {
                self.close_block();
            }
        }
    }

    fn close_block(&mut self) {
        let (level, crest, peak) = block_summary(
            self.block_sum_sq,
            self.block_peak,
            self.block_fill * self.block_channels,
        );
        if level >= self.silence_threshold_db {
            self.level_db.push(level);
            self.crest_db.push(crest);
            self.peaks.push(peak);
        }
        self.block_sum_sq = 0.0;
        self.block_peak = 0.0;
        self.block_fill = 0;
    }

    /// Number of completed blocks above the silence threshold
    pub fn active_blocks(&self) -> u64 {
        self.level_db.count()
    }

    /// Features over everything seen so far.
    ///
    /// The trailing partial block only counts when no full block exists yet.
    pub fn features(&self) -> Features {
        let mut level_db = self.level_db.clone();
        let mut crest_db = self.crest_db.clone();
        let mut peaks = self.peaks.clone();
        if level_db.count() == 0 && self.block_fill > 0 {
            let (level, crest, peak) = block_summary(
                self.block_sum_sq,
                self.block_peak,
                self.block_fill * self.block_channels,
            );
            if level >= self.silence_threshold_db {
                level_db.push(level);
                crest_db.push(crest);
                peaks.push(peak);
            }
        }

        let rms = numeric::safe_divide(self.global_sum_sq, self.global_samples as f64, 0.0).sqrt();
        let crest = if rms < EPSILON {
            0.0
        } else {
            numeric::linear_to_db(numeric::safe_divide(self.global_peak as f64, rms, 1.0))
        };

        let loudness_variation = level_db.std_dev().unwrap_or(0.0) / LEVEL_SPREAD_DB;
        let dynamic_range_variation = crest_db.std_dev().unwrap_or(0.0) / CREST_SPREAD_DB;
        let peak_cv = numeric::safe_divide(
            peaks.std_dev().unwrap_or(0.0),
            peaks.mean().unwrap_or(0.0),
            0.0,
        );

        let integrated = self.meter.integrated();
        if integrated > 0.0 {
            log::warn!("Integrated loudness {:.2} LUFS is above full scale; reported as 0 LUFS", integrated);
        }

        let mut features = Features::new();
        features.insert(Dimension::Lufs, integrated.clamp(LOUDNESS_FLOOR_LUFS, 0.0));
        features.insert(Dimension::CrestDb, crest.clamp(0.0, MAX_CREST_DB));
        features.insert(
            Dimension::DynamicRangeVariation,
            dynamic_range_variation.clamp(0.0, 1.0),
        );
        features.insert(Dimension::LoudnessVariation, loudness_variation.clamp(0.0, 1.0));
        features.insert(Dimension::PeakConsistency, (1.0 - peak_cv.min(1.0)).clamp(0.0, 1.0));
        features
    }

    pub fn reset(&mut self) {
        self.meter.reset();
        self.block_sum_sq = 0.0;
        self.block_peak = 0.0;
        self.block_fill = 0;
        self.level_db.reset();
        self.crest_db.reset();
        self.peaks.reset();
        self.global_sum_sq = 0.0;
        self.global_samples = 0;
        self.global_peak = 0.0;
    }
}

/// Level (dB), crest (dB) and peak of one block
fn block_summary(sum_sq: f64, peak: f32, samples: usize) -> (f64, f64, f64) {
    let rms = numeric::safe_divide(sum_sq, samples as f64, 0.0).sqrt();
    let level = numeric::linear_to_db(rms);
    let crest = numeric::linear_to_db(numeric::safe_divide(peak as f64, rms, 1.0));
    (level, crest, peak as f64)
}

/// Integrated loudness, crest factor and block-to-block variation
#[derive(Debug, Clone, Copy, Default)]
pub struct VariationAnalyzer;

impl FeatureAnalyzer for VariationAnalyzer {
    const KIND: AnalyzerKind = AnalyzerKind::Variation;

    const DIMENSIONS: &'static [Dimension] = &[
        Dimension::Lufs,
        Dimension::CrestDb,
        Dimension::DynamicRangeVariation,
        Dimension::LoudnessVariation,
        Dimension::PeakConsistency,
    ];

    const DEFAULT_FEATURES: &'static [(Dimension, f64)] = &[
        (Dimension::Lufs, -23.0),
        (Dimension::CrestDb, 12.0),
        (Dimension::DynamicRangeVariation, 0.3),
        (Dimension::LoudnessVariation, 0.3),
        (Dimension::PeakConsistency, 0.7),
    ];

    fn compute(&self, buffer: &AudioBuffer, config: &AnalysisConfig) -> Result<Features, Degradation> {
        let mut accumulator = VariationAccumulator::new(config, buffer.sample_rate(), buffer.num_channels());
        accumulator.push(buffer);
        Ok(accumulator.features())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_signals::*;
    use approx::assert_abs_diff_eq;

    fn analyze(samples: Vec<f32>) -> Features {
        VariationAnalyzer
            .analyze(&mono(samples, 44100), &AnalysisConfig::default())
            .features
    }

    #[test]
    fn test_steady_sine() {
        let features = analyze(sine(1000.0, 0.5, 4.0, 44100));
        assert_abs_diff_eq!(features[&Dimension::CrestDb], 3.01, epsilon = 0.05);
        assert_abs_diff_eq!(features[&Dimension::Lufs], -9.0, epsilon = 0.3);
        assert!(features[&Dimension::LoudnessVariation] < 0.01);
        assert!(features[&Dimension::DynamicRangeVariation] < 0.01);
        assert!(features[&Dimension::PeakConsistency] > 0.99);
    }

    #[test]
    fn test_level_changes_raise_variation() {
        let mut samples = sine(500.0, 0.5, 2.0, 44100);
        samples.extend(sine(500.0, 0.05, 2.0, 44100));
        let features = analyze(samples);
        assert!(features[&Dimension::LoudnessVariation] > 0.5);
        assert!(features[&Dimension::PeakConsistency] < 0.5);
    }

    #[test]
    fn test_silence_uses_safe_fallbacks() {
        let features = analyze(vec![0.0; 44100]);
        assert_eq!(features[&Dimension::Lufs], LOUDNESS_FLOOR_LUFS);
        assert_eq!(features[&Dimension::CrestDb], 0.0);
        assert_eq!(features[&Dimension::LoudnessVariation], 0.0);
        assert_eq!(features[&Dimension::PeakConsistency], 1.0);
    }

    #[test]
    fn test_chunking_is_invisible() {
        let samples = noise(0.3, 3.0, 44100, 9);
        let config = AnalysisConfig::default();
        let buffer = mono(samples, 44100);
        let mut whole = VariationAccumulator::new(&config, 44100, 1);
        whole.push(&buffer);
        let mut chunked = VariationAccumulator::new(&config, 44100, 1);
        for chunk in buffer.split(1000) {
            chunked.push(&chunk);
        }
        assert_eq!(whole.features(), chunked.features());
    }
}
