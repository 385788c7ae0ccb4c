//! Incremental fingerprinting
//!
//! [`StreamingFingerprintEngine`] folds audio chunks into online statistics
//! and can report a partial fingerprint over [`STREAMING_DIMENSIONS`] at any
//! time. Memory is bounded: every accumulator keeps either running sums, a
//! fixed set of P² markers or a capacity-limited window.

use mp_core::{AudioBuffer, CoreError};
use serde::{Deserialize, Serialize};

use crate::analyzers::spectral::spectral_shape;
use crate::analyzers::stereo::StereoAccumulator;
use crate::analyzers::temporal::OnsetTracker;
use crate::analyzers::variation::VariationAccumulator;
use crate::analyzers::AnalyzerKind;
use crate::config::AnalysisConfig;
use crate::dimension::Dimension;
use crate::error::{check_value, FingerprintError, FingerprintResult};
use crate::fingerprint::{Features, Fingerprint};
use crate::framing::FrameSplitter;
use crate::stats::StreamingQuantile;
use crate::stft::Stft;

/// Number of dimensions a streaming fingerprint carries
pub const STREAMING_DIMENSION_COUNT: usize = 13;

/// Dimensions that can be estimated online, in snapshot order
pub const STREAMING_DIMENSIONS: [Dimension; STREAMING_DIMENSION_COUNT] = [
    Dimension::Lufs,
    Dimension::CrestDb,
    Dimension::DynamicRangeVariation,
    Dimension::LoudnessVariation,
    Dimension::PeakConsistency,
    Dimension::SpectralCentroid,
    Dimension::SpectralRolloff,
    Dimension::SpectralFlatness,
    Dimension::RhythmStability,
    Dimension::TransientDensity,
    Dimension::SilenceRatio,
    Dimension::StereoWidth,
    Dimension::PhaseCorrelation,
];

/// Confidence after `seconds` of audio for a family converging with time
/// constant `tau`
#[inline]
fn convergence(seconds: f64, tau: f64) -> f64 {
    if seconds <= 0.0 || tau <= 0.0 {
        return 0.0;
    }
    (1.0 - (-seconds / tau).exp()).clamp(0.0, 1.0)
}

/// Partial fingerprint with a confidence per dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StreamingFingerprintRecord", into = "StreamingFingerprintRecord")]
pub struct StreamingFingerprint {
    values: [f64; STREAMING_DIMENSION_COUNT],
    confidence: [f64; STREAMING_DIMENSION_COUNT],
    frames_observed: u64,
    sample_rate: u32,
}

/// Serialized form, checked on the way back in
#[derive(Serialize, Deserialize)]
struct StreamingFingerprintRecord {
    values: Features,
    confidence: Features,
    frames_observed: u64,
    sample_rate: u32,
}

impl StreamingFingerprint {
    /// Values and confidences in [`STREAMING_DIMENSIONS`] order.
    ///
    /// Every value must lie in its dimension's range and every confidence
    /// in `[0, 1]`.
    pub fn new(
        values: [f64; STREAMING_DIMENSION_COUNT],
        confidence: [f64; STREAMING_DIMENSION_COUNT],
        frames_observed: u64,
        sample_rate: u32,
    ) -> FingerprintResult<Self> {
        for (i, &dim) in STREAMING_DIMENSIONS.iter().enumerate() {
            check_value(dim, values[i])?;
            let c = confidence[i];
            if !(0.0..=1.0).contains(&c) {
                return Err(FingerprintError::InvalidConfidence { dimension: dim, value: c });
            }
        }
        Ok(Self {
            values,
            confidence,
            frames_observed,
            sample_rate,
        })
    }

    /// The streaming subset of a batch fingerprint, every dimension at the
    /// same `confidence`
    pub fn from_fingerprint(
        fingerprint: &Fingerprint,
        confidence: f64,
        frames_observed: u64,
        sample_rate: u32,
    ) -> FingerprintResult<Self> {
        let values = STREAMING_DIMENSIONS.map(|dim| fingerprint.get(dim));
        Self::new(values, [confidence; STREAMING_DIMENSION_COUNT], frames_observed, sample_rate)
    }

    #[inline]
    pub fn dimensions(&self) -> &'static [Dimension] {
        &STREAMING_DIMENSIONS
    }

    fn position(dim: Dimension) -> Option<usize> {
        STREAMING_DIMENSIONS.iter().position(|&d| d == dim)
    }

    /// Value of `dim`, `None` outside the streaming subset
    pub fn get(&self, dim: Dimension) -> Option<f64> {
        Self::position(dim).map(|i| self.values[i])
    }

    pub fn confidence(&self, dim: Dimension) -> Option<f64> {
        Self::position(dim).map(|i| self.confidence[i])
    }

    /// Mean confidence across the subset
    pub fn overall_confidence(&self) -> f64 {
        self.confidence.iter().sum::<f64>() / STREAMING_DIMENSION_COUNT as f64
    }

    /// `(dimension, value, confidence)` in snapshot order
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64, f64)> + '_ {
        STREAMING_DIMENSIONS
            .iter()
            .enumerate()
            .map(move |(i, &dim)| (dim, self.values[i], self.confidence[i]))
    }

    #[inline]
    pub fn frames_observed(&self) -> u64 {
        self.frames_observed
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn seconds_observed(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames_observed as f64 / self.sample_rate as f64
    }

    pub fn to_json(&self) -> FingerprintResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> FingerprintResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TryFrom<StreamingFingerprintRecord> for StreamingFingerprint {
    type Error = FingerprintError;

    fn try_from(record: StreamingFingerprintRecord) -> Result<Self, Self::Error> {
        let mut values = [0.0; STREAMING_DIMENSION_COUNT];
        let mut confidence = [0.0; STREAMING_DIMENSION_COUNT];
        for (i, dim) in STREAMING_DIMENSIONS.iter().enumerate() {
            values[i] = *record.values.get(dim).ok_or(FingerprintError::MissingDimension(*dim))?;
            confidence[i] = *record
                .confidence
                .get(dim)
                .ok_or(FingerprintError::MissingDimension(*dim))?;
        }
        Self::new(values, confidence, record.frames_observed, record.sample_rate)
    }
}

impl From<StreamingFingerprint> for StreamingFingerprintRecord {
    fn from(fp: StreamingFingerprint) -> Self {
        Self {
            values: fp.iter().map(|(dim, value, _)| (dim, value)).collect(),
            confidence: fp.iter().map(|(dim, _, c)| (dim, c)).collect(),
            frames_observed: fp.frames_observed,
            sample_rate: fp.sample_rate,
        }
    }
}

/// Online median spectral shape
#[derive(Debug, Clone)]
struct SpectralTracker {
    splitter: FrameSplitter,
    stft: Stft,
    rolloff_fraction: f64,
    centroid: StreamingQuantile,
    rolloff: StreamingQuantile,
    flatness: StreamingQuantile,
}

impl SpectralTracker {
    fn new(config: &AnalysisConfig, sample_rate: u32) -> FingerprintResult<Self> {
        Ok(Self {
            splitter: FrameSplitter::new(config.fft_size, config.hop_size),
            stft: Stft::new(config.fft_size, sample_rate)?,
            rolloff_fraction: config.rolloff_fraction,
            centroid: StreamingQuantile::median(),
            rolloff: StreamingQuantile::median(),
            flatness: StreamingQuantile::median(),
        })
    }

    fn push(&mut self, mono: &[f32]) {
        let Self {
            splitter,
            stft,
            rolloff_fraction,
            centroid,
            rolloff,
            flatness,
        } = self;
        splitter.push(mono, |frame| {
            let shape = stft
                .power_spectrum(frame)
                .and_then(|power| spectral_shape(&power, *rolloff_fraction));
            if let Some(shape) = shape {
                centroid.push(shape.centroid);
                rolloff.push(shape.rolloff);
                flatness.push(shape.flatness);
            }
        });
    }

    fn estimate(&self, dim: Dimension) -> Option<f64> {
        match dim {
            Dimension::SpectralCentroid => self.centroid.estimate(),
            Dimension::SpectralRolloff => self.rolloff.estimate(),
            Dimension::SpectralFlatness => self.flatness.estimate(),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.splitter.reset();
        self.centroid.reset();
        self.rolloff.reset();
        self.flatness.reset();
    }
}

/// Chunk-wise fingerprint estimator for one audio stream.
///
/// Sequential per stream; independent streams need independent engines.
#[derive(Debug, Clone)]
pub struct StreamingFingerprintEngine {
    sample_rate: u32,
    channels: usize,
    variation: VariationAccumulator,
    stereo: StereoAccumulator,
    onsets: OnsetTracker,
    spectral: SpectralTracker,
    frames: u64,
}

impl StreamingFingerprintEngine {
    pub fn new(sample_rate: u32, channels: usize, config: AnalysisConfig) -> FingerprintResult<Self> {
        config.validate()?;
        if sample_rate == 0 {
            return Err(CoreError::InvalidSampleRate(sample_rate).into());
        }
        if channels == 0 {
            return Err(CoreError::ChannelMismatch {
                expected: 1,
                actual: 0,
            }
            .into());
        }

        let envelope_capacity = OnsetTracker::capacity_for(&config, sample_rate, config.rhythm_window_secs);
        Ok(Self {
            sample_rate,
            channels,
            variation: VariationAccumulator::new(&config, sample_rate, channels),
            stereo: StereoAccumulator::new(),
            onsets: OnsetTracker::new(&config, sample_rate, envelope_capacity),
            spectral: SpectralTracker::new(&config, sample_rate)?,
            frames: 0,
        })
    }

    /// Fold one chunk into the running state.
    ///
    /// The chunk must match the stream's sample rate and channel count.
    pub fn update(&mut self, chunk: &AudioBuffer) -> FingerprintResult<()> {
        if chunk.sample_rate() != self.sample_rate {
            return Err(FingerprintError::StreamMismatch(format!(
                "chunk sample rate {} Hz, stream is {} Hz",
                chunk.sample_rate(),
                self.sample_rate
            )));
        }
        if chunk.num_channels() != self.channels {
            return Err(CoreError::ChannelMismatch {
                expected: self.channels,
                actual: chunk.num_channels(),
            }
            .into());
        }

        self.variation.push(chunk);
        self.stereo.push(chunk);
        let mono = chunk.mono_mix();
        self.onsets.push(&mono);
        self.spectral.push(&mono);
        self.frames += chunk.num_frames() as u64;
        Ok(())
    }

    /// Current partial fingerprint.
    ///
    /// Dimensions without any usable frame yet report their analyzer
    /// default; their confidence still reflects elapsed time.
    pub fn snapshot(&self) -> StreamingFingerprint {
        let mut features = self.variation.features();
        features.extend(self.onsets.features());
        features.extend(self.stereo.features());

        let seconds = self.seconds_processed();
        let mut values = [0.0; STREAMING_DIMENSION_COUNT];
        let mut confidence = [0.0; STREAMING_DIMENSION_COUNT];
        for (i, &dim) in STREAMING_DIMENSIONS.iter().enumerate() {
            let kind = dim.analyzer();
            let fallback = kind.default_value(dim).unwrap_or(dim.range().0);
            let value = match kind {
                AnalyzerKind::Spectral => self.spectral.estimate(dim),
                _ => features.get(&dim).copied(),
            }
            .filter(|v| v.is_finite())
            .unwrap_or(fallback);

            // Every accumulator saturates at its dimension's range
            debug_assert!(check_value(dim, value).is_ok(), "{dim} = {value} outside {:?}", dim.range());
            values[i] = value;
            confidence[i] = convergence(seconds, kind.convergence_secs());
        }

        StreamingFingerprint {
            values,
            confidence,
            frames_observed: self.frames,
            sample_rate: self.sample_rate,
        }
    }

    pub fn reset(&mut self) {
        self.variation.reset();
        self.stereo.reset();
        self.onsets.reset();
        self.spectral.reset();
        self.frames = 0;
    }

    #[inline]
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn seconds_processed(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Onset-envelope values currently held for rhythm estimation
    pub fn rhythm_history_len(&self) -> usize {
        self.onsets.envelope_len()
    }
}
