//! Rhythm, transients and silence
//!
//! Onsets are detected on a log-energy flux envelope with an adaptive
//! threshold. Tempo is the strongest autocorrelation lag of the envelope
//! inside 40..=200 BPM, and rhythm stability is that peak's normalized
//! height.

use mp_core::numeric::{self, EPSILON};
use mp_core::AudioBuffer;

use super::{AnalyzerKind, Degradation, FeatureAnalyzer};
use crate::config::AnalysisConfig;
use crate::dimension::Dimension;
use crate::fingerprint::Features;
use crate::framing::FrameSplitter;
use crate::stats::SlidingWindow;

/// Slowest tempo reported
pub const MIN_BPM: f64 = 40.0;

/// Fastest tempo reported
pub const MAX_BPM: f64 = 200.0;

/// Tempo reported when no periodicity can be measured
pub const DEFAULT_BPM: f64 = 120.0;

/// Onsets per second that saturate transient density
const DENSITY_SATURATION_PER_SEC: f64 = 10.0;

/// Adaptive threshold: mean + k * std of the recent flux
const THRESHOLD_STD_FACTOR: f64 = 1.5;

/// Level rises below this are treated as steady-state ripple (dB)
const FLUX_GATE_DB: f64 = 0.5;

/// Smallest level rise that can count as an onset (dB)
const ONSET_MIN_RISE_DB: f64 = 2.0;

/// Minimum spacing between onsets
const REFRACTORY_SECS: f64 = 0.05;

/// Flux history used for the adaptive threshold
const THRESHOLD_WINDOW_SECS: f64 = 1.0;

/// Incremental onset detector shared by batch and streaming analysis
#[derive(Debug, Clone)]
pub struct OnsetTracker {
    splitter: FrameSplitter,
    hop_size: usize,
    sample_rate: u32,
    silence_threshold_db: f64,
    refractory_frames: u64,
    prev_level_db: Option<f64>,
    recent_flux: SlidingWindow,
    envelope: SlidingWindow,
    frames: u64,
    silent_frames: u64,
    onsets: u64,
    last_onset: Option<u64>,
}

impl OnsetTracker {
    /// `envelope_capacity` bounds how many flux values are kept for tempo
    /// estimation
    pub fn new(config: &AnalysisConfig, sample_rate: u32, envelope_capacity: usize) -> Self {
        let frame_rate = sample_rate as f64 / config.onset_hop_size as f64;
        Self {
            splitter: FrameSplitter::new(config.onset_frame_size, config.onset_hop_size),
            hop_size: config.onset_hop_size,
            sample_rate,
            silence_threshold_db: config.silence_threshold_db,
            refractory_frames: (REFRACTORY_SECS * frame_rate).ceil().max(1.0) as u64,
            prev_level_db: None,
            recent_flux: SlidingWindow::new((THRESHOLD_WINDOW_SECS * frame_rate).ceil() as usize),
            envelope: SlidingWindow::new(envelope_capacity),
            frames: 0,
            silent_frames: 0,
            onsets: 0,
            last_onset: None,
        }
    }

    /// Envelope capacity covering `seconds` of audio
    pub fn capacity_for(config: &AnalysisConfig, sample_rate: u32, seconds: f64) -> usize {
        (seconds * sample_rate as f64 / config.onset_hop_size as f64).ceil().max(1.0) as usize
    }

    /// Onset-envelope frames per second
    #[inline]
    pub fn envelope_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_size as f64
    }

    pub fn push(&mut self, mono: &[f32]) {
        let mut splitter = std::mem::replace(&mut self.splitter, FrameSplitter::new(1, 1));
        splitter.push(mono, |frame| self.process_frame(frame));
        self.splitter = splitter;
    }

    fn process_frame(&mut self, frame: &[f32]) {
        let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = numeric::safe_divide(sum_sq, frame.len() as f64, 0.0).sqrt();
        let level_db = numeric::linear_to_db(rms);
        let silent = level_db < self.silence_threshold_db;
        if silent {
            self.silent_frames += 1;
        }

        // Rises are measured from the silence threshold at most, so a hit
        // after digital silence does not read as a 100 dB jump
        let rise = match self.prev_level_db {
            Some(prev) if !silent => level_db - prev.max(self.silence_threshold_db),
            _ => 0.0,
        };
        let flux = if rise >= FLUX_GATE_DB { rise } else { 0.0 };
        self.prev_level_db = Some(level_db);

        let threshold = self.recent_flux.mean() + THRESHOLD_STD_FACTOR * self.recent_flux.std_dev();
        let spaced = self
            .last_onset
            .is_none_or(|last| self.frames - last >= self.refractory_frames);
        if flux > threshold && flux >= ONSET_MIN_RISE_DB && spaced {
            self.onsets += 1;
            self.last_onset = Some(self.frames);
        }

        self.recent_flux.push(flux);
        self.envelope.push(flux);
        self.frames += 1;
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[inline]
    pub fn onsets(&self) -> u64 {
        self.onsets
    }

    /// Envelope values currently retained, never more than the capacity
    #[inline]
    pub fn envelope_len(&self) -> usize {
        self.envelope.len()
    }

    /// Seconds of audio covered by completed frames
    pub fn seconds(&self) -> f64 {
        self.frames as f64 / self.envelope_rate()
    }

    /// Features derived from everything seen so far
    pub fn features(&self) -> Features {
        let (tempo, stability) =
            tempo_from_envelope(&self.envelope.to_vec(), self.envelope_rate()).unwrap_or((DEFAULT_BPM, 0.0));

        let density = numeric::safe_divide(self.onsets as f64, self.seconds(), 0.0) / DENSITY_SATURATION_PER_SEC;
        let silence = numeric::safe_divide(self.silent_frames as f64, self.frames as f64, 0.0);

        let mut features = Features::new();
        features.insert(Dimension::TempoBpm, tempo.clamp(MIN_BPM, MAX_BPM));
        features.insert(Dimension::RhythmStability, stability.clamp(0.0, 1.0));
        features.insert(Dimension::TransientDensity, density.clamp(0.0, 1.0));
        features.insert(Dimension::SilenceRatio, silence.clamp(0.0, 1.0));
        features
    }

    pub fn reset(&mut self) {
        self.splitter.reset();
        self.prev_level_db = None;
        self.recent_flux.clear();
        self.envelope.clear();
        self.frames = 0;
        self.silent_frames = 0;
        self.onsets = 0;
        self.last_onset = None;
    }
}

/// Tempo and periodicity strength from an onset envelope.
///
/// Searches autocorrelation lags whose tempo lies in `[MIN_BPM, MAX_BPM]`.
/// Returns `None` when the envelope is flat or shorter than the slowest
/// searchable lag.
pub fn tempo_from_envelope(envelope: &[f64], envelope_rate: f64) -> Option<(f64, f64)> {
    if envelope_rate <= 0.0 || !envelope_rate.is_finite() {
        return None;
    }
    let min_lag = (60.0 * envelope_rate / MAX_BPM).ceil().max(1.0) as usize;
    let max_lag = ((60.0 * envelope_rate / MIN_BPM).floor() as usize).min(envelope.len().saturating_sub(1));
    if max_lag < min_lag {
        return None;
    }

    let mean = envelope.iter().sum::<f64>() / envelope.len() as f64;
    let centered: Vec<f64> = envelope.iter().map(|v| v - mean).collect();
    let r0: f64 = centered.iter().map(|v| v * v).sum();
    if r0 < EPSILON {
        return None;
    }

    let mut best_lag = min_lag;
    let mut best = f64::NEG_INFINITY;
    for lag in min_lag..=max_lag {
        let r: f64 = centered.iter().zip(&centered[lag..]).map(|(a, b)| a * b).sum();
        if r > best {
            best = r;
            best_lag = lag;
        }
    }

    let tempo = 60.0 * envelope_rate / best_lag as f64;
    let stability = numeric::safe_divide(best, r0, 0.0).max(0.0);
    Some((tempo, stability))
}

/// Tempo, rhythm stability, transient density and silence ratio
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalAnalyzer;

impl FeatureAnalyzer for TemporalAnalyzer {
    const KIND: AnalyzerKind = AnalyzerKind::Temporal;

    const DIMENSIONS: &'static [Dimension] = &[
        Dimension::TempoBpm,
        Dimension::RhythmStability,
        Dimension::TransientDensity,
        Dimension::SilenceRatio,
    ];

    const DEFAULT_FEATURES: &'static [(Dimension, f64)] = &[
        (Dimension::TempoBpm, DEFAULT_BPM),
        (Dimension::RhythmStability, 0.5),
        (Dimension::TransientDensity, 0.2),
        (Dimension::SilenceRatio, 0.0),
    ];

    fn compute(&self, buffer: &AudioBuffer, config: &AnalysisConfig) -> Result<Features, Degradation> {
        let frames = buffer.num_frames();
        if frames < config.onset_frame_size {
            return Err(Degradation::TooShort {
                needed: config.onset_frame_size,
                actual: frames,
            });
        }

        let capacity = frames / config.onset_hop_size + 1;
        let mut tracker = OnsetTracker::new(config, buffer.sample_rate(), capacity);
        tracker.push(&buffer.mono_mix());
        Ok(tracker.features())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::test_signals::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_click_track_tempo() {
        // 120 BPM = one click every 0.5 s
        let output = TemporalAnalyzer.analyze(&mono(clicks(0.5, 10.0, 44100), 44100), &AnalysisConfig::default());
        assert!(!output.is_degraded());
        let tempo = output.features[&Dimension::TempoBpm];
        assert_abs_diff_eq!(tempo, 120.0, epsilon = 3.0);
        assert!(output.features[&Dimension::RhythmStability] > 0.3);
        // 2 onsets per second
        assert_abs_diff_eq!(output.features[&Dimension::TransientDensity], 0.2, epsilon = 0.05);
        assert!(output.features[&Dimension::SilenceRatio] > 0.5);
    }

    #[test]
    fn test_steady_tone_has_no_rhythm() {
        let output = TemporalAnalyzer.analyze(&mono(sine(440.0, 0.5, 5.0, 44100), 44100), &AnalysisConfig::default());
        assert!(!output.is_degraded());
        assert_eq!(output.features[&Dimension::SilenceRatio], 0.0);
        assert!(output.features[&Dimension::TransientDensity] < 0.05);
        assert!(output.features[&Dimension::RhythmStability] < 0.2);
    }

    #[test]
    fn test_too_short_degrades() {
        let output = TemporalAnalyzer.analyze(&mono(vec![0.1; 100], 44100), &AnalysisConfig::default());
        assert!(matches!(output.degradation, Some(Degradation::TooShort { .. })));
        assert_eq!(output.features[&Dimension::TempoBpm], DEFAULT_BPM);
    }

    #[test]
    fn test_tempo_search_stays_in_range() {
        let rate = 44100.0 / 512.0;
        // Period of 0.2 s (300 BPM) must not be reported above MAX_BPM
        let envelope: Vec<f64> = (0..2000).map(|i| if i % 17 == 0 { 1.0 } else { 0.0 }).collect();
        let (tempo, stability) = tempo_from_envelope(&envelope, rate).unwrap();
        assert!((MIN_BPM..=MAX_BPM).contains(&tempo));
        assert!((0.0..=1.0).contains(&stability));
        assert!(tempo_from_envelope(&[0.0; 500], rate).is_none());
        assert!(tempo_from_envelope(&[1.0, 0.0, 1.0], rate).is_none());
    }
}
