//! Stereo-linked mastering compressor
//!
//! Peak detection across all channels drives a single gain so the image
//! does not shift. The threshold sits a fixed offset above the programme
//! RMS, which makes the offset the crest factor the compressor aims for.
//! No makeup gain: the loudness stage that follows owns level.

use crate::params::DynamicsParameters;

/// Detector floor (dB)
const DETECTOR_FLOOR_DB: f64 = -120.0;

#[derive(Debug, Clone)]
pub struct MasteringCompressor {
    threshold_db: f64,
    ratio: f64,
    knee_db: f64,
    attack_coeff: f64,
    release_coeff: f64,
    /// Smoothed gain reduction (dB, >= 0)
    reduction_db: f64,
    max_reduction_db: f64,
}

#[inline]
fn time_coeff(ms: f64, sample_rate: u32) -> f64 {
    let samples = ms * sample_rate as f64 / 1000.0;
    if samples <= 0.0 { 0.0 } else { (-1.0 / samples).exp() }
}

impl MasteringCompressor {
    /// `threshold_db` is absolute (dBFS)
    pub fn new(sample_rate: u32, threshold_db: f64, params: &DynamicsParameters) -> Self {
        Self {
            threshold_db,
            ratio: params.ratio.max(1.0),
            knee_db: params.knee_db.max(0.0),
            attack_coeff: time_coeff(params.attack_ms, sample_rate),
            release_coeff: time_coeff(params.release_ms, sample_rate),
            reduction_db: 0.0,
            max_reduction_db: 0.0,
        }
    }

    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    /// Deepest gain reduction seen so far (dB)
    pub fn max_reduction_db(&self) -> f64 {
        self.max_reduction_db
    }

    /// Static gain computer: reduction in dB for a detector level
    pub fn gain_reduction_db(&self, input_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;
        let over = input_db - self.threshold_db;
        let half_knee = self.knee_db / 2.0;

        if over <= -half_knee {
            0.0
        } else if over >= half_knee {
            slope * over
        } else {
            let x = over + half_knee;
            slope * x * x / (2.0 * self.knee_db)
        }
    }

    pub fn process(&mut self, channels: &mut [&mut [f32]]) {
        let frames = channels.iter().map(|ch| ch.len()).min().unwrap_or(0);
        for frame in 0..frames {
            let peak = channels.iter().fold(0.0f32, |acc, ch| acc.max(ch[frame].abs()));
            let input_db = if peak > 1e-6 {
                20.0 * (peak as f64).log10()
            } else {
                DETECTOR_FLOOR_DB
            };

            let target = self.gain_reduction_db(input_db);
            let coeff = if target > self.reduction_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * target;
            self.max_reduction_db = self.max_reduction_db.max(self.reduction_db);

            let gain = 10.0f64.powf(-self.reduction_db / 20.0) as f32;
            for channel in channels.iter_mut() {
                channel[frame] *= gain;
            }
        }
    }

    pub fn reset(&mut self) {
        self.reduction_db = 0.0;
        self.max_reduction_db = 0.0;
    }
}
