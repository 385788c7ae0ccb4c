//! Adaptive processing pipeline
//!
//! A fixed stage machine: EQ → dynamics → stereo width → loudness boost →
//! peak normalize → safety limit → done. Every stage takes the buffer and
//! the parameters of the profile being rendered, and reports peak and RMS
//! before and after itself.

use std::fmt;

use mp_core::AudioBuffer;
use mp_core::numeric::linear_to_db;
use serde::{Deserialize, Serialize};

use crate::dynamics::MasteringCompressor;
use crate::eq::MasteringEq;
use crate::error::MasterResult;
use crate::limiter::SafetyLimiter;
use crate::loudness::{LoudnessBoost, MAX_BOOST_DB, PeakNormalizer};
use crate::params::MasteringParameters;
use crate::stereo::StereoWidth;

// ============================================================================
// STAGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Eq,
    Dynamics,
    StereoWidth,
    LoudnessBoost,
    PeakNormalize,
    SafetyLimit,
}

impl Stage {
    /// Processing order
    pub const ORDER: [Stage; 6] = [
        Stage::Eq,
        Stage::Dynamics,
        Stage::StereoWidth,
        Stage::LoudnessBoost,
        Stage::PeakNormalize,
        Stage::SafetyLimit,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stage that follows this one, `None` after the limiter
    pub fn next(self) -> Option<Stage> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Stage::Eq => "EQ",
            Stage::Dynamics => "Dynamics",
            Stage::StereoWidth => "StereoWidth",
            Stage::LoudnessBoost => "LoudnessBoost",
            Stage::PeakNormalize => "PeakNormalize",
            Stage::SafetyLimit => "SafetyLimit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stage(Stage),
    Done,
}

impl PipelineState {
    pub const START: PipelineState = PipelineState::Stage(Stage::Eq);

    pub fn advance(self) -> PipelineState {
        match self {
            PipelineState::Stage(stage) => stage.next().map_or(PipelineState::Done, PipelineState::Stage),
            PipelineState::Done => PipelineState::Done,
        }
    }

    #[inline]
    pub fn is_done(self) -> bool {
        self == PipelineState::Done
    }
}

// ============================================================================
// REPORTS
// ============================================================================

/// Diagnostics of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub input_peak_db: f64,
    pub output_peak_db: f64,
    pub input_rms_db: f64,
    pub output_rms_db: f64,
    /// Gain the stage itself applied (dB): static for EQ and width,
    /// deepest reduction for the compressor
    pub gain_db: f64,
    /// Whether the stage changed the signal
    pub triggered: bool,
}

/// All six stage reports, in processing order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn input_rms_db(&self) -> Option<f64> {
        self.stages.first().map(|r| r.input_rms_db)
    }

    pub fn output_rms_db(&self) -> Option<f64> {
        self.stages.last().map(|r| r.output_rms_db)
    }

    pub fn output_peak_db(&self) -> Option<f64> {
        self.stages.last().map(|r| r.output_peak_db)
    }

    /// Output RMS minus input RMS (dB)
    pub fn rms_change_db(&self) -> Option<f64> {
        Some(self.output_rms_db()? - self.input_rms_db()?)
    }

    pub fn to_json(&self) -> MasterResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Runs the six stages over a whole buffer
#[derive(Debug, Clone)]
pub struct AdaptiveProcessingPipeline {
    max_boost_db: f64,
    limiter: SafetyLimiter,
}

impl Default for AdaptiveProcessingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveProcessingPipeline {
    pub fn new() -> Self {
        Self {
            max_boost_db: MAX_BOOST_DB,
            limiter: SafetyLimiter::new(),
        }
    }

    /// Validate `params`, then run every stage in order.
    ///
    /// Fails before touching any audio if a stage would reject its parameter.
    pub fn process(
        &self,
        buffer: &AudioBuffer,
        params: &MasteringParameters,
    ) -> MasterResult<(AudioBuffer, PipelineReport)> {
        params.validate()?;
        let normalizer = PeakNormalizer::new(params.target_peak_db)?;

        let mut output = buffer.clone();
        let mut report = PipelineReport::default();
        let mut state = PipelineState::START;

        while let PipelineState::Stage(stage) = state {
            let input_peak_db = output.peak_db();
            let input_rms_db = output.rms_db();
            let (gain_db, triggered) = match stage {
                Stage::Eq => self.apply_eq(&mut output, params),
                Stage::Dynamics => self.apply_dynamics(&mut output, params),
                Stage::StereoWidth => self.apply_width(&mut output, params),
                Stage::LoudnessBoost => {
                    let gain = LoudnessBoost::new(params.target_lufs)
                        .with_max_boost(self.max_boost_db)
                        .process(&mut output);
                    (gain, gain != 0.0)
                }
                Stage::PeakNormalize => {
                    let gain = normalizer.process(&mut output);
                    (gain, gain < 0.0)
                }
                Stage::SafetyLimit => (0.0, self.limiter.process(&mut output)),
            };

            let stage_report = StageReport {
                stage,
                input_peak_db,
                output_peak_db: output.peak_db(),
                input_rms_db,
                output_rms_db: output.rms_db(),
                gain_db,
                triggered,
            };
            log::debug!(
                "{}: peak {:.2} -> {:.2} dBFS, rms {:.2} -> {:.2} dBFS{}",
                stage,
                stage_report.input_peak_db,
                stage_report.output_peak_db,
                stage_report.input_rms_db,
                stage_report.output_rms_db,
                if triggered { "" } else { " (bypassed)" }
            );
            report.stages.push(stage_report);
            state = state.advance();
        }

        if let Some(change) = report.rms_change_db() {
            log::info!("{} render: RMS {:+.2} dB", params.profile, change);
        }
        Ok((output, report))
    }

    fn apply_eq(&self, buffer: &mut AudioBuffer, params: &MasteringParameters) -> (f64, bool) {
        let mut eq = MasteringEq::new(buffer.sample_rate(), buffer.num_channels(), params.eq_gains_db);
        if eq.is_flat() {
            return (0.0, false);
        }
        buffer.process_channels(|channels| eq.process(channels));
        let strongest = params
            .eq_gains_db
            .iter()
            .copied()
            .fold(0.0f64, |acc, g| if g.abs() > acc.abs() { g } else { acc });
        (strongest, true)
    }

    fn apply_dynamics(&self, buffer: &mut AudioBuffer, params: &MasteringParameters) -> (f64, bool) {
        if params.dynamics.is_bypass() {
            return (0.0, false);
        }
        let threshold_db = buffer.rms_db() + params.dynamics.threshold_offset_db;
        let mut compressor = MasteringCompressor::new(buffer.sample_rate(), threshold_db, &params.dynamics);
        buffer.process_channels(|channels| compressor.process(channels));
        let reduction = compressor.max_reduction_db();
        (-reduction, reduction > 0.0)
    }

    fn apply_width(&self, buffer: &mut AudioBuffer, params: &MasteringParameters) -> (f64, bool) {
        let width = StereoWidth::new(params.stereo_width);
        if !width.is_active(buffer.num_channels()) {
            return (0.0, false);
        }
        buffer.process_channels(|channels| width.process(channels));
        (linear_to_db(params.stereo_width), true)
    }
}
