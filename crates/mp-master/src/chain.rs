//! Complete mastering chain
//!
//! Fingerprint → classification → parameters → pipeline.

use mp_core::AudioBuffer;
use mp_fingerprint::{Fingerprint, FingerprintAssembler};

use crate::classify::RecordingClassification;
use crate::error::MasterResult;
use crate::mapper::ContinuousParameterMapper;
use crate::params::MasteringParameters;
use crate::pipeline::{AdaptiveProcessingPipeline, PipelineReport};
use crate::profile::RecordingProfile;

/// Output of one render
#[derive(Debug, Clone)]
pub struct MasteringResult {
    pub buffer: AudioBuffer,
    /// Fingerprint of the input
    pub fingerprint: Fingerprint,
    pub classification: RecordingClassification,
    pub parameters: MasteringParameters,
    pub report: PipelineReport,
}

/// Fingerprint-driven mastering engine
#[derive(Debug, Default)]
pub struct MasteringEngine {
    assembler: FingerprintAssembler,
    mapper: ContinuousParameterMapper,
    pipeline: AdaptiveProcessingPipeline,
}

impl MasteringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_components(assembler: FingerprintAssembler, mapper: ContinuousParameterMapper) -> Self {
        Self {
            assembler,
            mapper,
            pipeline: AdaptiveProcessingPipeline::new(),
        }
    }

    pub fn assembler(&self) -> &FingerprintAssembler {
        &self.assembler
    }

    pub fn mapper(&self) -> &ContinuousParameterMapper {
        &self.mapper
    }

    /// Fingerprint `buffer` and render it with `profile`
    pub fn master(&self, buffer: &AudioBuffer, profile: RecordingProfile) -> MasterResult<MasteringResult> {
        let fingerprint = self.assembler.analyze(buffer)?;
        self.master_with_fingerprint(buffer, fingerprint, profile)
    }

    /// Like [`MasteringEngine::master`], with the profile given by name
    /// (`"adaptive"`, `"gentle"` or `"punchy"`, any case)
    pub fn master_with_profile(&self, buffer: &AudioBuffer, profile: &str) -> MasterResult<MasteringResult> {
        let profile: RecordingProfile = profile.parse()?;
        self.master(buffer, profile)
    }

    /// Render with a fingerprint computed elsewhere, e.g. served from a cache
    pub fn master_with_fingerprint(
        &self,
        buffer: &AudioBuffer,
        fingerprint: Fingerprint,
        profile: RecordingProfile,
    ) -> MasterResult<MasteringResult> {
        let classification = self.mapper.classifier().classify(&fingerprint);
        let parameters = self.mapper.map_classified(&fingerprint, &classification, profile);
        let (output, report) = self.pipeline.process(buffer, &parameters)?;

        Ok(MasteringResult {
            buffer: output,
            fingerprint,
            classification,
            parameters,
            report,
        })
    }

    /// Render every profile from one fingerprint
    pub fn master_all_profiles(&self, buffer: &AudioBuffer) -> MasterResult<Vec<MasteringResult>> {
        let fingerprint = self.assembler.analyze(buffer)?;
        RecordingProfile::ALL
            .iter()
            .map(|&profile| self.master_with_fingerprint(buffer, fingerprint.clone(), profile))
            .collect()
    }
}
