//! Batch fingerprint assembly
//!
//! Runs the five analyzers over one read-only buffer, merges their outputs
//! by dimension key and validates the 25 values against their ranges.

use mp_core::AudioBuffer;
use rayon::prelude::*;

use crate::analyzers::{AnalyzerKind, AnalyzerOutput, Degradation};
use crate::config::AnalysisConfig;
use crate::error::FingerprintResult;
use crate::fingerprint::{Features, Fingerprint};

/// Fingerprint plus the analyzers that fell back to defaults
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub fingerprint: Fingerprint,
    pub degraded: Vec<(AnalyzerKind, Degradation)>,
}

impl AssemblyReport {
    /// True when every analyzer computed its features
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Batch fingerprint extractor
#[derive(Debug, Clone)]
pub struct FingerprintAssembler {
    config: AnalysisConfig,
}

impl Default for FingerprintAssembler {
    fn default() -> Self {
        Self {
            config: AnalysisConfig::default(),
        }
    }
}

impl FingerprintAssembler {
    pub fn new(config: AnalysisConfig) -> FingerprintResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Compute the full fingerprint of `buffer`.
    ///
    /// The buffer was validated on construction, so only out-of-range
    /// results can fail here.
    pub fn analyze(&self, buffer: &AudioBuffer) -> FingerprintResult<Fingerprint> {
        Ok(self.analyze_with_report(buffer)?.fingerprint)
    }

    /// Interleaved PCM entry point
    pub fn analyze_interleaved(
        &self,
        samples: &[f32],
        channels: usize,
        sample_rate: u32,
    ) -> FingerprintResult<Fingerprint> {
        let buffer = AudioBuffer::from_interleaved(samples, channels, sample_rate)?;
        self.analyze(&buffer)
    }

    pub fn analyze_with_report(&self, buffer: &AudioBuffer) -> FingerprintResult<AssemblyReport> {
        log::debug!(
            "Fingerprinting {:.2}s, {} ch @ {} Hz",
            buffer.duration_secs(),
            buffer.num_channels(),
            buffer.sample_rate()
        );

        let outputs: Vec<AnalyzerOutput> = if self.config.parallel {
            AnalyzerKind::ALL
                .as_slice()
                .par_iter()
                .map(|kind| kind.analyze(buffer, &self.config))
                .collect()
        } else {
            AnalyzerKind::ALL
                .iter()
                .map(|kind| kind.analyze(buffer, &self.config))
                .collect()
        };

        let mut features = Features::new();
        let mut degraded = Vec::new();
        for output in outputs {
            if let Some(reason) = output.degradation {
                log::warn!("{:?} analyzer used defaults: {}", output.kind, reason);
                degraded.push((output.kind, reason));
            }
            features.extend(output.features);
        }

        let fingerprint = Fingerprint::from_features(&features)?;
        Ok(AssemblyReport { fingerprint, degraded })
    }
}
