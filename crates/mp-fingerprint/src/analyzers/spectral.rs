//! Spectral balance and spectral shape

use mp_core::numeric::{self, EPSILON};
use mp_core::AudioBuffer;

use super::{AnalyzerKind, Degradation, FeatureAnalyzer};
use crate::config::AnalysisConfig;
use crate::dimension::Dimension;
use crate::fingerprint::Features;
use crate::framing::FrameSplitter;
use crate::stft::Stft;

/// Seven frequency bands whose energy shares sum to 1
pub const BANDS: [(Dimension, f64, f64); 7] = [
    (Dimension::SubBassPct, 20.0, 60.0),
    (Dimension::BassPct, 60.0, 250.0),
    (Dimension::LowMidPct, 250.0, 500.0),
    (Dimension::MidPct, 500.0, 2000.0),
    (Dimension::UpperMidPct, 2000.0, 4000.0),
    (Dimension::PresencePct, 4000.0, 6000.0),
    (Dimension::AirPct, 6000.0, 20000.0),
];

/// Per-frame spectral shape, each value normalized to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralShape {
    /// Magnitude-weighted mean frequency over Nyquist
    pub centroid: f64,
    /// Frequency below which `rolloff_fraction` of the energy lies, over Nyquist
    pub rolloff: f64,
    /// Geometric over arithmetic mean of the power spectrum
    pub flatness: f64,
}

/// Shape of one power spectrum; `None` for a silent frame
pub fn spectral_shape(power: &[f64], rolloff_fraction: f64) -> Option<SpectralShape> {
    if power.len() < 2 {
        return None;
    }
    let total: f64 = power.iter().sum();
    if total < 1e-12 {
        return None;
    }
    let top = (power.len() - 1) as f64;

    let mut weighted = 0.0;
    let mut magnitude_sum = 0.0;
    for (k, &p) in power.iter().enumerate() {
        let mag = p.sqrt();
        weighted += k as f64 * mag;
        magnitude_sum += mag;
    }
    let centroid = numeric::safe_divide(weighted, magnitude_sum * top, 0.0);

    let target = total * rolloff_fraction;
    let mut cumulative = 0.0;
    let mut rolloff_bin = power.len() - 1;
    for (k, &p) in power.iter().enumerate() {
        cumulative += p;
        if cumulative >= target {
            rolloff_bin = k;
            break;
        }
    }
    let rolloff = rolloff_bin as f64 / top;

    let floor = 1e-12;
    let log_mean = power.iter().map(|&p| (p + floor).ln()).sum::<f64>() / power.len() as f64;
    let arith_mean = total / power.len() as f64 + floor;
    let flatness = numeric::safe_divide(log_mean.exp(), arith_mean, 0.0);

    Some(SpectralShape {
        centroid: centroid.clamp(0.0, 1.0),
        rolloff: rolloff.clamp(0.0, 1.0),
        flatness: flatness.clamp(0.0, 1.0),
    })
}

/// Band energy shares and median spectral shape
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralAnalyzer;

impl FeatureAnalyzer for SpectralAnalyzer {
    const KIND: AnalyzerKind = AnalyzerKind::Spectral;

    const DIMENSIONS: &'static [Dimension] = &[
        Dimension::SubBassPct,
        Dimension::BassPct,
        Dimension::LowMidPct,
        Dimension::MidPct,
        Dimension::UpperMidPct,
        Dimension::PresencePct,
        Dimension::AirPct,
        Dimension::BassMidRatio,
        Dimension::SpectralCentroid,
        Dimension::SpectralRolloff,
        Dimension::SpectralFlatness,
    ];

    // Roughly pink-noise balance
    const DEFAULT_FEATURES: &'static [(Dimension, f64)] = &[
        (Dimension::SubBassPct, 0.05),
        (Dimension::BassPct, 0.20),
        (Dimension::LowMidPct, 0.15),
        (Dimension::MidPct, 0.25),
        (Dimension::UpperMidPct, 0.15),
        (Dimension::PresencePct, 0.08),
        (Dimension::AirPct, 0.12),
        (Dimension::BassMidRatio, 0.4),
        (Dimension::SpectralCentroid, 0.15),
        (Dimension::SpectralRolloff, 0.3),
        (Dimension::SpectralFlatness, 0.2),
    ];

    fn compute(&self, buffer: &AudioBuffer, config: &AnalysisConfig) -> Result<Features, Degradation> {
        let stft = Stft::new(config.fft_size, buffer.sample_rate()).map_err(|_| Degradation::Transform)?;
        let mono = buffer.mono_mix();

        let mut mean_power = vec![0.0f64; stft.num_bins()];
        let mut centroids = Vec::new();
        let mut rolloffs = Vec::new();
        let mut flatness = Vec::new();
        let mut transform_failed = false;

        let mut on_frame = |frame: &[f32]| {
            let Some(power) = stft.power_spectrum(frame) else {
                transform_failed = true;
                return;
            };
            for (acc, p) in mean_power.iter_mut().zip(&power) {
                *acc += p;
            }
            if let Some(shape) = spectral_shape(&power, config.rolloff_fraction) {
                centroids.push(shape.centroid);
                rolloffs.push(shape.rolloff);
                flatness.push(shape.flatness);
            }
        };

        let mut splitter = FrameSplitter::new(config.fft_size, config.hop_size);
        splitter.push(&mono, &mut on_frame);
        splitter.flush_padded(&mut on_frame);

        if transform_failed {
            return Err(Degradation::Transform);
        }
        if centroids.is_empty() {
            return Err(Degradation::Silent);
        }

        let nyquist = buffer.sample_rate() as f64 / 2.0;
        let band_energy: Vec<f64> = BANDS
            .iter()
            .map(|&(_, lo, hi)| {
                if lo >= nyquist {
                    return 0.0;
                }
                let start = stft.freq_to_bin(lo);
                let end = stft.freq_to_bin(hi.min(nyquist));
                mean_power[start..end.max(start)].iter().sum()
            })
            .collect();
        let band_total: f64 = band_energy.iter().sum();
        if band_total < EPSILON {
            return Err(Degradation::Silent);
        }

        let mut features = Features::new();
        for (&(dim, _, _), energy) in BANDS.iter().zip(&band_energy) {
            features.insert(dim, (energy / band_total).clamp(0.0, 1.0));
        }

        let bass = band_energy[1];
        let mid = band_energy[3];
        features.insert(
            Dimension::BassMidRatio,
            numeric::safe_divide(bass, bass + mid, 0.5).clamp(0.0, 1.0),
        );

        for (dim, values, fallback) in [
            (Dimension::SpectralCentroid, &centroids, 0.15),
            (Dimension::SpectralRolloff, &rolloffs, 0.3),
            (Dimension::SpectralFlatness, &flatness, 0.2),
        ] {
            features.insert(dim, dim.collapse(values, fallback));
        }

        Ok(features)
    }
}
