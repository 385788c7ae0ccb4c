//! Fingerprint invariants over synthetic material
//!
//! Random, silent, clipped and pure-tone buffers must all produce complete,
//! finite, in-range fingerprints, and identical input must always produce
//! identical output.

use mp_core::AudioBuffer;
use mp_fingerprint::{AnalysisConfig, Dimension, Fingerprint, FingerprintAssembler, FINGERPRINT_DIMENSIONS};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

// ============================================================================
// TEST UTILITIES
// ============================================================================

const SAMPLE_RATE: u32 = 44100;

fn sine(freq: f64, amplitude: f64, seconds: f64) -> Vec<f32> {
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    (0..n)
        .map(|i| (amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / SAMPLE_RATE as f64).sin()) as f32)
        .collect()
}

fn random(seconds: f64, amplitude: f32, rng: &mut ChaCha8Rng) -> Vec<f32> {
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    (0..n).map(|_| (rng.random::<f32>() * 2.0 - 1.0) * amplitude).collect()
}

/// Full-scale square-ish signal with random polarity flips
fn clipped(seconds: f64, rng: &mut ChaCha8Rng) -> Vec<f32> {
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    let mut sign = 1.0f32;
    (0..n)
        .map(|_| {
            if rng.random::<f32>() < 0.01 {
                sign = -sign;
            }
            sign
        })
        .collect()
}

/// The synthetic corpus: one entry per kind of edge material
fn corpus(seed: u64) -> Vec<(&'static str, AudioBuffer)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let stereo = |l: Vec<f32>, r: Vec<f32>| AudioBuffer::stereo(l, r, SAMPLE_RATE).unwrap();
    let mono = |s: Vec<f32>| AudioBuffer::mono(s, SAMPLE_RATE).unwrap();

    vec![
        ("silence", stereo(vec![0.0; 44100], vec![0.0; 44100])),
        ("full_scale_dc", mono(vec![1.0; 44100])),
        ("negative_full_scale", stereo(vec![-1.0; 22050], vec![1.0; 22050])),
        ("single_sample", mono(vec![0.5])),
        ("tiny", mono(vec![1e-30; 3000])),
        ("pure_tone", mono(sine(440.0, 0.5, 2.0))),
        ("low_tone", stereo(sine(30.0, 0.9, 2.0), sine(30.0, 0.9, 2.0))),
        ("random", stereo(random(2.0, 1.0, &mut rng), random(2.0, 1.0, &mut rng))),
        ("quiet_random", mono(random(2.0, 0.001, &mut rng))),
        ("clipped", stereo(clipped(2.0, &mut rng), clipped(2.0, &mut rng))),
    ]
}

fn assert_in_range(name: &str, fp: &Fingerprint) {
    assert_eq!(fp.values().len(), FINGERPRINT_DIMENSIONS);
    for (dim, value) in fp.iter() {
        assert!(value.is_finite(), "{name}: {dim} is not finite");
        assert!(dim.contains(value), "{name}: {dim} = {value} outside {:?}", dim.range());
    }
}

// ============================================================================
// INVARIANTS
// ============================================================================

#[test]
fn test_every_input_yields_finite_in_range_fingerprint() {
    let assembler = FingerprintAssembler::default();
    for seed in [1, 2, 3] {
        for (name, buffer) in corpus(seed) {
            let fp = assembler
                .analyze(&buffer)
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_in_range(name, &fp);
        }
    }
}

#[test]
fn test_analysis_is_deterministic() {
    let assembler = FingerprintAssembler::default();
    for (name, buffer) in corpus(7) {
        let a = assembler.analyze(&buffer).unwrap();
        let b = assembler.analyze(&buffer).unwrap();
        for (x, y) in a.values().iter().zip(b.values()) {
            assert_eq!(x.to_bits(), y.to_bits(), "{name}");
        }
    }
}

#[test]
fn test_parallel_and_sequential_agree() {
    let parallel = FingerprintAssembler::default();
    let sequential = FingerprintAssembler::new(AnalysisConfig::sequential()).unwrap();
    for (name, buffer) in corpus(11) {
        assert_eq!(parallel.analyze(&buffer).unwrap(), sequential.analyze(&buffer).unwrap(), "{name}");
    }
}

#[test]
fn test_fast_preset_stays_in_range() {
    let assembler = FingerprintAssembler::new(AnalysisConfig::fast()).unwrap();
    for (name, buffer) in corpus(5) {
        assert_in_range(name, &assembler.analyze(&buffer).unwrap());
    }
}

#[test]
fn test_input_errors_are_fatal() {
    let assembler = FingerprintAssembler::default();
    assert!(assembler.analyze_interleaved(&[], 2, SAMPLE_RATE).is_err());
    assert!(assembler.analyze_interleaved(&[0.1; 10], 2, 0).is_err());
    assert!(assembler.analyze_interleaved(&[0.1; 9], 2, SAMPLE_RATE).is_err());
    assert!(AudioBuffer::mono(vec![f32::NAN; 10], SAMPLE_RATE).is_err());
}

// ============================================================================
// CHARACTER
// ============================================================================

#[test]
fn test_louder_material_reads_louder() {
    let assembler = FingerprintAssembler::default();
    let quiet = assembler
        .analyze(&AudioBuffer::mono(sine(1000.0, 0.05, 2.0), SAMPLE_RATE).unwrap())
        .unwrap();
    let loud = assembler
        .analyze(&AudioBuffer::mono(sine(1000.0, 0.5, 2.0), SAMPLE_RATE).unwrap())
        .unwrap();
    let delta = loud.get(Dimension::Lufs) - quiet.get(Dimension::Lufs);
    assert!((delta - 20.0).abs() < 0.5, "delta = {delta}");
}

#[test]
fn test_bright_noise_beats_tone_on_flatness() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let assembler = FingerprintAssembler::default();
    let noise = assembler
        .analyze(&AudioBuffer::mono(random(2.0, 0.5, &mut rng), SAMPLE_RATE).unwrap())
        .unwrap();
    let tone = assembler
        .analyze(&AudioBuffer::mono(sine(440.0, 0.5, 2.0), SAMPLE_RATE).unwrap())
        .unwrap();
    assert!(noise.get(Dimension::SpectralFlatness) > tone.get(Dimension::SpectralFlatness));
    assert!(noise.get(Dimension::SpectralCentroid) > tone.get(Dimension::SpectralCentroid));
    assert!(tone.get(Dimension::HarmonicRatio) > noise.get(Dimension::HarmonicRatio));
}
