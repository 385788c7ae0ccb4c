//! End-to-end mastering regressions
//!
//! Guards the two historical failure modes of the render path: runaway
//! loudness after the safety limiter, and profiles collapsing onto the same
//! output because the peak target ignored the profile.

use mp_core::AudioBuffer;
use mp_fingerprint::{Dimension, FingerprintAssembler};
use mp_master::{
    AdaptiveProcessingPipeline, ContinuousParameterMapper, MasterError, MasteringEngine, RecordingProfile,
    SAFETY_CEILING_DB, Stage,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

// ============================================================================
// TEST UTILITIES
// ============================================================================

const SAMPLE_RATE: u32 = 44100;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Mono 1 kHz sine at the given RMS level
fn sine_at_rms(rms_db: f64, seconds: f64) -> AudioBuffer {
    let amplitude = 10f64.powf(rms_db / 20.0) * std::f64::consts::SQRT_2;
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    let samples = (0..n)
        .map(|i| (amplitude * (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / SAMPLE_RATE as f64).sin()) as f32)
        .collect();
    AudioBuffer::mono(samples, SAMPLE_RATE).unwrap()
}

fn stereo_noise(amplitude: f32, seconds: f64, seed: u64) -> AudioBuffer {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    let mut noise = |_: usize| (rng.random::<f32>() * 2.0 - 1.0) * amplitude;
    let left: Vec<f32> = (0..n).map(&mut noise).collect();
    let right: Vec<f32> = (0..n).map(&mut noise).collect();
    AudioBuffer::stereo(left, right, SAMPLE_RATE).unwrap()
}

/// Low noise floor with sparse full-scale spikes: a large crest factor that
/// puts the peaks far over full scale once the loudness stage lifts the floor
fn spiky(seconds: f64, seed: u64) -> AudioBuffer {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    let samples: Vec<f32> = (0..n)
        .map(|i| match i % 2205 {
            0 if (i / 2205) % 2 == 0 => 1.0,
            0 => -1.0,
            _ => (rng.random::<f32>() * 2.0 - 1.0) * 0.05,
        })
        .collect();
    AudioBuffer::stereo(samples.clone(), samples, SAMPLE_RATE).unwrap()
}

fn ceiling() -> f64 {
    SAFETY_CEILING_DB + 1e-3
}

// ============================================================================
// LOUDNESS
// ============================================================================

#[test]
fn test_minus_12_db_tone_gets_moderate_boost() {
    init_logging();
    let input = sine_at_rms(-12.0, 5.0);
    let result = MasteringEngine::new().master_with_profile(&input, "adaptive").unwrap();

    let boost = result.buffer.rms_db() - input.rms_db();
    assert!((3.0..=5.0).contains(&boost), "RMS boost {boost:.2} dB");
    assert!(result.buffer.peak_db() <= ceiling());

    // The boost follows what the parameters asked for
    let expected = result.parameters.target_lufs - result.fingerprint.get(Dimension::Lufs);
    assert!((boost - expected).abs() <= 1.0, "boost {boost:.2}, expected {expected:.2}");

    let reported = result.report.rms_change_db().unwrap();
    assert!((reported - boost).abs() < 1e-9);
}

#[test]
fn test_limiter_never_adds_loudness() {
    init_logging();
    let mapper = ContinuousParameterMapper::default();
    let assembler = FingerprintAssembler::default();
    let pipeline = AdaptiveProcessingPipeline::new();

    for seed in 0..3 {
        let input = spiky(2.0, seed);
        let fingerprint = assembler.analyze(&input).unwrap();
        let mut params = mapper.map(&fingerprint, RecordingProfile::Punchy);
        // Normalize to full scale so the limiter has work to do
        params.target_peak_db = 0.0;

        let (output, report) = pipeline.process(&input, &params).unwrap();
        let limit = report.stage(Stage::SafetyLimit).unwrap();
        assert!(limit.triggered);
        assert!(limit.output_peak_db <= ceiling());
        assert!(limit.output_rms_db <= limit.input_rms_db);
        assert_eq!(limit.gain_db, 0.0);
        assert!(output.peak_db() <= ceiling());
    }
}

#[test]
fn test_every_profile_respects_ceiling() {
    init_logging();
    let engine = MasteringEngine::new();
    for (seed, amplitude) in [(1, 0.05), (2, 0.5), (3, 1.0)] {
        let input = stereo_noise(amplitude, 2.0, seed);
        for result in engine.master_all_profiles(&input).unwrap() {
            assert!(
                result.buffer.peak_db() <= ceiling(),
                "{}: peak {:.2} dBFS",
                result.parameters.profile,
                result.buffer.peak_db()
            );
            assert!(result.buffer.channels().iter().flatten().all(|s| s.is_finite()));
        }
    }
}

// ============================================================================
// PROFILES
// ============================================================================

#[test]
fn test_profiles_render_differently() {
    init_logging();
    let input = sine_at_rms(-12.0, 5.0);
    let results = MasteringEngine::new().master_all_profiles(&input).unwrap();

    for (i, a) in results.iter().enumerate() {
        for b in &results[i + 1..] {
            let (pa, pb) = (a.parameters.profile, b.parameters.profile);
            assert!(
                (a.parameters.target_peak_db - b.parameters.target_peak_db).abs() >= 0.5,
                "{pa} vs {pb}: identical peak targets"
            );
            assert!(
                (a.parameters.target_lufs - b.parameters.target_lufs).abs() >= 0.5,
                "{pa} vs {pb}: identical loudness targets"
            );
            assert!(
                (a.buffer.rms_db() - b.buffer.rms_db()).abs() >= 0.15,
                "{pa} vs {pb}: identical output RMS"
            );
        }
    }
}

#[test]
fn test_peak_normalizer_uses_profile_target() {
    init_logging();
    let input = stereo_noise(0.3, 2.0, 7);
    let engine = MasteringEngine::new();
    for profile in RecordingProfile::ALL {
        let result = engine.master(&input, profile).unwrap();
        let normalize = result.report.stage(Stage::PeakNormalize).unwrap();
        if normalize.triggered {
            assert!((normalize.output_peak_db - profile.target_peak_db()).abs() < 0.01, "{profile}");
        } else {
            assert!(normalize.input_peak_db <= profile.target_peak_db(), "{profile}");
        }
    }
}

#[test]
fn test_gentle_never_louder_than_adaptive() {
    let engine = MasteringEngine::new();
    for rms_db in [-40.0, -24.0, -12.0, -6.0] {
        let input = sine_at_rms(rms_db, 2.0);
        let gentle = engine.master(&input, RecordingProfile::Gentle).unwrap();
        let adaptive = engine.master(&input, RecordingProfile::Adaptive).unwrap();
        assert!(gentle.parameters.target_lufs <= adaptive.parameters.target_lufs, "{rms_db} dB");
    }
}

#[test]
fn test_quieter_input_never_gets_larger_boost_fraction() {
    let assembler = FingerprintAssembler::default();
    let mapper = ContinuousParameterMapper::default();
    let target = RecordingProfile::Adaptive.target_lufs();

    let mut previous = 0.0;
    for rms_db in [-48.0, -40.0, -32.0, -24.0, -18.0, -14.0] {
        let fingerprint = assembler.analyze(&sine_at_rms(rms_db, 2.0)).unwrap();
        let lufs = fingerprint.get(Dimension::Lufs);
        let params = mapper.map(&fingerprint, RecordingProfile::Adaptive);
        let fraction = (params.target_lufs - lufs) / (target - lufs);
        assert!(fraction >= previous - 1e-12, "{rms_db} dB: {fraction} < {previous}");
        previous = fraction;
    }
}

// ============================================================================
// PIPELINE CONTRACT
// ============================================================================

#[test]
fn test_stage_order_is_fixed() {
    let result = MasteringEngine::new()
        .master(&stereo_noise(0.2, 1.0, 11), RecordingProfile::Adaptive)
        .unwrap();
    let order: Vec<Stage> = result.report.stages.iter().map(|r| r.stage).collect();
    assert_eq!(order, Stage::ORDER);
}

#[test]
fn test_peak_target_above_full_scale_is_a_stage_error() {
    let input = sine_at_rms(-12.0, 1.0);
    let fingerprint = FingerprintAssembler::default().analyze(&input).unwrap();
    let mut params = ContinuousParameterMapper::default().map(&fingerprint, RecordingProfile::Adaptive);
    params.target_peak_db = 0.5;

    let err = AdaptiveProcessingPipeline::new().process(&input, &params).unwrap_err();
    assert!(
        matches!(err, MasterError::StageParameter { stage: Stage::PeakNormalize, .. }),
        "{err}"
    );
}

#[test]
fn test_rendering_is_deterministic() {
    let input = stereo_noise(0.25, 1.0, 5);
    let engine = MasteringEngine::new();
    let a = engine.master(&input, RecordingProfile::Punchy).unwrap();
    let b = engine.master(&input, RecordingProfile::Punchy).unwrap();
    assert_eq!(a.parameters, b.parameters);
    assert_eq!(a.buffer, b.buffer);
}
