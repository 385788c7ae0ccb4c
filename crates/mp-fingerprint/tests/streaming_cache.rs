//! Streaming engine, cache, validator and query optimizer working together

use std::sync::Arc;
use std::time::Duration;

use mp_core::AudioBuffer;
use mp_fingerprint::{
    AnalysisConfig, CacheConfig, CachedFingerprint, ConfidenceLevel, ContentKey, Dimension, FingerprintAssembler,
    FingerprintCache, ManualClock, QueryOptimizer, QueryStrategy, StreamingFingerprint, StreamingFingerprintEngine,
    StreamingValidator, ValidationState,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const SAMPLE_RATE: u32 = 44100;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Ten seconds of a steady stereo tone over low noise
fn stationary(seed: u64) -> AudioBuffer {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = 10 * SAMPLE_RATE as usize;
    let mut left = Vec::with_capacity(n);
    let mut right = Vec::with_capacity(n);
    for i in 0..n {
        let t = i as f64 / SAMPLE_RATE as f64;
        let tone = 0.3 * (2.0 * std::f64::consts::PI * 220.0 * t).sin();
        left.push((tone + 0.02 * (rng.random::<f64>() * 2.0 - 1.0)) as f32);
        right.push((tone * 0.9 + 0.02 * (rng.random::<f64>() * 2.0 - 1.0)) as f32);
    }
    AudioBuffer::stereo(left, right, SAMPLE_RATE).unwrap()
}

fn stream(buffer: &AudioBuffer, chunk_frames: usize) -> StreamingFingerprint {
    let mut engine =
        StreamingFingerprintEngine::new(buffer.sample_rate(), buffer.num_channels(), AnalysisConfig::default())
            .unwrap();
    for chunk in buffer.split(chunk_frames) {
        engine.update(&chunk).unwrap();
    }
    engine.snapshot()
}

#[test]
fn test_streaming_validates_against_batch() {
    init_logging();
    let buffer = stationary(1);
    let batch = FingerprintAssembler::default().analyze(&buffer).unwrap();
    let validator = StreamingValidator::default();

    for chunk_frames in [512, 4096, 44100] {
        let snapshot = stream(&buffer, chunk_frames);
        let result = validator.validate(&snapshot, &batch);
        assert!(
            result.is_valid,
            "chunk {chunk_frames}: similarity {:.3}, accuracy {:.3}",
            result.cosine_similarity,
            result.mean_accuracy
        );
        assert_ne!(result.confidence_level, ConfidenceLevel::Low);
        // Loudness and stereo come from the same accumulators as batch
        for dim in [Dimension::Lufs, Dimension::CrestDb, Dimension::StereoWidth, Dimension::PhaseCorrelation] {
            assert!((snapshot.get(dim).unwrap() - batch.get(dim)).abs() < 1e-9, "{dim}");
        }
    }
}

#[test]
fn test_snapshot_is_independent_of_chunking_for_level_and_stereo() {
    let buffer = stationary(2);
    let a = stream(&buffer, 1000);
    let b = stream(&buffer, 7777);
    for dim in [
        Dimension::Lufs,
        Dimension::CrestDb,
        Dimension::DynamicRangeVariation,
        Dimension::LoudnessVariation,
        Dimension::PeakConsistency,
        Dimension::StereoWidth,
        Dimension::PhaseCorrelation,
    ] {
        assert!((a.get(dim).unwrap() - b.get(dim).unwrap()).abs() < 1e-9, "{dim}");
    }
    assert_eq!(a.frames_observed(), b.frames_observed());
}

#[test]
fn test_cache_round_trip_with_streaming_snapshot() {
    let buffer = stationary(3);
    let key = ContentKey::from_audio(&buffer);
    let cache = FingerprintCache::default();
    let validator = StreamingValidator::default();

    let mut engine = StreamingFingerprintEngine::new(SAMPLE_RATE, 2, AnalysisConfig::default()).unwrap();
    for chunk in buffer.split(8192) {
        engine.update(&chunk).unwrap();
        assert!(cache.update_streaming(&key, engine.snapshot()));
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.state(&key), Some(ValidationState::Pending));

    let batch = FingerprintAssembler::default().analyze(&buffer).unwrap();
    let result = cache.attach_batch(&key, batch.clone(), &validator).unwrap();
    assert!(result.is_valid);
    assert_eq!(cache.state(&key), Some(ValidationState::Valid));

    // A fingerprint of unrelated material fails validation against the same
    // snapshot
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let noise: Vec<f32> = (0..SAMPLE_RATE as usize * 4).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect();
    let other = FingerprintAssembler::default()
        .analyze(&AudioBuffer::stereo(noise.clone(), noise.iter().map(|s| -s).collect(), SAMPLE_RATE).unwrap())
        .unwrap();
    let result = validator.validate(&engine.snapshot(), &other);
    assert!(!result.is_valid);
}

#[test]
fn test_optimizer_walks_from_batch_to_fast() {
    init_logging();
    let buffer = stationary(4);
    let key = ContentKey::new("library/track-4");
    let cache = FingerprintCache::default();
    let optimizer = QueryOptimizer::default();
    let assembler = FingerprintAssembler::default();
    let validator = StreamingValidator::default();

    // Nothing cached yet
    assert_eq!(optimizer.query(&cache, &key).strategy, QueryStrategy::Batch);

    // Two seconds streamed: hit, but confidence still low
    let mut engine = StreamingFingerprintEngine::new(SAMPLE_RATE, 2, AnalysisConfig::default()).unwrap();
    let chunks = buffer.split(SAMPLE_RATE as usize);
    for chunk in &chunks[..2] {
        engine.update(chunk).unwrap();
    }
    cache.update_streaming(&key, engine.snapshot());
    let early = optimizer.query(&cache, &key);
    assert_eq!(early.strategy, QueryStrategy::Batch);
    assert!(early.fingerprint.is_none());

    // All ten seconds: medium confidence, served but flagged
    for chunk in &chunks[2..] {
        engine.update(chunk).unwrap();
    }
    cache.update_streaming(&key, engine.snapshot());
    let later = optimizer.query(&cache, &key);
    assert_eq!(later.strategy, QueryStrategy::Accurate);
    assert!(later.needs_revalidation);
    assert!(matches!(later.fingerprint, Some(CachedFingerprint::Streaming(_))));

    // Resolving runs the batch path only when the strategy asks for it
    let resolved = optimizer.resolve(&cache, &key, &buffer, &assembler, &validator).unwrap();
    assert_eq!(resolved.strategy, QueryStrategy::Accurate);
    assert_eq!(optimizer.stats().batch_runs, 0);

    cache.attach_batch(&key, assembler.analyze(&buffer).unwrap(), &validator);
    let fast = optimizer.query(&cache, &key);
    assert_eq!(fast.strategy, QueryStrategy::Fast);
    assert_eq!(fast.confidence, 1.0);
    assert!(matches!(fast.fingerprint, Some(CachedFingerprint::Batch(_))));
}

#[test]
fn test_resolve_runs_batch_on_miss() {
    let buffer = stationary(5);
    let key = ContentKey::from_audio(&buffer);
    let cache = FingerprintCache::default();
    let optimizer = QueryOptimizer::default();

    let response = optimizer
        .resolve(&cache, &key, &buffer, &FingerprintAssembler::default(), &StreamingValidator::default())
        .unwrap();
    assert_eq!(response.strategy, QueryStrategy::Batch);
    assert!(matches!(response.fingerprint, Some(CachedFingerprint::Batch(_))));
    assert_eq!(optimizer.stats().batch_runs, 1);
    assert_eq!(optimizer.query(&cache, &key).strategy, QueryStrategy::Fast);
}

#[test]
fn test_expired_entries_fall_back_to_batch() {
    init_logging();
    let clock = Arc::new(ManualClock::new());
    let cache = FingerprintCache::with_clock(
        CacheConfig {
            capacity: 16,
            ttl: Duration::from_secs(30),
        },
        clock.clone(),
    );
    let optimizer = QueryOptimizer::default();
    let buffer = stationary(6);
    let key = ContentKey::new("expiring");
    cache.attach_batch(&key, FingerprintAssembler::default().analyze(&buffer).unwrap(), &StreamingValidator::default());

    assert_eq!(optimizer.query(&cache, &key).strategy, QueryStrategy::Fast);
    clock.advance(Duration::from_secs(31));
    assert_eq!(optimizer.query(&cache, &key).strategy, QueryStrategy::Batch);
    assert_eq!(cache.stats().expirations, 1);
}

#[test]
fn test_concurrent_updates_keep_the_most_confident_snapshot() {
    init_logging();
    const WRITERS: u64 = 4;
    const STEPS: u64 = 25;

    let batch = FingerprintAssembler::default().analyze(&stationary(7)).unwrap();
    let snapshot =
        |confidence: f64| StreamingFingerprint::from_fingerprint(&batch, confidence, 0, SAMPLE_RATE).unwrap();
    let cache = FingerprintCache::default();
    let key = ContentKey::new("shared");
    let validator = StreamingValidator::default();
    assert!(cache.update_streaming(&key, snapshot(0.0)));

    std::thread::scope(|scope| {
        for writer in 0..WRITERS {
            let (cache, key, snapshot) = (&cache, &key, &snapshot);
            scope.spawn(move || {
                for step in 0..STEPS {
                    let confidence = (step * WRITERS + writer) as f64 / 100.0;
                    cache.update_streaming(key, snapshot(confidence));
                }
            });
        }
        for _ in 0..2 {
            let (cache, key) = (&cache, &key);
            scope.spawn(move || {
                for _ in 0..200 {
                    let hit = cache.lookup(key).unwrap();
                    assert!((0.0..=1.0).contains(&hit.confidence));
                }
            });
        }
        let (cache, key, batch, validator) = (&cache, &key, &batch, &validator);
        scope.spawn(move || {
            let result = cache.attach_batch(key, batch.clone(), validator).unwrap();
            assert!(result.is_valid);
        });
    });

    let best = (STEPS * WRITERS - 1) as f64 / 100.0;
    let stored = cache.streaming(&key).unwrap();
    assert!((stored.overall_confidence() - best).abs() < 1e-12);

    let stats = cache.stats();
    assert_eq!(stats.validations, 1);
    assert_eq!(stats.insertions, 1);
    assert_eq!(stats.hits, 400);
    assert_eq!(cache.state(&key), Some(ValidationState::Valid));
    assert!(cache.lookup(&key).unwrap().validated);
}
