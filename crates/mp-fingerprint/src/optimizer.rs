//! Query strategy selection
//!
//! Decides per request whether a cached fingerprint can be served as is,
//! served with a re-validation flag, or whether the caller has to run the
//! batch assembler.

use std::sync::atomic::{AtomicU64, Ordering};

use mp_core::AudioBuffer;
use serde::{Deserialize, Serialize};

use crate::assembler::FingerprintAssembler;
use crate::cache::{CachedFingerprint, ContentKey, FingerprintCache};
use crate::error::{FingerprintError, FingerprintResult};
use crate::validator::StreamingValidator;

/// How a fingerprint query is served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    /// Validated, high-confidence cache hit served directly
    Fast,
    /// Cache hit served with a request for background re-validation
    Accurate,
    /// Full batch analysis required
    Batch,
}

/// Confidence boundaries between strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for StrategyThresholds {
    fn default() -> Self {
        Self { high: 0.9, medium: 0.6 }
    }
}

impl StrategyThresholds {
    pub fn validate(&self) -> FingerprintResult<()> {
        let ordered = 0.0 <= self.medium && self.medium <= self.high && self.high <= 1.0;
        if !ordered {
            return Err(FingerprintError::Config(format!(
                "Strategy thresholds must satisfy 0 <= medium <= high <= 1, got {} / {}",
                self.medium, self.high
            )));
        }
        Ok(())
    }
}

/// Pick the strategy for one lookup outcome. Total over all inputs; a
/// non-finite confidence falls through to [`QueryStrategy::Batch`].
pub fn select_strategy(
    cache_hit: bool,
    confidence: f64,
    validated: bool,
    thresholds: &StrategyThresholds,
) -> QueryStrategy {
    if !cache_hit || !confidence.is_finite() {
        return QueryStrategy::Batch;
    }
    if validated && confidence >= thresholds.high {
        QueryStrategy::Fast
    } else if confidence >= thresholds.medium {
        QueryStrategy::Accurate
    } else {
        QueryStrategy::Batch
    }
}

/// Answer to a fingerprint query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// Cached fingerprint; `None` when the strategy is
    /// [`QueryStrategy::Batch`] and nothing has been computed yet
    pub fingerprint: Option<CachedFingerprint>,
    pub strategy: QueryStrategy,
    pub confidence: f64,
    pub needs_revalidation: bool,
}

/// Strategy counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    pub fast: u64,
    pub accurate: u64,
    pub batch: u64,
    /// Batch analyses run by [`QueryOptimizer::resolve`]
    pub batch_runs: u64,
}

impl QueryStats {
    pub fn total(&self) -> u64 {
        self.fast + self.accurate + self.batch
    }
}

#[derive(Debug, Default)]
struct AtomicStats {
    fast: AtomicU64,
    accurate: AtomicU64,
    batch: AtomicU64,
    batch_runs: AtomicU64,
}

/// Serves fingerprint queries from a [`FingerprintCache`]
#[derive(Debug, Default)]
pub struct QueryOptimizer {
    thresholds: StrategyThresholds,
    stats: AtomicStats,
}

impl QueryOptimizer {
    pub fn new(thresholds: StrategyThresholds) -> FingerprintResult<Self> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            stats: AtomicStats::default(),
        })
    }

    #[inline]
    pub fn thresholds(&self) -> &StrategyThresholds {
        &self.thresholds
    }

    /// Look `key` up and decide how to serve it
    pub fn query(&self, cache: &FingerprintCache, key: &ContentKey) -> QueryResponse {
        let lookup = cache.lookup(key);
        let (hit, confidence, validated) = match &lookup {
            Some(l) => (true, l.confidence, l.validated),
            None => (false, 0.0, false),
        };
        let strategy = select_strategy(hit, confidence, validated, &self.thresholds);

        let counter = match strategy {
            QueryStrategy::Fast => &self.stats.fast,
            QueryStrategy::Accurate => &self.stats.accurate,
            QueryStrategy::Batch => &self.stats.batch,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        log::debug!("Query {} -> {:?} (confidence {:.2})", key, strategy, confidence);

        QueryResponse {
            fingerprint: match strategy {
                QueryStrategy::Batch => None,
                _ => lookup.map(|l| l.fingerprint),
            },
            strategy,
            confidence,
            needs_revalidation: strategy == QueryStrategy::Accurate,
        }
    }

    /// Query, and when the batch path is selected run the assembler on
    /// `buffer` and store the result (validating any cached snapshot)
    pub fn resolve(
        &self,
        cache: &FingerprintCache,
        key: &ContentKey,
        buffer: &AudioBuffer,
        assembler: &FingerprintAssembler,
        validator: &StreamingValidator,
    ) -> FingerprintResult<QueryResponse> {
        let response = self.query(cache, key);
        if response.strategy != QueryStrategy::Batch {
            return Ok(response);
        }

        let fingerprint = assembler.analyze(buffer)?;
        self.stats.batch_runs.fetch_add(1, Ordering::Relaxed);
        if let Some(result) = cache.attach_batch(key, fingerprint.clone(), validator) {
            log::debug!(
                "Validated cached snapshot for {}: {:?} (valid: {})",
                key,
                result.confidence_level,
                result.is_valid
            );
        }

        Ok(QueryResponse {
            fingerprint: Some(CachedFingerprint::Batch(fingerprint)),
            strategy: QueryStrategy::Batch,
            confidence: 1.0,
            needs_revalidation: false,
        })
    }

    pub fn stats(&self) -> QueryStats {
        QueryStats {
            fast: self.stats.fast.load(Ordering::Relaxed),
            accurate: self.stats.accurate.load(Ordering::Relaxed),
            batch: self.stats.batch.load(Ordering::Relaxed),
            batch_runs: self.stats.batch_runs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_is_total() {
        let thresholds = StrategyThresholds::default();
        for hit in [false, true] {
            for validated in [false, true] {
                for step in 0..=100 {
                    let confidence = step as f64 / 100.0;
                    let strategy = select_strategy(hit, confidence, validated, &thresholds);
                    let expected = if !hit {
                        QueryStrategy::Batch
                    } else if validated && confidence >= 0.9 {
                        QueryStrategy::Fast
                    } else if confidence >= 0.6 {
                        QueryStrategy::Accurate
                    } else {
                        QueryStrategy::Batch
                    };
                    assert_eq!(strategy, expected, "hit={hit} validated={validated} confidence={confidence}");
                }
            }
        }
    }

    #[test]
    fn test_degenerate_confidence() {
        let t = StrategyThresholds::default();
        assert_eq!(select_strategy(true, f64::NAN, true, &t), QueryStrategy::Batch);
        assert_eq!(select_strategy(true, f64::INFINITY, true, &t), QueryStrategy::Batch);
        assert_eq!(select_strategy(false, 1.0, true, &t), QueryStrategy::Batch);
        assert_eq!(select_strategy(true, 1.0, false, &t), QueryStrategy::Accurate);
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        assert!(QueryOptimizer::new(StrategyThresholds { high: 0.5, medium: 0.7 }).is_err());
        assert!(QueryOptimizer::new(StrategyThresholds::default()).is_ok());
    }

    #[test]
    fn test_miss_counts_batch() {
        let optimizer = QueryOptimizer::default();
        let cache = FingerprintCache::default();
        let response = optimizer.query(&cache, &ContentKey::new("unknown"));
        assert_eq!(response.strategy, QueryStrategy::Batch);
        assert!(response.fingerprint.is_none());
        assert_eq!(optimizer.stats().batch, 1);
        assert_eq!(optimizer.stats().total(), 1);
    }
}
