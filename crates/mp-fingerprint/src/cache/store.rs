//! Fingerprint cache with TTL expiry, LRU eviction and one-shot validation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::clock::{Clock, SystemClock};
use super::key::ContentKey;
use super::lru::LruList;
use crate::dimension::Dimension;
use crate::fingerprint::Fingerprint;
use crate::streaming::StreamingFingerprint;
use crate::validator::{StreamingValidator, ValidationResult};

// ============ Config ============

/// Cache sizing and expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction
    pub capacity: usize,
    /// Lifetime of an entry after its last write
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Small, short-lived cache for interactive previews
    pub fn preview() -> Self {
        Self {
            capacity: 64,
            ttl: Duration::from_secs(300),
        }
    }
}

// ============ Entries ============

/// Validation lifecycle of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    /// No batch fingerprint yet
    Pending,
    Valid,
    Invalid,
}

/// Fingerprint served from the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CachedFingerprint {
    Batch(Fingerprint),
    Streaming(StreamingFingerprint),
}

impl CachedFingerprint {
    /// Value of `dim`; streaming fingerprints only carry their subset
    pub fn get(&self, dim: Dimension) -> Option<f64> {
        match self {
            CachedFingerprint::Batch(fp) => Some(fp.get(dim)),
            CachedFingerprint::Streaming(fp) => fp.get(dim),
        }
    }

    #[inline]
    pub fn is_batch(&self) -> bool {
        matches!(self, CachedFingerprint::Batch(_))
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    /// Batch fingerprint when available, otherwise the latest streaming one
    pub fingerprint: CachedFingerprint,
    pub confidence: f64,
    /// A batch fingerprint backs this entry
    pub validated: bool,
    pub state: ValidationState,
    /// Outcome of comparing the streaming snapshot with the batch result
    pub validation: Option<ValidationResult>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    streaming: Option<StreamingFingerprint>,
    batch: Option<Fingerprint>,
    state: ValidationState,
    validation: Option<ValidationResult>,
    inserted_at: Instant,
    expires_at: Instant,
    slot: usize,
}

impl CacheEntry {
    fn lookup(&self) -> Option<CacheLookup> {
        let (fingerprint, confidence, validated) = match (&self.batch, &self.streaming) {
            (Some(batch), _) => (CachedFingerprint::Batch(batch.clone()), 1.0, true),
            (None, Some(streaming)) => (
                CachedFingerprint::Streaming(streaming.clone()),
                streaming.overall_confidence(),
                false,
            ),
            (None, None) => return None,
        };
        Some(CacheLookup {
            fingerprint,
            confidence,
            validated,
            state: self.state,
            validation: self.validation.clone(),
        })
    }
}

// ============ Stats ============

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    /// Streaming snapshots that replaced an older one
    pub updates: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Validator runs
    pub validations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============ Cache ============

/// Shared fingerprint cache.
///
/// Every operation takes the single internal lock, so concurrent updates,
/// lookups and validations on one key are serialized.
#[derive(Debug)]
pub struct FingerprintCache {
    clock: Arc<dyn Clock>,
    inner: Mutex<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    config: CacheConfig,
    entries: HashMap<ContentKey, CacheEntry>,
    lru: LruList<ContentKey>,
    stats: CacheStats,
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl FingerprintCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(mut config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        config.capacity = config.capacity.max(1);
        Self {
            clock,
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(config.capacity),
                lru: LruList::with_capacity(config.capacity),
                config,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.inner.lock().config.clone()
    }

    /// Store a streaming snapshot.
    ///
    /// The first snapshot creates the entry. Later snapshots replace the
    /// stored one only when their overall confidence does not drop. Returns
    /// whether the snapshot was stored.
    pub fn update_streaming(&self, key: &ContentKey, snapshot: StreamingFingerprint) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.expire_if_stale(key, now);
        let ttl = inner.config.ttl;

        if let Some(entry) = inner.entries.get_mut(key) {
            let current = entry.streaming.as_ref().map_or(0.0, StreamingFingerprint::overall_confidence);
            let stored = entry.streaming.is_none() || snapshot.overall_confidence() >= current;
            if stored {
                entry.streaming = Some(snapshot);
                entry.expires_at = now + ttl;
            }
            let slot = entry.slot;
            inner.lru.touch(slot);
            if stored {
                inner.stats.updates += 1;
            }
            return stored;
        }

        inner.insert(
            key.clone(),
            CacheEntry {
                streaming: Some(snapshot),
                batch: None,
                state: ValidationState::Pending,
                validation: None,
                inserted_at: now,
                expires_at: now + ttl,
                slot: 0,
            },
        );
        true
    }

    /// Look up `key`, dropping it if it has expired
    pub fn lookup(&self, key: &ContentKey) -> Option<CacheLookup> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.expire_if_stale(key, now);

        let found = inner.entries.get(key).map(|entry| (entry.slot, entry.lookup()));
        match found {
            Some((slot, Some(lookup))) => {
                inner.lru.touch(slot);
                inner.stats.hits += 1;
                Some(lookup)
            }
            _ => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Attach the batch fingerprint for `key` and validate the streaming
    /// snapshot against it.
    ///
    /// Validation runs once per batch fingerprint: attaching the same
    /// fingerprint again returns the stored result, a different one
    /// supersedes it and re-runs validation. Without a streaming snapshot
    /// the batch is stored as valid and `None` is returned.
    pub fn attach_batch(
        &self,
        key: &ContentKey,
        batch: Fingerprint,
        validator: &StreamingValidator,
    ) -> Option<ValidationResult> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.expire_if_stale(key, now);
        let ttl = inner.config.ttl;

        if !inner.entries.contains_key(key) {
            inner.insert(
                key.clone(),
                CacheEntry {
                    streaming: None,
                    batch: Some(batch),
                    state: ValidationState::Valid,
                    validation: None,
                    inserted_at: now,
                    expires_at: now + ttl,
                    slot: 0,
                },
            );
            return None;
        }
        let entry = inner.entries.get_mut(key)?;

        if entry.batch.as_ref() == Some(&batch) {
            return entry.validation.clone();
        }
        if entry.batch.is_some() {
            log::debug!("Batch fingerprint for {} superseded", key);
        }

        let validation = entry.streaming.as_ref().map(|streaming| validator.validate(streaming, &batch));
        entry.state = match &validation {
            Some(result) if !result.is_valid => {
                log::warn!(
                    "Streaming fingerprint for {} failed validation (similarity {:.3})",
                    key,
                    result.cosine_similarity
                );
                ValidationState::Invalid
            }
            _ => ValidationState::Valid,
        };
        entry.batch = Some(batch);
        entry.validation = validation.clone();
        entry.expires_at = now + ttl;
        let slot = entry.slot;

        inner.lru.touch(slot);
        if validation.is_some() {
            inner.stats.validations += 1;
        }
        validation
    }

    /// Latest stored streaming snapshot for `key`, even once a batch
    /// fingerprint backs the entry
    pub fn streaming(&self, key: &ContentKey) -> Option<StreamingFingerprint> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .and_then(|e| e.streaming.clone())
    }

    /// Validation state of `key`, if cached and fresh
    pub fn state(&self, key: &ContentKey) -> Option<ValidationState> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner.entries.get(key).filter(|e| e.expires_at > now).map(|e| e.state)
    }

    /// Age of the entry for `key`
    pub fn age(&self, key: &ContentKey) -> Option<Duration> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| now.saturating_duration_since(e.inserted_at))
    }

    pub fn contains(&self, key: &ContentKey) -> bool {
        self.state(key).is_some()
    }

    pub fn remove(&self, key: &ContentKey) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Drop every expired entry; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let stale: Vec<ContentKey> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            inner.remove(key);
        }
        inner.stats.expirations += stale.len() as u64;
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.lru.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

impl CacheInner {
    fn insert(&mut self, key: ContentKey, mut entry: CacheEntry) {
        while self.entries.len() >= self.config.capacity {
            match self.lru.pop_back() {
                Some(evicted) => {
                    log::debug!("Evicting fingerprint {}", evicted);
                    self.entries.remove(&evicted);
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }
        entry.slot = self.lru.push_front(key.clone());
        self.entries.insert(key, entry);
        self.stats.insertions += 1;
        debug_assert_eq!(self.lru.len(), self.entries.len());
    }

    fn remove(&mut self, key: &ContentKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(entry.slot);
        debug_assert_eq!(self.lru.len(), self.entries.len());
        Some(entry)
    }

    fn expire_if_stale(&mut self, key: &ContentKey, now: Instant) {
        let stale = self.entries.get(key).is_some_and(|e| e.expires_at <= now);
        if stale {
            self.remove(key);
            self.stats.expirations += 1;
        }
    }
}
