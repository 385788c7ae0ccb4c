//! Fingerprint cache
//!
//! Holds the latest streaming snapshot per content key and, once the batch
//! analysis finishes, the batch fingerprint together with the outcome of
//! validating the snapshot against it. Entries expire after a TTL measured
//! on an injected [`Clock`] and are evicted least-recently-used first.

mod clock;
mod key;
mod lru;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::ContentKey;
pub use store::{CacheConfig, CacheLookup, CacheStats, CachedFingerprint, FingerprintCache, ValidationState};
