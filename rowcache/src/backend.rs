//! Cache backend contract.
//!
//! Thin contract over an external key-value store. The store is assumed
//! shared across processes but neither durable nor strongly consistent;
//! TTL and eviction are entirely its responsibility. Coherence is built on
//! top of this contract by the fetcher and the invalidation hook, not
//! inside it.

use async_trait::async_trait;
use std::time::Duration;

use rowcache_core::{BackendError, CachedPayload};

use crate::key::CacheKey;

/// Pluggable cache backend.
///
/// Implementations must be thread-safe and support concurrent access from
/// many request handlers. Values are [`CachedPayload`]s; implementations
/// that store bytes serialize through serde (see [`encode_payload`] /
/// [`decode_payload`]).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the payload stored under a key, or `None` on miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedPayload>, BackendError>;

    /// Unconditionally store a payload. Invalidation uses this to write
    /// tombstones over whatever the key currently holds.
    async fn set(
        &self,
        key: &CacheKey,
        payload: CachedPayload,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError>;

    /// Store a payload only if the key currently holds nothing.
    ///
    /// Returns `false` when the key is occupied, including by a tombstone.
    /// This is the write the read-through fill uses, so a concurrent
    /// invalidation is never clobbered by a stale fill.
    async fn add_if_absent(
        &self,
        key: &CacheKey,
        payload: CachedPayload,
        ttl: Option<Duration>,
    ) -> Result<bool, BackendError>;

    /// Hard-delete a key. Invalidation prefers tombstones; this exists for
    /// operational use.
    async fn delete(&self, key: &CacheKey) -> Result<(), BackendError>;

    /// Drop everything. Test and operational use only.
    async fn clear(&self) -> Result<(), BackendError>;

    /// Usage counters.
    async fn stats(&self) -> Result<CacheStats, BackendError>;

    /// Release the backend's resources at shutdown. Construction is the
    /// matching initialization step; there is no ambient global to tear
    /// down. The default is a no-op for backends with nothing to flush.
    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Number of conditional fills rejected because the key was occupied.
    pub rejected_fills: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Serialize a payload to the bytes a byte-oriented store keeps.
pub fn encode_payload(payload: &CachedPayload) -> Result<Vec<u8>, BackendError> {
    serde_json::to_vec(payload).map_err(|e| BackendError::Codec {
        reason: e.to_string(),
    })
}

/// Deserialize a payload from stored bytes.
pub fn decode_payload(bytes: &[u8]) -> Result<CachedPayload, BackendError> {
    serde_json::from_slice(bytes).map_err(|e| BackendError::Codec {
        reason: e.to_string(),
    })
}
