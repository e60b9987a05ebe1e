//! Shared in-memory cache backend.
//!
//! Behaves like the external store the contract assumes: opaque bytes
//! under string keys, TTL-based expiry, add-if-absent semantics. One
//! instance is shared by every handler in the process; cross-process
//! deployments swap in an adapter for their real store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use rowcache_core::{BackendError, CachedPayload};

use crate::backend::{decode_payload, encode_payload, CacheBackend, CacheStats};
use crate::key::CacheKey;

#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`CacheBackend`] with TTL support and usage counters.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, StoredEntry>>,
    stats: RwLock<CacheStats>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(payload: &CachedPayload, ttl: Option<Duration>) -> Result<StoredEntry, BackendError> {
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .map(|d| Utc::now() + d)
        });
        Ok(StoredEntry {
            bytes: encode_payload(payload)?,
            expires_at,
        })
    }

    /// Read a key without touching hit/miss counters. Test and
    /// diagnostics use.
    pub async fn peek(&self, key: &CacheKey) -> Result<Option<CachedPayload>, BackendError> {
        let entries = self.entries.read().await;
        match entries.get(key.as_str()) {
            Some(entry) if !entry.is_expired(Utc::now()) => Ok(Some(decode_payload(&entry.bytes)?)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedPayload>, BackendError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let expired = entries
            .get(key.as_str())
            .is_some_and(|entry| entry.is_expired(now));
        if expired {
            entries.remove(key.as_str());
        }
        let live = entries.get(key.as_str()).cloned();
        drop(entries);

        let mut stats = self.stats.write().await;
        match live {
            Some(entry) => {
                stats.hits += 1;
                drop(stats);
                Ok(Some(decode_payload(&entry.bytes)?))
            }
            None => {
                stats.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        key: &CacheKey,
        payload: CachedPayload,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let entry = Self::entry(&payload, ttl)?;
        let mut entries = self.entries.write().await;
        entries.insert(key.as_str().to_string(), entry);
        Ok(())
    }

    async fn add_if_absent(
        &self,
        key: &CacheKey,
        payload: CachedPayload,
        ttl: Option<Duration>,
    ) -> Result<bool, BackendError> {
        let entry = Self::entry(&payload, ttl)?;
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let occupied = entries
            .get(key.as_str())
            .is_some_and(|existing| !existing.is_expired(now));
        if occupied {
            drop(entries);
            self.stats.write().await.rejected_fills += 1;
            return Ok(false);
        }
        entries.insert(key.as_str().to_string(), entry);
        Ok(true)
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), BackendError> {
        self.entries.write().await.remove(key.as_str());
        Ok(())
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, BackendError> {
        let entry_count = self.entries.read().await.len() as u64;
        let mut stats = self.stats.read().await.clone();
        stats.entry_count = entry_count;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyDeriver;
    use rowcache_core::Value;

    fn key(name: &str) -> CacheKey {
        KeyDeriver::default().attribute_key("Item", name, "id", &Value::Integer(1))
    }

    #[tokio::test]
    async fn test_get_miss_then_set_then_hit() {
        let backend = MemoryBackend::new();
        let k = key("title");

        assert_eq!(backend.get(&k).await.expect("get should succeed"), None);

        backend
            .set(&k, CachedPayload::Scalar(Value::from("bob")), None)
            .await
            .expect("set should succeed");

        assert_eq!(
            backend.get(&k).await.expect("get should succeed"),
            Some(CachedPayload::Scalar(Value::from("bob")))
        );

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_add_if_absent_rejected_when_occupied() {
        let backend = MemoryBackend::new();
        let k = key("title");

        backend
            .set(&k, CachedPayload::Tombstone, None)
            .await
            .expect("set should succeed");

        let added = backend
            .add_if_absent(&k, CachedPayload::Scalar(Value::from("stale")), None)
            .await
            .expect("add should succeed");
        assert!(!added);

        // The tombstone survives the rejected fill.
        assert_eq!(
            backend.peek(&k).await.expect("peek should succeed"),
            Some(CachedPayload::Tombstone)
        );
        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.rejected_fills, 1);
    }

    #[tokio::test]
    async fn test_add_if_absent_succeeds_on_empty_key() {
        let backend = MemoryBackend::new();
        let k = key("title");

        let added = backend
            .add_if_absent(&k, CachedPayload::Nil, None)
            .await
            .expect("add should succeed");
        assert!(added);
        assert_eq!(
            backend.peek(&k).await.expect("peek should succeed"),
            Some(CachedPayload::Nil)
        );
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let backend = MemoryBackend::new();
        let k = key("title");

        backend
            .set(
                &k,
                CachedPayload::Tombstone,
                Some(Duration::from_millis(50)),
            )
            .await
            .expect("set should succeed");
        assert_eq!(
            backend.get(&k).await.expect("get should succeed"),
            Some(CachedPayload::Tombstone)
        );

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(backend.get(&k).await.expect("get should succeed"), None);

        // An expired tombstone no longer blocks fills.
        let added = backend
            .add_if_absent(&k, CachedPayload::Id(1), None)
            .await
            .expect("add should succeed");
        assert!(added);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let backend = MemoryBackend::new();
        let k = key("title");

        backend
            .set(&k, CachedPayload::Nil, None)
            .await
            .expect("set should succeed");
        backend.delete(&k).await.expect("delete should succeed");
        assert_eq!(backend.peek(&k).await.expect("peek should succeed"), None);

        backend
            .set(&k, CachedPayload::Nil, None)
            .await
            .expect("set should succeed");
        backend.clear().await.expect("clear should succeed");
        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.entry_count, 0);
    }
}
