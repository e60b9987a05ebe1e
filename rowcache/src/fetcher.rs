//! Coalescing read-through core.
//!
//! `fetch` is the single seam through which every cached lookup passes:
//! one backend GET, at most one loader invocation, at most one conditional
//! backend write. The conditional write (add-if-absent, never a plain SET)
//! is what closes the stale-write race: an invalidation that tombstoned
//! the key between our GET and our fill wins, and the stale computed value
//! is silently discarded. Losing that race is an expected outcome, not a
//! failure, and is never logged as one.
//!
//! Backend unavailability degrades to always-miss: the loader runs, the
//! write is skipped, and the caller still gets a correct answer. The cache
//! is a performance optimization, never a correctness dependency.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rowcache_core::{CacheResult, CachedPayload, PayloadKind};

use crate::backend::CacheBackend;
use crate::key::CacheKey;

/// Read-through fetcher over one backend.
#[derive(Debug)]
pub struct Fetcher<B: CacheBackend> {
    backend: Arc<B>,
    value_ttl: Option<Duration>,
}

impl<B: CacheBackend> Fetcher<B> {
    pub fn new(backend: Arc<B>, value_ttl: Option<Duration>) -> Self {
        Self { backend, value_ttl }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Return the payload cached under `key`, or compute-and-store it.
    ///
    /// A stored payload counts as a hit only if its shape matches `kind`
    /// (a tombstone never does). On miss the loader runs against the
    /// source of truth; its result is encoded and offered to the backend
    /// with add-if-absent, and returned to the caller whether or not the
    /// backend accepted it.
    pub async fn fetch<F, Fut>(
        &self,
        key: &CacheKey,
        kind: PayloadKind,
        loader: F,
    ) -> CacheResult<CachedPayload>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<CachedPayload>>,
    {
        let mut backend_usable = true;
        match self.backend.get(key).await {
            Ok(Some(payload)) if payload.matches(kind) => {
                tracing::debug!(key = %key, "cache hit");
                return Ok(payload);
            }
            Ok(Some(_)) | Ok(None) => {
                // Plain miss, or a tombstone/foreign shape under the key;
                // both fall through to the loader.
                tracing::debug!(key = %key, "cache miss");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache backend unavailable, degrading to miss");
                backend_usable = false;
            }
        }

        let loaded = loader().await?;
        debug_assert!(
            !loaded.is_tombstone(),
            "loaders must never produce a tombstone"
        );

        if backend_usable {
            match self
                .backend
                .add_if_absent(key, loaded.clone(), self.value_ttl)
                .await
            {
                Ok(true) => tracing::debug!(key = %key, "cache filled"),
                // Lost to a concurrent write (typically a tombstone).
                Ok(false) => tracing::debug!(key = %key, "cache fill rejected"),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "cache fill skipped, backend unavailable");
                }
            }
        }

        Ok(loaded)
    }
}

impl<B: CacheBackend> Clone for Fetcher<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            value_ttl: self.value_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CacheStats;
    use crate::key::KeyDeriver;
    use crate::memory::MemoryBackend;
    use async_trait::async_trait;
    use rowcache_core::{BackendError, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> CacheKey {
        KeyDeriver::default().attribute_key("Item", "title", "id", &Value::Integer(1))
    }

    fn scalar(s: &str) -> CachedPayload {
        CachedPayload::Scalar(Value::from(s))
    }

    #[tokio::test]
    async fn test_hit_skips_the_loader() {
        let backend = Arc::new(MemoryBackend::new());
        let k = key();
        backend
            .set(&k, scalar("cached"), None)
            .await
            .expect("set should succeed");

        let fetcher = Fetcher::new(Arc::clone(&backend), None);
        let loader_calls = &AtomicUsize::new(0);

        let payload = fetcher
            .fetch(&k, PayloadKind::Scalar, || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok(scalar("fresh"))
            })
            .await
            .expect("fetch should succeed");

        assert_eq!(payload, scalar("cached"));
        assert_eq!(loader_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nil_hit_is_a_hit() {
        let backend = Arc::new(MemoryBackend::new());
        let k = key();
        backend
            .set(&k, CachedPayload::Nil, None)
            .await
            .expect("set should succeed");

        let fetcher = Fetcher::new(Arc::clone(&backend), None);
        let loader_calls = &AtomicUsize::new(0);

        let payload = fetcher
            .fetch(&k, PayloadKind::Scalar, || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok(scalar("fresh"))
            })
            .await
            .expect("fetch should succeed");

        assert_eq!(payload, CachedPayload::Nil);
        assert_eq!(loader_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_miss_runs_loader_once_and_fills() {
        let backend = Arc::new(MemoryBackend::new());
        let k = key();
        let fetcher = Fetcher::new(Arc::clone(&backend), None);
        let loader_calls = &AtomicUsize::new(0);

        let payload = fetcher
            .fetch(&k, PayloadKind::Scalar, || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok(scalar("fresh"))
            })
            .await
            .expect("fetch should succeed");

        assert_eq!(payload, scalar("fresh"));
        assert_eq!(loader_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            backend.peek(&k).await.expect("peek should succeed"),
            Some(scalar("fresh"))
        );
    }

    #[tokio::test]
    async fn test_tombstone_blocks_the_fill_but_answers_the_caller() {
        let backend = Arc::new(MemoryBackend::new());
        let k = key();
        backend
            .set(&k, CachedPayload::Tombstone, None)
            .await
            .expect("set should succeed");

        let fetcher = Fetcher::new(Arc::clone(&backend), None);
        let payload = fetcher
            .fetch(&k, PayloadKind::Scalar, || async move { Ok(scalar("fresh")) })
            .await
            .expect("fetch should succeed");

        // The caller is answered from the source of truth...
        assert_eq!(payload, scalar("fresh"));
        // ...but the tombstone was not overwritten.
        assert_eq!(
            backend.peek(&k).await.expect("peek should succeed"),
            Some(CachedPayload::Tombstone)
        );
    }

    /// Backend that is permanently unreachable.
    struct DownBackend;

    #[async_trait]
    impl CacheBackend for DownBackend {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CachedPayload>, BackendError> {
            Err(BackendError::Unavailable {
                reason: "connection refused".to_string(),
            })
        }

        async fn set(
            &self,
            _key: &CacheKey,
            _payload: CachedPayload,
            _ttl: Option<Duration>,
        ) -> Result<(), BackendError> {
            Err(BackendError::Unavailable {
                reason: "connection refused".to_string(),
            })
        }

        async fn add_if_absent(
            &self,
            _key: &CacheKey,
            _payload: CachedPayload,
            _ttl: Option<Duration>,
        ) -> Result<bool, BackendError> {
            Err(BackendError::Unavailable {
                reason: "connection refused".to_string(),
            })
        }

        async fn delete(&self, _key: &CacheKey) -> Result<(), BackendError> {
            Err(BackendError::Unavailable {
                reason: "connection refused".to_string(),
            })
        }

        async fn clear(&self) -> Result<(), BackendError> {
            Err(BackendError::Unavailable {
                reason: "connection refused".to_string(),
            })
        }

        async fn stats(&self) -> Result<CacheStats, BackendError> {
            Err(BackendError::Unavailable {
                reason: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_unavailable_backend_degrades_to_loader() {
        let fetcher = Fetcher::new(Arc::new(DownBackend), None);
        let loader_calls = &AtomicUsize::new(0);

        let payload = fetcher
            .fetch(&key(), PayloadKind::Scalar, || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok(scalar("fresh"))
            })
            .await
            .expect("fetch should degrade, not fail");

        assert_eq!(payload, scalar("fresh"));
        assert_eq!(loader_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loader_error_propagates() {
        let backend = Arc::new(MemoryBackend::new());
        let fetcher = Fetcher::new(Arc::clone(&backend), None);

        let result = fetcher
            .fetch(&key(), PayloadKind::Scalar, || async move {
                Err(rowcache_core::SourceError::QueryFailed {
                    table: "items".to_string(),
                    reason: "boom".to_string(),
                }
                .into())
            })
            .await;

        assert!(result.is_err());
        // Nothing was cached for the failed load.
        assert_eq!(
            backend.peek(&key()).await.expect("peek should succeed"),
            None
        );
    }
}
