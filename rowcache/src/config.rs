//! Cache configuration.

use std::time::Duration;

use crate::key::DEFAULT_NAMESPACE;

/// Configuration for a [`RowCache`](crate::cache::RowCache) instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Key namespace prepended to every derived key.
    pub namespace: String,
    /// How long tombstones live. Must outlive any in-flight read that
    /// started before the mutation and might still attempt a stale fill;
    /// after expiry the key repopulates on the next fetch.
    pub tombstone_ttl: Duration,
    /// Optional TTL for positive entries (including negative results such
    /// as the NULL sentinel and empty id lists). `None` caches until an
    /// invalidation hook fires or the backend evicts.
    pub value_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            tombstone_ttl: Duration::from_secs(1),
            value_ttl: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the tombstone TTL.
    pub fn with_tombstone_ttl(mut self, ttl: Duration) -> Self {
        self.tombstone_ttl = ttl;
        self
    }

    /// Set the TTL for positive entries.
    pub fn with_value_ttl(mut self, ttl: Duration) -> Self {
        self.value_ttl = Some(ttl);
        self
    }
}
