//! Rowcache - Coherent Read-Through Caching for Relational Records
//!
//! A caching layer in front of a relational store, with three access
//! patterns: per-column attribute lookups, secondary-index lookups
//! (unique and non-unique), and whole-record blob lookups by primary key.
//!
//! # Coherence Model
//!
//! There is no invalidation bus and no cross-request lock. Coherence
//! rests on three mechanisms:
//!
//! - **Deterministic key derivation** ([`key`]): the lookup path and the
//!   invalidation path derive the same key from the same logical identity,
//!   always.
//! - **Write-time tombstones** ([`invalidation`]): every create, update,
//!   and destroy tombstones the affected keys before the mutation becomes
//!   externally visible.
//! - **Conditional fills** ([`fetcher`]): a read-through fill is an
//!   add-if-absent, so a fill racing an invalidation loses to the
//!   tombstone instead of resurrecting stale data.
//!
//! Reads inside an open write transaction bypass the cache entirely
//! ([`txn`]): uncommitted state must never be memoized into a shared
//! cache.
//!
//! The result is eventual consistency with a bounded staleness window
//! closed by tombstone expiry, not linearizability.

pub mod backend;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod invalidation;
pub mod key;
pub mod memory;
pub mod query;
pub mod registry;
pub mod txn;

pub use backend::{decode_payload, encode_payload, CacheBackend, CacheStats};
pub use cache::RowCache;
pub use config::CacheConfig;
pub use fetcher::Fetcher;
pub use invalidation::{affected_keys, EntityChange};
pub use key::{CacheKey, KeyDeriver, KeyRole, DEFAULT_NAMESPACE};
pub use memory::MemoryBackend;
pub use query::{QueryExecutor, Row, SelectSpec};
pub use registry::{CacheRegistry, CachedIndex, RegisteredType, TypeConfig};
pub use txn::TransactionObserver;

// Re-export the core data model for downstream convenience
pub use rowcache_core::{
    BackendError, CacheError, CacheResult, CachedPayload, ColumnDef, ColumnType, IdentityError,
    PayloadKind, Record, RecordId, RegistryError, SchemaFingerprint, SourceError, TableSchema,
    Value,
};
