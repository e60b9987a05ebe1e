//! Rowcache Test Utilities
//!
//! Centralized test infrastructure for the rowcache workspace:
//! - `MemoryStore`, an in-memory fake of the relational source of truth
//!   that implements the query and transaction contracts and drives the
//!   invalidation hook with the required ordering
//! - `FlakyBackend`, a fault-injecting backend wrapper for degradation
//!   tests
//! - Schema and row fixtures for common scenarios

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use rowcache::{
    CacheBackend, CacheKey, CacheStats, EntityChange, QueryExecutor, Row, RowCache, SelectSpec,
    TransactionObserver,
};
use rowcache_core::{
    BackendError, CacheResult, CachedPayload, ColumnDef, ColumnType, IdentityError, Record,
    RecordId, SourceError, TableSchema, Value,
};

// Re-export the pieces nearly every test wants in scope.
pub use rowcache::{CacheConfig, CacheRegistry, MemoryBackend, TypeConfig};

// ============================================================================
// FIXTURES
// ============================================================================

/// `Item(id integer, title text)`, the workhorse fixture.
pub fn item_schema() -> TableSchema {
    TableSchema::new(
        "Item",
        "items",
        "id",
        vec![
            ColumnDef::new("id", ColumnType::Integer),
            ColumnDef::new("title", ColumnType::Text),
        ],
    )
}

/// `AssociatedRecord(id integer, item_id integer, name text)`.
pub fn associated_schema() -> TableSchema {
    TableSchema::new(
        "AssociatedRecord",
        "associated_records",
        "id",
        vec![
            ColumnDef::new("id", ColumnType::Integer),
            ColumnDef::new("item_id", ColumnType::Integer),
            ColumnDef::new("name", ColumnType::Text),
        ],
    )
}

/// Build a row from column/value pairs.
pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

// ============================================================================
// FAKE RELATIONAL STORE
// ============================================================================

/// In-memory fake of the relational source of truth.
///
/// Rows live in per-table maps keyed by primary key, so result sets come
/// back in primary-key order, which is the "store-defined order" the
/// query contract promises. Every `select` is counted, letting tests assert
/// that a cache hit issued no query.
///
/// The `save`/`destroy` helpers mirror a persistence layer wired to the
/// invalidation hook: the change is computed against current table state,
/// the hook is awaited, and only then does the mutation land.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, BTreeMap<RecordId, Row>>>,
    open_transactions: AtomicUsize,
    queries: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `select` calls executed so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Insert a row directly, without firing any invalidation. For
    /// seeding initial state.
    pub fn seed(&self, table: &str, pk: &str, row: Row) -> RecordId {
        let id = row
            .get(pk)
            .and_then(Value::as_record_id)
            .expect("seeded rows need an integral primary key");
        self.tables
            .write()
            .expect("store lock should not be poisoned")
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
        id
    }

    /// Open a write transaction on this connection.
    pub fn begin_transaction(&self) {
        self.open_transactions.fetch_add(1, Ordering::SeqCst);
    }

    /// Close the innermost transaction.
    pub fn commit_transaction(&self) {
        self.open_transactions.fetch_sub(1, Ordering::SeqCst);
    }

    /// Persist a full row image through the invalidation hook.
    ///
    /// Computes the lifecycle change against current table state, awaits
    /// the cache invalidation, and only then makes the row visible.
    /// This is the ordering a real persistence layer must uphold.
    pub async fn save<B: CacheBackend>(
        &self,
        cache: &RowCache<B>,
        type_name: &str,
        row: Row,
    ) -> CacheResult<Record> {
        let registered = cache.registry().lookup(type_name)?;
        let schema = registered.schema();
        let table = schema.table_name().to_string();
        let pk = schema.primary_key();
        let id = row
            .get(pk)
            .and_then(Value::as_record_id)
            .ok_or_else(|| IdentityError::MissingPrimaryKey {
                type_name: type_name.to_string(),
                column: pk.to_string(),
            })?;

        let existing = self
            .tables
            .read()
            .expect("store lock should not be poisoned")
            .get(&table)
            .and_then(|rows| rows.get(&id))
            .cloned();

        let record = Record::from_iter(row.clone());
        let change = match existing {
            Some(old) => {
                let changed: Vec<String> = row
                    .iter()
                    .filter(|&(column, value)| old.get(column) != Some(value))
                    .map(|(column, _)| column.clone())
                    .collect();
                let previous: Row = changed
                    .iter()
                    .filter_map(|column| {
                        old.get(column).map(|value| (column.clone(), value.clone()))
                    })
                    .collect();
                EntityChange::updated(record.clone(), changed, previous)
            }
            None => EntityChange::created(record.clone()),
        };

        // Invalidation must be acknowledged before the row is visible.
        cache.invalidate(type_name, &change).await?;

        self.tables
            .write()
            .expect("store lock should not be poisoned")
            .entry(table)
            .or_default()
            .insert(id, row);
        Ok(record)
    }

    /// Destroy a row through the invalidation hook. Returns false when no
    /// such row exists.
    pub async fn destroy<B: CacheBackend>(
        &self,
        cache: &RowCache<B>,
        type_name: &str,
        id: RecordId,
    ) -> CacheResult<bool> {
        let registered = cache.registry().lookup(type_name)?;
        let table = registered.schema().table_name().to_string();

        let existing = self
            .tables
            .read()
            .expect("store lock should not be poisoned")
            .get(&table)
            .and_then(|rows| rows.get(&id))
            .cloned();
        let Some(old) = existing else {
            return Ok(false);
        };

        cache
            .invalidate(type_name, &EntityChange::destroyed(Record::from_iter(old)))
            .await?;

        if let Some(rows) = self
            .tables
            .write()
            .expect("store lock should not be poisoned")
            .get_mut(&table)
        {
            rows.remove(&id);
        }
        Ok(true)
    }
}

#[async_trait]
impl QueryExecutor for MemoryStore {
    async fn select(&self, spec: &SelectSpec) -> Result<Vec<Row>, SourceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let tables = self
            .tables
            .read()
            .map_err(|_| SourceError::QueryFailed {
                table: spec.table.clone(),
                reason: "store lock poisoned".to_string(),
            })?;

        let mut results = Vec::new();
        if let Some(rows) = tables.get(&spec.table) {
            for row in rows.values() {
                let matches = spec
                    .predicate
                    .iter()
                    .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value);
                if !matches {
                    continue;
                }
                let projected: Row = if spec.columns.is_empty() {
                    row.clone()
                } else {
                    spec.columns
                        .iter()
                        .map(|column| {
                            let value = row.get(column).cloned().unwrap_or(Value::Null);
                            (column.clone(), value)
                        })
                        .collect()
                };
                results.push(projected);
                if spec.limit.is_some_and(|limit| results.len() as u32 >= limit) {
                    break;
                }
            }
        }
        Ok(results)
    }
}

impl TransactionObserver for MemoryStore {
    fn open_transactions(&self) -> usize {
        self.open_transactions.load(Ordering::SeqCst)
    }
}

// ============================================================================
// FAULT-INJECTING BACKEND
// ============================================================================

/// Backend wrapper that can be taken down mid-test.
#[derive(Debug)]
pub struct FlakyBackend<B> {
    inner: B,
    down: AtomicBool,
}

impl<B> FlakyBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.down.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable {
                reason: "injected outage".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for FlakyBackend<B> {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedPayload>, BackendError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &CacheKey,
        payload: CachedPayload,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        self.check()?;
        self.inner.set(key, payload, ttl).await
    }

    async fn add_if_absent(
        &self,
        key: &CacheKey,
        payload: CachedPayload,
        ttl: Option<Duration>,
    ) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.add_if_absent(key, payload, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), BackendError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.check()?;
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<CacheStats, BackendError> {
        self.check()?;
        self.inner.stats().await
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.check()?;
        self.inner.close().await
    }
}
