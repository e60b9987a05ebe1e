//! The cache facade.
//!
//! `RowCache` ties the registration table, the key deriver, and the
//! read-through fetcher together behind the three access patterns:
//! attribute lookups, index lookups (unique and non-unique), and
//! whole-record lookups by primary key. It is explicitly constructed with
//! an injected backend instance; there is no ambient global.
//!
//! The source of truth is passed per call. Index lookups cache primary
//! keys only and materialize records through the blob cache, so the index
//! layer composes with blob caching instead of duplicating it.

use std::sync::Arc;

use rowcache_core::{
    BackendError, CacheError, CacheResult, CachedPayload, IdentityError, PayloadKind, Record,
    RecordId, Value,
};

use crate::backend::CacheBackend;
use crate::config::CacheConfig;
use crate::fetcher::Fetcher;
use crate::invalidation::{affected_keys, EntityChange};
use crate::key::KeyDeriver;
use crate::query::{QueryExecutor, Row, SelectSpec};
use crate::registry::{CacheRegistry, CachedIndex, RegisteredType};
use crate::txn::TransactionObserver;

/// Read-through record cache over one backend and one registration table.
pub struct RowCache<B: CacheBackend> {
    registry: Arc<CacheRegistry>,
    backend: Arc<B>,
    keys: KeyDeriver,
    fetcher: Fetcher<B>,
    config: CacheConfig,
}

impl<B: CacheBackend> RowCache<B> {
    pub fn new(registry: Arc<CacheRegistry>, backend: Arc<B>, config: CacheConfig) -> Self {
        let keys = KeyDeriver::new(config.namespace.clone());
        let fetcher = Fetcher::new(Arc::clone(&backend), config.value_ttl);
        Self {
            registry,
            backend,
            keys,
            fetcher,
            config,
        }
    }

    /// Create a cache with default configuration.
    pub fn with_defaults(registry: Arc<CacheRegistry>, backend: Arc<B>) -> Self {
        Self::new(registry, backend, CacheConfig::default())
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyDeriver {
        &self.keys
    }

    // ========================================================================
    // ATTRIBUTE CACHE
    // ========================================================================

    /// Fetch one cached column of one record by primary key.
    ///
    /// Returns NULL both for a NULL column value and for a missing row;
    /// the cached entry distinguishes them from a backend miss via the
    /// NULL sentinel.
    pub async fn fetch_attribute<S>(
        &self,
        type_name: &str,
        column: &str,
        id: &Value,
        source: &S,
    ) -> CacheResult<Value>
    where
        S: QueryExecutor + TransactionObserver,
    {
        let registered = self.registry.lookup(type_name)?;
        if !registered.has_attribute(column) {
            return Err(IdentityError::UnknownAttribute {
                type_name: type_name.to_string(),
                column: column.to_string(),
            }
            .into());
        }

        let schema = registered.schema();
        let pk = schema.primary_key();
        let id = match schema.column(pk) {
            Some(def) => id.coerce(def.column_type),
            None => id.clone(),
        };
        let spec = SelectSpec::new(schema.table_name())
            .column(column)
            .filter(pk, id.clone())
            .limit(1);
        let load = || async move {
            let rows = source.select(&spec).await?;
            let value = rows
                .into_iter()
                .next()
                .map(|mut row| row.remove(column).unwrap_or(Value::Null))
                .unwrap_or(Value::Null);
            Ok(CachedPayload::from_scalar(value))
        };

        let payload = if source.in_open_transaction() {
            load().await?
        } else {
            let key = self.keys.attribute_key(type_name, column, pk, &id);
            self.fetcher.fetch(&key, PayloadKind::Scalar, load).await?
        };
        payload.into_scalar().ok_or_else(|| shape_error("attribute"))
    }

    // ========================================================================
    // BLOB / PRIMARY CACHE
    // ========================================================================

    /// Fetch a whole record by primary key.
    pub async fn fetch_record<S>(
        &self,
        type_name: &str,
        id: RecordId,
        source: &S,
    ) -> CacheResult<Option<Record>>
    where
        S: QueryExecutor + TransactionObserver,
    {
        let registered = self.registry.lookup(type_name)?;
        self.fetch_record_registered(registered, id, source).await
    }

    async fn fetch_record_registered<S>(
        &self,
        registered: &RegisteredType,
        id: RecordId,
        source: &S,
    ) -> CacheResult<Option<Record>>
    where
        S: QueryExecutor + TransactionObserver,
    {
        let schema = registered.schema();
        let spec = SelectSpec::new(schema.table_name())
            .columns(schema.column_names())
            .filter(schema.primary_key(), Value::Integer(id))
            .limit(1);
        let load = || async move {
            let rows = source.select(&spec).await?;
            Ok(match rows.into_iter().next() {
                Some(row) => CachedPayload::Record(Record::from_iter(row)),
                None => CachedPayload::Nil,
            })
        };

        let payload = if source.in_open_transaction() {
            load().await?
        } else {
            let key = self
                .keys
                .blob_key(schema.type_name(), registered.fingerprint(), id);
            self.fetcher.fetch(&key, PayloadKind::Record, load).await?
        };
        payload.into_record().ok_or_else(|| shape_error("blob"))
    }

    // ========================================================================
    // INDEX CACHE
    // ========================================================================

    /// Fetch the record matching a unique index, if any.
    ///
    /// The index layer caches the matching primary key (or the NULL
    /// sentinel for no match); the record itself is materialized through
    /// the blob cache.
    pub async fn fetch_by_unique_index<S>(
        &self,
        type_name: &str,
        columns: &[&str],
        values: &[Value],
        source: &S,
    ) -> CacheResult<Option<Record>>
    where
        S: QueryExecutor + TransactionObserver,
    {
        let registered = self.registry.lookup(type_name)?;
        let index = lookup_index(registered, type_name, columns, true)?;
        let coerced = coerce_index_values(registered, index, type_name, values)?;

        let schema = registered.schema();
        let pk = schema.primary_key();
        let mut spec = SelectSpec::new(schema.table_name()).column(pk).limit(1);
        for (column, value) in index.columns().iter().zip(&coerced) {
            spec = spec.filter(column.clone(), value.clone());
        }
        let load = || async move {
            let rows = source.select(&spec).await?;
            Ok(
                match rows
                    .into_iter()
                    .next()
                    .and_then(|row| row.get(pk).and_then(Value::as_record_id))
                {
                    Some(id) => CachedPayload::Id(id),
                    None => CachedPayload::Nil,
                },
            )
        };

        let payload = if source.in_open_transaction() {
            load().await?
        } else {
            let key = self.keys.index_key(type_name, index.columns(), &coerced)?;
            self.fetcher.fetch(&key, PayloadKind::Id, load).await?
        };
        match payload.into_id().ok_or_else(|| shape_error("index"))? {
            Some(id) => self.fetch_record_registered(registered, id, source).await,
            None => Ok(None),
        }
    }

    /// Fetch every record matching a non-unique index, in store order.
    ///
    /// An empty result is valid and cached as the empty list, distinct
    /// from a miss. Ids whose record vanished between the index fill and
    /// materialization are dropped, not errors.
    pub async fn fetch_by_index<S>(
        &self,
        type_name: &str,
        columns: &[&str],
        values: &[Value],
        source: &S,
    ) -> CacheResult<Vec<Record>>
    where
        S: QueryExecutor + TransactionObserver,
    {
        let registered = self.registry.lookup(type_name)?;
        let index = lookup_index(registered, type_name, columns, false)?;
        let coerced = coerce_index_values(registered, index, type_name, values)?;

        let schema = registered.schema();
        let pk = schema.primary_key();
        let mut spec = SelectSpec::new(schema.table_name()).column(pk);
        for (column, value) in index.columns().iter().zip(&coerced) {
            spec = spec.filter(column.clone(), value.clone());
        }
        let load = || async move {
            let rows = source.select(&spec).await?;
            let ids = rows
                .into_iter()
                .filter_map(|row| row.get(pk).and_then(Value::as_record_id))
                .collect();
            Ok(CachedPayload::IdList(ids))
        };

        let payload = if source.in_open_transaction() {
            load().await?
        } else {
            let key = self.keys.index_key(type_name, index.columns(), &coerced)?;
            self.fetcher.fetch(&key, PayloadKind::IdList, load).await?
        };
        let ids = payload.into_id_list().ok_or_else(|| shape_error("index"))?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.fetch_record_registered(registered, id, source).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    // ========================================================================
    // INVALIDATION HOOK
    // ========================================================================

    /// Tombstone every key affected by a lifecycle change.
    ///
    /// Must be awaited by the persistence layer before its mutation is
    /// considered externally visible, so any subsequent fetch, from any
    /// process, sees the tombstone rather than a stale hit. A backend
    /// failure here is surfaced: the caller decides whether its mutation
    /// may proceed with the cache left stale.
    pub async fn invalidate(&self, type_name: &str, change: &EntityChange) -> CacheResult<()> {
        let registered = self.registry.lookup(type_name)?;
        let affected = affected_keys(registered, &self.keys, change)?;
        for key in &affected {
            self.backend
                .set(key, CachedPayload::Tombstone, Some(self.config.tombstone_ttl))
                .await?;
        }
        tracing::debug!(type_name, keys = affected.len(), "invalidated");
        Ok(())
    }

    /// Invalidation for a freshly inserted record.
    pub async fn on_created(&self, type_name: &str, record: Record) -> CacheResult<()> {
        self.invalidate(type_name, &EntityChange::created(record))
            .await
    }

    /// Invalidation for an updated record, with changed-attribute
    /// awareness.
    pub async fn on_updated<I, C>(
        &self,
        type_name: &str,
        record: Record,
        changed_columns: I,
        previous: Row,
    ) -> CacheResult<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.invalidate(
            type_name,
            &EntityChange::updated(record, changed_columns, previous),
        )
        .await
    }

    /// Invalidation for a destroyed record.
    pub async fn on_destroyed(&self, type_name: &str, record: Record) -> CacheResult<()> {
        self.invalidate(type_name, &EntityChange::destroyed(record))
            .await
    }
}

impl<B: CacheBackend> Clone for RowCache<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            backend: Arc::clone(&self.backend),
            keys: self.keys.clone(),
            fetcher: self.fetcher.clone(),
            config: self.config.clone(),
        }
    }
}

fn lookup_index<'a>(
    registered: &'a RegisteredType,
    type_name: &str,
    columns: &[&str],
    unique: bool,
) -> Result<&'a CachedIndex, IdentityError> {
    registered
        .index(columns)
        .filter(|index| index.is_unique() == unique)
        .ok_or_else(|| IdentityError::UnknownIndex {
            type_name: type_name.to_string(),
            columns: columns.join(","),
        })
}

/// Coerce caller-supplied index values to the declared column types, so a
/// stringly-typed lookup hashes and queries identically to a typed one.
fn coerce_index_values(
    registered: &RegisteredType,
    index: &CachedIndex,
    type_name: &str,
    values: &[Value],
) -> Result<Vec<Value>, IdentityError> {
    if values.len() != index.columns().len() {
        return Err(IdentityError::ArityMismatch {
            type_name: type_name.to_string(),
            columns: index.columns().join(","),
            expected: index.columns().len(),
            got: values.len(),
        });
    }
    Ok(index
        .columns()
        .iter()
        .zip(values)
        .map(|(column, value)| match registered.schema().column(column) {
            Some(def) => value.coerce(def.column_type),
            None => value.clone(),
        })
        .collect())
}

fn shape_error(role: &str) -> CacheError {
    BackendError::Codec {
        reason: format!("{role} key held a payload of the wrong shape"),
    }
    .into()
}
