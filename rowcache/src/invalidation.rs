//! Write-time invalidation.
//!
//! The persistence layer reports every create, update, and destroy of a
//! tracked entity as an [`EntityChange`], synchronously, before the
//! mutation is considered externally visible. The hook computes exactly
//! the keys the lookup paths would derive and tombstones them all; a bare
//! delete would let a racing stale fill resurrect old data the moment the
//! delete landed.
//!
//! Creation runs the same set as update: a just-inserted row may already
//! be negatively cached (a unique-index miss stored as the NULL sentinel,
//! or a non-unique index stored as the empty list), and that negative
//! entry must die so the next fetch re-queries.

use std::collections::BTreeMap;

use rowcache_core::{CacheError, IdentityError, Record, Value};

use crate::key::{CacheKey, KeyDeriver};
use crate::query::Row;
use crate::registry::RegisteredType;

/// A lifecycle event on a tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityChange {
    /// A new record was inserted.
    Created { record: Record },
    /// An existing record was updated. `previous` holds the old values of
    /// the changed columns.
    Updated {
        record: Record,
        changed_columns: Vec<String>,
        previous: Row,
    },
    /// A record was destroyed; `record` carries its final column values.
    Destroyed { record: Record },
}

impl EntityChange {
    pub fn created(record: Record) -> Self {
        EntityChange::Created { record }
    }

    pub fn updated<I, S>(record: Record, changed_columns: I, previous: Row) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EntityChange::Updated {
            record,
            changed_columns: changed_columns.into_iter().map(Into::into).collect(),
            previous,
        }
    }

    pub fn destroyed(record: Record) -> Self {
        EntityChange::Destroyed { record }
    }

    /// The record the change applies to (post-change image for creates
    /// and updates, final image for destroys).
    pub fn record(&self) -> &Record {
        match self {
            EntityChange::Created { record }
            | EntityChange::Updated { record, .. }
            | EntityChange::Destroyed { record } => record,
        }
    }
}

/// Compute every cache key affected by a change: the blob key, each cached
/// attribute key, each cached index key under the record's current values,
/// and, for updates that touched an indexed column, the index key under
/// the previous values (a list under the old index value would otherwise
/// keep pointing at a record that no longer matches).
pub fn affected_keys(
    registered: &RegisteredType,
    keys: &KeyDeriver,
    change: &EntityChange,
) -> Result<Vec<CacheKey>, CacheError> {
    let schema = registered.schema();
    let type_name = schema.type_name();
    let record = change.record();
    let id = record
        .id(schema)
        .ok_or_else(|| IdentityError::MissingPrimaryKey {
            type_name: type_name.to_string(),
            column: schema.primary_key().to_string(),
        })?;

    let mut affected = Vec::new();
    affected.push(keys.blob_key(type_name, registered.fingerprint(), id));

    let id_value = Value::Integer(id);
    for column in registered.attributes() {
        affected.push(keys.attribute_key(type_name, column, schema.primary_key(), &id_value));
    }

    for index in registered.indexes() {
        let current = index_values(registered, index.columns(), record, &BTreeMap::new());
        affected.push(keys.index_key(type_name, index.columns(), &current)?);

        if let EntityChange::Updated {
            changed_columns,
            previous,
            ..
        } = change
        {
            let index_touched = changed_columns.iter().any(|c| index.covers(c));
            if index_touched {
                let old = index_values(registered, index.columns(), record, previous);
                let old_key = keys.index_key(type_name, index.columns(), &old)?;
                if !affected.contains(&old_key) {
                    affected.push(old_key);
                }
            }
        }
    }

    Ok(affected)
}

/// Values of the index columns, preferring `previous` for columns it
/// holds, coerced to the declared column types.
fn index_values(
    registered: &RegisteredType,
    columns: &[String],
    record: &Record,
    previous: &Row,
) -> Vec<Value> {
    columns
        .iter()
        .map(|column| {
            let raw = previous.get(column).unwrap_or_else(|| record.get(column));
            match registered.schema().column(column) {
                Some(def) => raw.coerce(def.column_type),
                None => raw.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CacheRegistry, TypeConfig};
    use rowcache_core::{ColumnDef, ColumnType, TableSchema};

    fn registry() -> CacheRegistry {
        let schema = TableSchema::new(
            "Item",
            "items",
            "id",
            vec![
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("title", ColumnType::Text),
                ColumnDef::new("score", ColumnType::Integer),
            ],
        );
        let mut registry = CacheRegistry::new();
        registry
            .register(
                TypeConfig::new(schema)
                    .cache_attribute("title")
                    .cache_unique_index(["title"]),
            )
            .expect("registration should succeed");
        registry
    }

    fn bob() -> Record {
        Record::from_pairs([
            ("id", Value::Integer(1)),
            ("title", Value::from("bob")),
            ("score", Value::Integer(10)),
        ])
    }

    #[test]
    fn test_create_touches_blob_attribute_and_index_keys() {
        let registry = registry();
        let registered = registry.lookup("Item").expect("type should be registered");
        let keys = KeyDeriver::default();

        let affected = affected_keys(registered, &keys, &EntityChange::created(bob()))
            .expect("key computation should succeed");

        assert_eq!(affected.len(), 3);
        assert!(affected[0].as_str().contains(":blob:Item:"));
        assert!(affected[1].as_str().contains(":attribute:Item:title:"));
        assert!(affected[2].as_str().contains(":index:Item:title:"));
    }

    #[test]
    fn test_update_of_indexed_column_adds_the_old_key() {
        let registry = registry();
        let registered = registry.lookup("Item").expect("type should be registered");
        let keys = KeyDeriver::default();

        let mut renamed = bob();
        renamed.set("title", Value::from("robert"));
        let previous = Row::from([("title".to_string(), Value::from("bob"))]);
        let change = EntityChange::updated(renamed, ["title"], previous);

        let affected =
            affected_keys(registered, &keys, &change).expect("key computation should succeed");

        let old_key = keys
            .index_key("Item", &["title".to_string()], &[Value::from("bob")])
            .expect("derivation should succeed");
        let new_key = keys
            .index_key("Item", &["title".to_string()], &[Value::from("robert")])
            .expect("derivation should succeed");
        assert!(affected.contains(&old_key));
        assert!(affected.contains(&new_key));
    }

    #[test]
    fn test_update_of_unindexed_column_adds_no_extra_index_key() {
        let registry = registry();
        let registered = registry.lookup("Item").expect("type should be registered");
        let keys = KeyDeriver::default();

        let previous = Row::from([("score".to_string(), Value::Integer(9))]);
        let change = EntityChange::updated(bob(), ["score"], previous);

        let affected =
            affected_keys(registered, &keys, &change).expect("key computation should succeed");

        // blob + attribute + one current index key, nothing for the old
        // score since no index covers it.
        assert_eq!(affected.len(), 3);
    }

    #[test]
    fn test_destroy_uses_final_values() {
        let registry = registry();
        let registered = registry.lookup("Item").expect("type should be registered");
        let keys = KeyDeriver::default();

        let affected = affected_keys(registered, &keys, &EntityChange::destroyed(bob()))
            .expect("key computation should succeed");

        let index_key = keys
            .index_key("Item", &["title".to_string()], &[Value::from("bob")])
            .expect("derivation should succeed");
        assert!(affected.contains(&index_key));
    }

    #[test]
    fn test_missing_primary_key_fails_fast() {
        let registry = registry();
        let registered = registry.lookup("Item").expect("type should be registered");
        let keys = KeyDeriver::default();

        let record = Record::from_pairs([("title", Value::from("bob"))]);
        let err = affected_keys(registered, &keys, &EntityChange::created(record))
            .expect_err("missing pk should fail");
        assert!(matches!(
            err,
            CacheError::Identity(IdentityError::MissingPrimaryKey { .. })
        ));
    }
}
