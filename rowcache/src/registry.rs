//! Startup-time registration of cached types.
//!
//! What used to be scattered per-class declarations is an explicit table
//! built once at startup: each tracked type registers its schema, the
//! columns cached as attributes, and the column combinations cached as
//! indexes. Registration validates everything against the schema and
//! computes the schema fingerprint exactly once; lookups afterwards are
//! infallible reads consulted by the key deriver, the facade, and the
//! invalidation hook.

use std::collections::HashMap;

use rowcache_core::{IdentityError, RegistryError, SchemaFingerprint, TableSchema};

/// One cached index declaration: an ordered column list and whether at
/// most one row can match it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedIndex {
    columns: Vec<String>,
    unique: bool,
}

impl CachedIndex {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the index includes the given column.
    pub fn covers(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Cache declaration for one type, handed to [`CacheRegistry::register`].
#[derive(Debug, Clone)]
pub struct TypeConfig {
    schema: TableSchema,
    attributes: Vec<String>,
    indexes: Vec<CachedIndex>,
}

impl TypeConfig {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            attributes: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Cache a single column's value, looked up by primary key.
    pub fn cache_attribute(mut self, column: impl Into<String>) -> Self {
        self.attributes.push(column.into());
        self
    }

    /// Cache a non-unique index over the given columns, in order.
    pub fn cache_index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(CachedIndex {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        });
        self
    }

    /// Cache a unique index over the given columns, in order.
    pub fn cache_unique_index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(CachedIndex {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: true,
        });
        self
    }
}

/// A registered type: validated declaration plus the fingerprint computed
/// at registration time.
#[derive(Debug, Clone)]
pub struct RegisteredType {
    schema: TableSchema,
    fingerprint: SchemaFingerprint,
    attributes: Vec<String>,
    indexes: Vec<CachedIndex>,
}

impl RegisteredType {
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn fingerprint(&self) -> &SchemaFingerprint {
        &self.fingerprint
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn indexes(&self) -> &[CachedIndex] {
        &self.indexes
    }

    pub fn has_attribute(&self, column: &str) -> bool {
        self.attributes.iter().any(|c| c == column)
    }

    /// The declared index over exactly this ordered column list.
    pub fn index(&self, columns: &[&str]) -> Option<&CachedIndex> {
        self.indexes
            .iter()
            .find(|idx| idx.columns.len() == columns.len()
                && idx.columns.iter().zip(columns).all(|(a, b)| a == b))
    }
}

/// Lookup table of every registered type.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    types: HashMap<String, RegisteredType>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Validates the declaration against its schema and
    /// computes the schema fingerprint once.
    pub fn register(&mut self, config: TypeConfig) -> Result<(), RegistryError> {
        let TypeConfig {
            schema,
            mut attributes,
            indexes,
        } = config;
        let type_name = schema.type_name().to_string();

        if self.types.contains_key(&type_name) {
            return Err(RegistryError::DuplicateType { type_name });
        }

        let check_column = |column: &str| -> Result<(), RegistryError> {
            if schema.has_column(column) {
                Ok(())
            } else {
                Err(RegistryError::UnknownColumn {
                    type_name: type_name.clone(),
                    column: column.to_string(),
                })
            }
        };

        check_column(schema.primary_key())?;
        for column in &attributes {
            check_column(column)?;
        }
        for index in &indexes {
            for column in &index.columns {
                check_column(column)?;
            }
        }

        for (i, index) in indexes.iter().enumerate() {
            if indexes[..i].iter().any(|other| other.columns == index.columns) {
                return Err(RegistryError::DuplicateIndex {
                    type_name,
                    columns: index.columns.join(","),
                });
            }
        }

        attributes.dedup();

        let fingerprint = schema.fingerprint();
        self.types.insert(
            type_name,
            RegisteredType {
                schema,
                fingerprint,
                attributes,
                indexes,
            },
        );
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&RegisteredType> {
        self.types.get(type_name)
    }

    /// Lookup that fails fast when the type was never registered.
    pub fn lookup(&self, type_name: &str) -> Result<&RegisteredType, IdentityError> {
        self.types
            .get(type_name)
            .ok_or_else(|| IdentityError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowcache_core::{ColumnDef, ColumnType};

    fn item_schema() -> TableSchema {
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

    #[test]
    fn test_register_and_lookup() {
        let mut registry = CacheRegistry::new();
        registry
            .register(
                TypeConfig::new(item_schema())
                    .cache_attribute("title")
                    .cache_unique_index(["title"])
                    .cache_index(["title", "id"]),
            )
            .expect("registration should succeed");

        let reg = registry.lookup("Item").expect("type should be registered");
        assert!(reg.has_attribute("title"));
        assert!(!reg.has_attribute("id"));
        assert!(reg.index(&["title"]).expect("index should exist").is_unique());
        assert!(!reg
            .index(&["title", "id"])
            .expect("index should exist")
            .is_unique());
        assert_eq!(reg.fingerprint(), &item_schema().fingerprint());
    }

    #[test]
    fn test_index_lookup_is_order_sensitive() {
        let mut registry = CacheRegistry::new();
        registry
            .register(TypeConfig::new(item_schema()).cache_index(["title", "id"]))
            .expect("registration should succeed");

        let reg = registry.lookup("Item").expect("type should be registered");
        assert!(reg.index(&["title", "id"]).is_some());
        assert!(reg.index(&["id", "title"]).is_none());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = CacheRegistry::new();
        registry
            .register(TypeConfig::new(item_schema()))
            .expect("registration should succeed");
        let err = registry
            .register(TypeConfig::new(item_schema()))
            .expect_err("duplicate registration should fail");
        assert!(matches!(err, RegistryError::DuplicateType { .. }));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let mut registry = CacheRegistry::new();
        let err = registry
            .register(TypeConfig::new(item_schema()).cache_attribute("missing"))
            .expect_err("unknown column should fail");
        assert_eq!(
            err,
            RegistryError::UnknownColumn {
                type_name: "Item".to_string(),
                column: "missing".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut registry = CacheRegistry::new();
        let err = registry
            .register(
                TypeConfig::new(item_schema())
                    .cache_unique_index(["title"])
                    .cache_index(["title"]),
            )
            .expect_err("duplicate index should fail");
        assert!(matches!(err, RegistryError::DuplicateIndex { .. }));
    }

    #[test]
    fn test_unregistered_type_fails_fast() {
        let registry = CacheRegistry::new();
        let err = registry.lookup("Ghost").expect_err("lookup should fail");
        assert_eq!(
            err,
            IdentityError::UnknownType {
                type_name: "Ghost".to_string(),
            }
        );
    }
}
