//! Table shape and schema fingerprints.
//!
//! A `TableSchema` is handed to the cache at registration time; the
//! fingerprint over its ordered column list is computed exactly once there
//! and embedded in every blob-cache key, so a column being added, removed,
//! or retyped re-keys all existing blob entries without any migration step.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Text,
    Bytes,
}

impl ColumnType {
    /// Stable lowercase name used in fingerprint input.
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Bytes => "bytes",
        }
    }
}

/// A single column declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered shape of one table, as introspected from the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Logical entity name used in cache keys (e.g. `Item`).
    type_name: String,
    /// Physical table name used in generated queries.
    table_name: String,
    /// Name of the primary-key column.
    primary_key: String,
    /// Columns in store order. Order matters: it is part of the fingerprint.
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(
        type_name: impl Into<String>,
        table_name: impl Into<String>,
        primary_key: impl Into<String>,
        columns: Vec<ColumnDef>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            table_name: table_name.into(),
            primary_key: primary_key.into(),
            columns,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// All column names in store order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Compute the fingerprint over the ordered `name:type` column list.
    pub fn fingerprint(&self) -> SchemaFingerprint {
        let input = self
            .columns
            .iter()
            .map(|c| format!("{}:{}", c.name, c.column_type.type_name()))
            .collect::<Vec<_>>()
            .join(",");
        SchemaFingerprint::from_input(&input)
    }
}

/// Hash of a table's ordered column name/type list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaFingerprint(String);

impl SchemaFingerprint {
    /// Length of the hex-encoded fingerprint embedded in cache keys.
    const LEN: usize = 16;

    fn from_input(input: &str) -> Self {
        let digest = Sha256::digest(input.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(Self::LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
