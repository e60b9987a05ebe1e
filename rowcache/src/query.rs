//! Contracts toward the relational store.
//!
//! The cache never builds SQL text; it describes a single-table
//! equality/limit selection and hands it to the caller's executor. Rows
//! come back as column-name/value maps in store-defined order.

use async_trait::async_trait;
use std::collections::BTreeMap;

use rowcache_core::{SourceError, Value};

/// One result row.
pub type Row = BTreeMap<String, Value>;

/// A single-table selection with equality predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectSpec {
    pub table: String,
    /// Columns to project, in order.
    pub columns: Vec<String>,
    /// Conjunction of `column = value` predicates.
    pub predicate: Vec<(String, Value)>,
    pub limit: Option<u32>,
}

impl SelectSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            predicate: Vec::new(),
            limit: None,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: Value) -> Self {
        self.predicate.push((column.into(), value));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Executes selections against the source of truth.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a selection, returning matching rows in store-defined order
    /// (an empty set is not an error).
    async fn select(&self, spec: &SelectSpec) -> Result<Vec<Row>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_spec_builder() {
        let spec = SelectSpec::new("items")
            .column("id")
            .filter("title", Value::from("bob"))
            .limit(1);

        assert_eq!(spec.table, "items");
        assert_eq!(spec.columns, vec!["id".to_string()]);
        assert_eq!(spec.predicate, vec![("title".to_string(), Value::from("bob"))]);
        assert_eq!(spec.limit, Some(1));
    }
}
