//! Scalar values as they cross the cache boundary.
//!
//! `Value` is the single representation for column values flowing between
//! the query layer, the cache, and callers. Key derivation relies on the
//! canonical coercion rules here: semantically equal identities must
//! produce byte-identical key parts regardless of how the caller spelled
//! them (`Integer(42)` vs `Text("42")`).

use serde::{Deserialize, Serialize};

use crate::schema::ColumnType;

/// Primary-key value of a relational record.
pub type RecordId = i64;

/// A SQL scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean column value.
    Bool(bool),
    /// Integer column value.
    Integer(i64),
    /// Floating-point column value.
    Float(f64),
    /// Text column value.
    Text(String),
    /// Binary column value.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret this value as a primary key, if it is one.
    pub fn as_record_id(&self) -> Option<RecordId> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Canonical string form used as a key-derivation part.
    ///
    /// The coercion is lossy on purpose: `Integer(42)`, `Float(42.0)` and
    /// `Text("42")` all map to `"42"`, so a lookup keyed by a stringly-typed
    /// id hashes identically to one keyed by the integer id.
    pub fn key_part(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => hex::encode(b),
        }
    }

    /// Coerce this value to the declared type of the column it is matched
    /// against, mirroring what the relational store would do with a typed
    /// bind parameter. Garbage text against an integer column becomes `0`,
    /// so the generated query stays properly typed.
    ///
    /// NULL is never coerced: it stays NULL under every column type.
    pub fn coerce(&self, column_type: ColumnType) -> Value {
        if self.is_null() {
            return Value::Null;
        }
        match column_type {
            ColumnType::Integer => Value::Integer(self.to_i64()),
            ColumnType::Float => Value::Float(self.to_f64()),
            ColumnType::Text => Value::Text(self.key_part()),
            ColumnType::Boolean => Value::Bool(self.to_bool()),
            ColumnType::Bytes => match self {
                Value::Bytes(_) => self.clone(),
                other => Value::Bytes(other.key_part().into_bytes()),
            },
        }
    }

    fn to_i64(&self) -> i64 {
        match self {
            Value::Integer(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => *b as i64,
            Value::Text(s) => parse_leading_i64(s),
            _ => 0,
        }
    }

    fn to_f64(&self) -> f64 {
        match self {
            Value::Integer(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Bool(b) => (*b as i64) as f64,
            Value::Text(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn to_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => matches!(s.trim(), "t" | "true" | "1"),
            Value::Bytes(b) => !b.is_empty(),
            Value::Null => false,
        }
    }
}

/// Parse the leading integer of a string, `0` if there is none.
fn parse_leading_i64(s: &str) -> i64 {
    let trimmed = s.trim();
    let end = trimmed
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    trimmed[..end].parse().unwrap_or(0)
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
