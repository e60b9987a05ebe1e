//! Cached payload flavors.
//!
//! Everything stored under a cache key is one of these variants. Two of
//! them are markers rather than data:
//!
//! - [`CachedPayload::Nil`] substitutes for a true NULL (or a unique-index
//!   miss). A key-value store cannot faithfully round-trip "null", so the
//!   sentinel removes the ambiguity: a `Nil` hit is distinguishable from a
//!   backend miss.
//! - [`CachedPayload::Tombstone`] is written in place of a hard delete on
//!   every invalidation. A reader that raced the mutation and tries to
//!   fill the key with its pre-mutation value is rejected by the
//!   add-if-absent write while the tombstone lives.

use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::value::{RecordId, Value};

/// A value stored under a cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedPayload {
    /// Cached NULL / unique-index miss sentinel.
    Nil,
    /// Known-invalid marker written by invalidation; blocks stale fills.
    Tombstone,
    /// Attribute value.
    Scalar(Value),
    /// Unique-index hit: the matching primary key.
    Id(RecordId),
    /// Non-unique index result: matching primary keys in store order.
    /// The empty list is a valid, cacheable result.
    IdList(Vec<RecordId>),
    /// Fully materialized record image.
    Record(Record),
}

/// Expected payload shape for a cache role, checked on read.
///
/// Keys are role-namespaced so a shape mismatch cannot occur through the
/// public API; a hit of the wrong shape is treated as a miss rather than
/// decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Scalar,
    Id,
    IdList,
    Record,
}

impl CachedPayload {
    /// Encode a scalar for storage, substituting the NULL sentinel.
    pub fn from_scalar(value: Value) -> Self {
        if value.is_null() {
            CachedPayload::Nil
        } else {
            CachedPayload::Scalar(value)
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, CachedPayload::Nil)
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, CachedPayload::Tombstone)
    }

    /// Whether this stored payload is a usable hit for the given role.
    ///
    /// A tombstone is never a hit. `Nil` is a hit for the nullable roles
    /// (attribute, unique index, blob); a non-unique index caches the empty
    /// list instead, so `Nil` there reads as a miss.
    pub fn matches(&self, kind: PayloadKind) -> bool {
        match self {
            CachedPayload::Tombstone => false,
            CachedPayload::Nil => matches!(
                kind,
                PayloadKind::Scalar | PayloadKind::Id | PayloadKind::Record
            ),
            CachedPayload::Scalar(_) => kind == PayloadKind::Scalar,
            CachedPayload::Id(_) => kind == PayloadKind::Id,
            CachedPayload::IdList(_) => kind == PayloadKind::IdList,
            CachedPayload::Record(_) => kind == PayloadKind::Record,
        }
    }

    /// Decode an attribute payload; `Nil` decodes to NULL.
    pub fn into_scalar(self) -> Option<Value> {
        match self {
            CachedPayload::Nil => Some(Value::Null),
            CachedPayload::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Decode a unique-index payload; `Nil` decodes to no match.
    pub fn into_id(self) -> Option<Option<RecordId>> {
        match self {
            CachedPayload::Nil => Some(None),
            CachedPayload::Id(id) => Some(Some(id)),
            _ => None,
        }
    }

    /// Decode a non-unique index payload.
    pub fn into_id_list(self) -> Option<Vec<RecordId>> {
        match self {
            CachedPayload::IdList(ids) => Some(ids),
            _ => None,
        }
    }

    /// Decode a blob payload; `Nil` decodes to no record.
    pub fn into_record(self) -> Option<Option<Record>> {
        match self {
            CachedPayload::Nil => Some(None),
            CachedPayload::Record(r) => Some(Some(r)),
            _ => None,
        }
    }
}
