//! Error types for rowcache operations.

use thiserror::Error;

/// Cache backend errors.
///
/// Backend unavailability is never fatal to reads: the fetcher degrades to
/// always-miss and answers from the source of truth.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Payload codec error: {reason}")]
    Codec { reason: String },
}

/// Identity errors: the caller named something the registration table does
/// not know, or supplied an identity tuple of the wrong shape. These fail
/// fast and are surfaced, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Type not registered: {type_name}")]
    UnknownType { type_name: String },

    #[error("Column {column} is not a cached attribute of {type_name}")]
    UnknownAttribute { type_name: String, column: String },

    #[error("No cached index on {type_name} over ({columns})")]
    UnknownIndex { type_name: String, columns: String },

    #[error("Identity arity mismatch for {type_name} index ({columns}): expected {expected} values, got {got}")]
    ArityMismatch {
        type_name: String,
        columns: String,
        expected: usize,
        got: usize,
    },

    #[error("Primary key {column} missing or non-integral on {type_name} record")]
    MissingPrimaryKey { type_name: String, column: String },
}

/// Registration-time validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Type already registered: {type_name}")]
    DuplicateType { type_name: String },

    #[error("Duplicate cached index on {type_name}: ({columns})")]
    DuplicateIndex { type_name: String, columns: String },

    #[error("Unknown column {column} on {type_name}")]
    UnknownColumn { type_name: String, column: String },
}

/// Errors surfaced by the query-execution layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Query against {table} failed: {reason}")]
    QueryFailed { table: String, reason: String },
}

/// Top-level error type for rowcache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Result alias for rowcache operations.
pub type CacheResult<T> = Result<T, CacheError>;
