//! Rowcache Core - Data Types
//!
//! Pure data structures with no I/O. All other crates depend on this.
//! This crate contains the value/record/schema model, the cached-payload
//! flavors (including the NULL sentinel and the tombstone marker), and the
//! error taxonomy.

pub mod error;
pub mod payload;
pub mod record;
pub mod schema;
pub mod value;

pub use error::{
    BackendError, CacheError, CacheResult, IdentityError, RegistryError, SourceError,
};
pub use payload::{CachedPayload, PayloadKind};
pub use record::Record;
pub use schema::{ColumnDef, ColumnType, SchemaFingerprint, TableSchema};
pub use value::{RecordId, Value};
