//! Deterministic cache-key derivation.
//!
//! Keys are namespaced strings of the form
//! `<namespace><role>:<TypeName>:<discriminator>:<hashed-identity>`.
//! The identity hash collapses formatting differences (numeric vs. string
//! id) through [`Value::key_part`], so the same logical identity always
//! derives the same key, and distinct identities do not collide in
//! practice (SHA-256, hex-truncated).
//!
//! Derivation is pure: no I/O, and the only failure mode is a malformed
//! identity tuple (arity mismatch against the declared index columns).

use sha2::{Digest, Sha256};
use std::fmt;

use rowcache_core::{IdentityError, RecordId, SchemaFingerprint, Value};

/// Default key namespace. Versioned so a key-format change re-keys the
/// whole cache instead of decoding stale shapes.
pub const DEFAULT_NAMESPACE: &str = "rc:1:";

/// Separator joining identity parts before hashing. An ASCII unit
/// separator keeps `["a,b"]` and `["a","b"]` from hashing identically.
const IDENTITY_SEPARATOR: char = '\u{1f}';

/// Hex length of the hashed identity segment.
const HASH_LEN: usize = 16;

/// An opaque, derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Logical role of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Attribute,
    Index,
    Blob,
}

impl KeyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::Attribute => "attribute",
            KeyRole::Index => "index",
            KeyRole::Blob => "blob",
        }
    }
}

/// Derives cache keys for one configured namespace.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    namespace: String,
}

impl KeyDeriver {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key for a single cached column, looked up by primary key.
    pub fn attribute_key(
        &self,
        type_name: &str,
        column: &str,
        pk_column: &str,
        id: &Value,
    ) -> CacheKey {
        CacheKey(format!(
            "{}{}:{}:{}:{}:{}",
            self.namespace,
            KeyRole::Attribute.as_str(),
            type_name,
            column,
            pk_column,
            hash_identity(std::slice::from_ref(id)),
        ))
    }

    /// Key for an index over the given columns and values, in declared
    /// column order. Rejects a value tuple whose arity does not match the
    /// index columns.
    pub fn index_key(
        &self,
        type_name: &str,
        columns: &[String],
        values: &[Value],
    ) -> Result<CacheKey, IdentityError> {
        if columns.len() != values.len() {
            return Err(IdentityError::ArityMismatch {
                type_name: type_name.to_string(),
                columns: columns.join(","),
                expected: columns.len(),
                got: values.len(),
            });
        }
        Ok(CacheKey(format!(
            "{}{}:{}:{}:{}",
            self.namespace,
            KeyRole::Index.as_str(),
            type_name,
            columns.join(","),
            hash_identity(values),
        )))
    }

    /// Key for a whole-record blob. The schema fingerprint is a key
    /// component, so a schema change re-keys every blob entry.
    pub fn blob_key(
        &self,
        type_name: &str,
        fingerprint: &SchemaFingerprint,
        id: RecordId,
    ) -> CacheKey {
        CacheKey(format!(
            "{}{}:{}:{}:{}",
            self.namespace,
            KeyRole::Blob.as_str(),
            type_name,
            fingerprint,
            id,
        ))
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Hash a normalized identity tuple to the hex segment embedded in keys.
fn hash_identity(values: &[Value]) -> String {
    let mut hasher = Sha256::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            let mut sep = [0u8; 4];
            hasher.update(IDENTITY_SEPARATOR.encode_utf8(&mut sep).as_bytes());
        }
        hasher.update(value.key_part().as_bytes());
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(HASH_LEN);
    hex
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Derivation is deterministic: the same identity always hashes to
        /// the same key regardless of call order.
        #[test]
        fn prop_derivation_is_deterministic(
            type_name in "[A-Z][a-zA-Z]{0,12}",
            column in "[a-z_]{1,12}",
            id in value_strategy(),
        ) {
            let d = KeyDeriver::default();
            let a = d.attribute_key(&type_name, &column, "id", &id);
            let b = d.attribute_key(&type_name, &column, "id", &id);
            prop_assert_eq!(a, b);
        }

        /// Distinct single-value identities with distinct canonical forms
        /// derive distinct keys.
        #[test]
        fn prop_distinct_identities_distinct_keys(
            a in value_strategy(),
            b in value_strategy(),
        ) {
            let d = KeyDeriver::default();
            let columns = vec!["title".to_string()];
            let key_a = d.index_key("Item", &columns, std::slice::from_ref(&a))
                .expect("derivation should succeed");
            let key_b = d.index_key("Item", &columns, std::slice::from_ref(&b))
                .expect("derivation should succeed");
            if a.key_part() == b.key_part() {
                prop_assert_eq!(key_a, key_b);
            } else {
                prop_assert_ne!(key_a, key_b);
            }
        }

        /// Every derived key carries the namespace prefix and role tag.
        #[test]
        fn prop_keys_are_namespaced(
            type_name in "[A-Z][a-zA-Z]{0,12}",
            id in value_strategy(),
        ) {
            let d = KeyDeriver::default();
            let key = d.attribute_key(&type_name, "title", "id", &id);
            prop_assert!(key.as_str().starts_with("rc:1:attribute:"));
        }
    }
}
