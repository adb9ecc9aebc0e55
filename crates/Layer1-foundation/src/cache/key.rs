//! Request fingerprinting
//!
//! Turns an arbitrary request description (model, parameters, prompt, tool
//! schema) into a short, stable cache key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

use super::util::{ensure_finite, hash_json};

/// Fields that change between otherwise identical requests
pub const DEFAULT_VOLATILE_FIELDS: &[&str] = &["timestamp", "request_id", "stream"];

/// Length of a derived key in hex characters
pub const KEY_LENGTH: usize = 16;

/// Request could not be turned into a canonical value
#[derive(Error, Debug)]
pub enum KeyDerivationError {
    #[error("request cannot be canonicalized: {0}")]
    Unsupported(String),
}

/// Fingerprint of a normalized request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for CacheKey {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Derives cache keys from request descriptions
///
/// # Algorithm
///
/// 1. Strip volatile fields from every object, at every nesting level
/// 2. Serialize with sorted keys and no whitespace
/// 3. SHA-256, hex, truncated to [`KEY_LENGTH`] characters
///
/// # Example
///
/// ```rust,ignore
/// let deriver = KeyDeriver::new();
/// let a = deriver.derive(&json!({"model": "m", "prompt": "hi", "stream": true}))?;
/// let b = deriver.derive(&json!({"prompt": "hi", "model": "m"}))?;
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    volatile_fields: HashSet<String>,
}

impl KeyDeriver {
    pub fn new() -> Self {
        Self::with_volatile_fields(DEFAULT_VOLATILE_FIELDS.iter().copied())
    }

    /// Use a custom set of volatile fields instead of the defaults
    pub fn with_volatile_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            volatile_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Derive a key from any serializable request
    ///
    /// Fails when the request has no canonical JSON form, e.g. a map keyed
    /// by something other than strings or a NaN/infinite float.
    pub fn derive<T>(&self, request: &T) -> Result<CacheKey, KeyDerivationError>
    where
        T: Serialize + ?Sized,
    {
        ensure_finite(request).map_err(|e| KeyDerivationError::Unsupported(e.to_string()))?;
        let value = serde_json::to_value(request)
            .map_err(|e| KeyDerivationError::Unsupported(e.to_string()))?;
        Ok(self.derive_value(&value))
    }

    /// Derive a key from an already-built JSON value
    pub fn derive_value(&self, request: &Value) -> CacheKey {
        let normalized = self.normalize(request);
        let mut digest = hash_json(&normalized);
        digest.truncate(KEY_LENGTH);
        CacheKey(digest)
    }

    /// Remove volatile fields recursively
    pub fn normalize(&self, value: &Value) -> Value {
        match value {
            Value::Object(obj) => {
                let mut normalized = Map::new();
                for (key, v) in obj {
                    if !self.volatile_fields.contains(key) {
                        normalized.insert(key.clone(), self.normalize(v));
                    }
                }
                Value::Object(normalized)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(|v| self.normalize(v)).collect()),
            other => other.clone(),
        }
    }

    pub fn is_volatile(&self, field: &str) -> bool {
        self.volatile_fields.contains(field)
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}
