//! Error types for recall
//!
//! All errors are collected in one enum. Persistence failures are logged by the
//! worker and never surface through the cache or history hot paths.

use thiserror::Error;

use crate::cache::KeyDerivationError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// recall error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Cache
    // ========================================================================
    #[error("Key derivation failed: {0}")]
    KeyDerivation(#[from] KeyDerivationError),

    #[error("Entry too large: {key} is {size_bytes} bytes, budget is {budget_bytes} bytes")]
    EntryTooLarge {
        key: String,
        size_bytes: usize,
        budget_bytes: usize,
    },

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a persistence job failing with this error is worth another attempt.
    ///
    /// Disk and database errors may be transient (busy database, full disk being
    /// cleaned up). Malformed data will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Sqlite(_) | Error::Io(_))
    }

    /// Helper for the capacity rejection returned by `ResponseCache::put`
    pub fn entry_too_large(key: impl Into<String>, size_bytes: usize, budget_bytes: usize) -> Self {
        Error::EntryTooLarge {
            key: key.into(),
            size_bytes,
            budget_bytes,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Storage("database is locked".to_string()).is_retryable());
        assert!(Error::Io(std::io::Error::other("disk")).is_retryable());

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!Error::Json(json_err).is_retryable());
        assert!(!Error::entry_too_large("k", 10, 5).is_retryable());
    }

    #[test]
    fn test_entry_too_large_message() {
        let err = Error::entry_too_large("abc", 2048, 1024);
        assert_eq!(
            err.to_string(),
            "Entry too large: abc is 2048 bytes, budget is 1024 bytes"
        );
    }
}
