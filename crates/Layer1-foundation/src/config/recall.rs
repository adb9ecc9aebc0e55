//! Recall configuration
//!
//! One config struct covers the response cache, the history log, the
//! persistence mirror and the janitor. Every field has a serde default so a
//! partial JSON file is enough.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name
pub const RECALL_CONFIG_FILE: &str = "recall.json";

/// Database file name
pub const RECALL_DB_FILE: &str = "recall.db";

// ============================================================================
// Recall Config
// ============================================================================

/// Top level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallConfig {
    #[serde(default)]
    pub cache: ResponseCacheConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub janitor: JanitorConfig,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheConfig {
    /// Maximum number of cached artifacts
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Byte budget across all artifacts
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,

    /// Time-to-live measured from creation (seconds)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

/// History log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of live entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Live count above which old entries get flagged as compacted
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,

    /// Run compaction after every append
    #[serde(default = "default_true")]
    pub auto_compact: bool,
}

/// Persistence mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Mirror entries to SQLite and warm-start from it
    #[serde(default)]
    pub enabled: bool,

    /// Database path (defaults to the local data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Bound of the job queue; jobs submitted to a full queue are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attempts per job before it is abandoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff between attempts, multiplied by the attempt number (ms)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Expired-entry sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sweep interval (seconds)
    #[serde(default = "default_janitor_interval_secs")]
    pub interval_secs: u64,
}

// ============================================================================
// Defaults
// ============================================================================

fn default_max_size() -> usize {
    1000
}
fn default_max_memory_bytes() -> usize {
    50 * 1024 * 1024
} // 50MB
fn default_ttl_secs() -> u64 {
    3600
} // 1 hour
fn default_max_entries() -> usize {
    10_000
}
fn default_compaction_threshold() -> usize {
    1000
}
fn default_queue_capacity() -> usize {
    256
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    50
}
fn default_janitor_interval_secs() -> u64 {
    300
} // 5 minutes
fn default_true() -> bool {
    true
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_memory_bytes: default_max_memory_bytes(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            compaction_threshold: default_compaction_threshold(),
            auto_compact: default_true(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_janitor_interval_secs(),
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ResponseCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl HistoryConfig {
    /// Number of newest entries left unflagged by compaction
    pub fn keep_count(&self) -> usize {
        (self.max_entries / 2).min(self.compaction_threshold / 2)
    }
}

impl PersistenceConfig {
    /// Configured path or `<local data dir>/recall/recall.db`
    pub fn db_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_db_path)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl JanitorConfig {
    /// Sweep interval, never shorter than one second
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Default database location
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recall")
        .join(RECALL_DB_FILE)
}

// ============================================================================
// Presets / Builders
// ============================================================================

impl RecallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Small footprint for resource-constrained environments
    pub fn minimal() -> Self {
        Self {
            cache: ResponseCacheConfig {
                max_size: 200,
                max_memory_bytes: 10 * 1024 * 1024,
                ttl_secs: 900, // 15 minutes
            },
            history: HistoryConfig {
                max_entries: 1000,
                compaction_threshold: 200,
                auto_compact: true,
            },
            persistence: PersistenceConfig {
                queue_capacity: 64,
                ..Default::default()
            },
            janitor: JanitorConfig::default(),
        }
    }

    /// Generous limits for long sessions
    pub fn performance() -> Self {
        Self {
            cache: ResponseCacheConfig {
                max_size: 5000,
                max_memory_bytes: 200 * 1024 * 1024,
                ttl_secs: 4 * 3600,
            },
            history: HistoryConfig {
                max_entries: 50_000,
                compaction_threshold: 5000,
                auto_compact: true,
            },
            persistence: PersistenceConfig {
                queue_capacity: 1024,
                ..Default::default()
            },
            janitor: JanitorConfig {
                enabled: true,
                interval_secs: 120,
            },
        }
    }

    /// Enable persistence at the given database path
    pub fn with_persistence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence.enabled = true;
        self.persistence.path = Some(path.into());
        self
    }

    pub fn without_janitor(mut self) -> Self {
        self.janitor.enabled = false;
        self
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Load from a JSON file, `None` if it does not exist
    pub fn load_optional(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        read_json(path).map(Some)
    }

    /// Save as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", path.display(), e)))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecallConfig::new();
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.max_memory_bytes, 50 * 1024 * 1024);
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.history.max_entries, 10_000);
        assert_eq!(config.history.keep_count(), 500);
        assert!(!config.persistence.enabled);
        assert_eq!(config.persistence.queue_capacity, 256);
        assert_eq!(config.janitor.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RecallConfig =
            serde_json::from_str(r#"{"cache": {"ttl_secs": 5}, "janitor": {"enabled": false}}"#)
                .unwrap();

        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.cache.max_size, 1000);
        assert!(!config.janitor.enabled);
        assert_eq!(config.janitor.interval_secs, 300);
        assert!(config.history.auto_compact);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(RECALL_CONFIG_FILE);

        assert!(RecallConfig::load_optional(&path).unwrap().is_none());

        let config = RecallConfig::minimal().with_persistence_path(dir.path().join("x.db"));
        config.save(&path).unwrap();

        let loaded = RecallConfig::load(&path).unwrap();
        assert_eq!(loaded.cache.max_size, 200);
        assert!(loaded.persistence.enabled);
        assert_eq!(loaded.persistence.db_path(), dir.path().join("x.db"));
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RECALL_CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        let err = RecallConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_default_db_path_file_name() {
        assert!(default_db_path().ends_with(Path::new("recall").join(RECALL_DB_FILE)));
    }
}
