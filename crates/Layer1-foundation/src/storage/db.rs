//! SQLite mirror for cache and history entries
//!
//! Durable copy of what lives in memory:
//! - cache_entries: cached artifacts keyed by fingerprint
//! - history_entries: conversation turns keyed by entry id
//!
//! Never the source of truth while the process is alive. It is only read at
//! startup (warm start) and written by the persistence worker.
//!
//! ## Schema versioning
//!
//! `schema_version` records applied versions; tables are created with
//! `IF NOT EXISTS`, so opening an existing file is idempotent.
//! - Version 1: cache_entries, history_entries

use crate::cache::{ArtifactKind, CachedArtifact, ToolCall};
use crate::history::{HistoryEntry, Role};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::PersistenceBackend;

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// SQLite-backed persistence store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create data directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // WAL keeps the worker's writes from blocking warm-start reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.initialize_schema()?;

        info!(db_path = %path.display(), "Persistence store opened");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Get current schema version from database
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                response_type TEXT NOT NULL,
                tool_calls TEXT,
                metadata TEXT,
                created_at TEXT NOT NULL,
                accessed_at TEXT NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_accessed
                ON cache_entries(accessed_at DESC);

            CREATE TABLE IF NOT EXISTS history_entries (
                id TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_entries_timestamp
                ON history_entries(timestamp DESC);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| Error::Storage(format!("Failed to record schema version: {}", e)))?;

        Ok(())
    }

    // ========================================================================
    // Cache Entries
    // ========================================================================

    /// Load artifacts for warm start, most recently accessed first
    ///
    /// Rows older than `ttl` and rows that fail to decode are skipped. Loading
    /// stops as soon as the next row would push past `max_bytes` or
    /// `max_count`.
    pub fn load_artifacts(
        &self,
        ttl: Duration,
        max_bytes: usize,
        max_count: usize,
    ) -> Result<Vec<CachedArtifact>> {
        let conn = self.lock()?;
        let now = Utc::now();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT key, content, response_type, tool_calls, metadata,
                       created_at, accessed_at, access_count
                FROM cache_entries
                ORDER BY accessed_at DESC, rowid DESC
                "#,
            )
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], CacheRow::from_row)
            .map_err(|e| Error::Storage(format!("Failed to query cache entries: {}", e)))?;

        let mut loaded = Vec::new();
        let mut loaded_bytes = 0usize;
        let mut skipped = 0usize;

        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable cache row");
                    skipped += 1;
                    continue;
                }
            };

            let key = row.key.clone();
            let artifact = match row.into_artifact() {
                Ok(artifact) => artifact,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to load cache entry");
                    skipped += 1;
                    continue;
                }
            };

            if artifact.is_expired(ttl, now) {
                skipped += 1;
                continue;
            }

            if loaded.len() >= max_count || loaded_bytes + artifact.size_bytes > max_bytes {
                debug!(
                    loaded = loaded.len(),
                    loaded_bytes, "Cache warm start reached its budget"
                );
                break;
            }

            loaded_bytes += artifact.size_bytes;
            loaded.push(artifact);
        }

        debug!(loaded = loaded.len(), skipped, "Loaded persisted cache entries");
        Ok(loaded)
    }

    /// Number of artifact rows on disk
    pub fn artifact_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .map_err(|e| Error::Storage(format!("Failed to count cache entries: {}", e)))?;
        Ok(count as usize)
    }

    // ========================================================================
    // History Entries
    // ========================================================================

    /// Load up to `limit` history entries, newest first
    pub fn load_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, role, content, timestamp, metadata
                FROM history_entries
                ORDER BY timestamp DESC, rowid DESC
                LIMIT ?1
                "#,
            )
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], HistoryRow::from_row)
            .map_err(|e| Error::Storage(format!("Failed to query history entries: {}", e)))?;

        let mut loaded = Vec::new();
        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable history row");
                    continue;
                }
            };

            let id = row.id.clone();
            match row.into_entry() {
                Ok(entry) => loaded.push(entry),
                Err(e) => warn!(id = %id, error = %e, "Failed to load history entry"),
            }
        }

        debug!(loaded = loaded.len(), "Loaded persisted history entries");
        Ok(loaded)
    }

    /// Number of history rows on disk
    pub fn history_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM history_entries", [], |row| row.get(0))
            .map_err(|e| Error::Storage(format!("Failed to count history entries: {}", e)))?;
        Ok(count as usize)
    }
}

impl PersistenceBackend for SqliteStore {
    fn save_artifact(&self, artifact: &CachedArtifact) -> Result<()> {
        let tool_calls = serde_json::to_string(&artifact.tool_calls)?;
        let metadata = serde_json::to_string(&artifact.metadata)?;
        let access_count = i64::try_from(artifact.access_count).unwrap_or(i64::MAX);

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
                (key, content, response_type, tool_calls, metadata,
                 created_at, accessed_at, access_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                artifact.key,
                artifact.content,
                artifact.kind.as_str(),
                tool_calls,
                metadata,
                to_db_time(&artifact.created_at),
                to_db_time(&artifact.accessed_at),
                access_count,
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to save cache entry: {}", e)))?;

        Ok(())
    }

    fn save_history_entry(&self, entry: &HistoryEntry) -> Result<()> {
        let metadata = serde_json::to_string(&entry.metadata)?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO history_entries (id, role, content, timestamp, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.id,
                entry.role.as_str(),
                entry.content,
                to_db_time(&entry.timestamp),
                metadata,
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to save history entry: {}", e)))?;

        Ok(())
    }

    fn clear_artifacts(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM cache_entries", [])
            .map_err(|e| Error::Storage(format!("Failed to clear cache entries: {}", e)))?;
        Ok(())
    }

    fn delete_history_entry(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM history_entries WHERE id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Failed to delete history entry: {}", e)))?;
        Ok(())
    }

    fn clear_history(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM history_entries", [])
            .map_err(|e| Error::Storage(format!("Failed to clear history entries: {}", e)))?;
        Ok(())
    }

    fn purge_artifacts_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM cache_entries WHERE created_at < ?1",
                params![to_db_time(&cutoff)],
            )
            .map_err(|e| Error::Storage(format!("Failed to purge cache entries: {}", e)))?;
        Ok(removed)
    }
}

// ============================================================================
// Row Types
// ============================================================================

struct CacheRow {
    key: String,
    content: String,
    response_type: String,
    tool_calls: Option<String>,
    metadata: Option<String>,
    created_at: String,
    accessed_at: String,
    access_count: i64,
}

impl CacheRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            content: row.get(1)?,
            response_type: row.get(2)?,
            tool_calls: row.get(3)?,
            metadata: row.get(4)?,
            created_at: row.get(5)?,
            accessed_at: row.get(6)?,
            access_count: row.get(7)?,
        })
    }

    fn into_artifact(self) -> Result<CachedArtifact> {
        let tool_calls: Vec<ToolCall> = match self.tool_calls.as_deref() {
            Some(json) if !json.is_empty() => serde_json::from_str(json)?,
            _ => Vec::new(),
        };
        let metadata = parse_metadata(self.metadata.as_deref())?;

        let mut artifact = CachedArtifact {
            key: self.key,
            content: self.content,
            kind: ArtifactKind::parse(&self.response_type),
            tool_calls,
            metadata,
            created_at: from_db_time(&self.created_at)?,
            accessed_at: from_db_time(&self.accessed_at)?,
            access_count: u64::try_from(self.access_count).unwrap_or(0),
            size_bytes: 0,
        };
        artifact.recompute_size();
        Ok(artifact)
    }
}

struct HistoryRow {
    id: String,
    role: String,
    content: String,
    timestamp: String,
    metadata: Option<String>,
}

impl HistoryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            role: row.get(1)?,
            content: row.get(2)?,
            timestamp: row.get(3)?,
            metadata: row.get(4)?,
        })
    }

    fn into_entry(self) -> Result<HistoryEntry> {
        Ok(HistoryEntry {
            role: self.role.parse::<Role>()?,
            metadata: parse_metadata(self.metadata.as_deref())?,
            timestamp: from_db_time(&self.timestamp)?,
            id: self.id,
            content: self.content,
        })
    }
}

fn parse_metadata(json: Option<&str>) -> Result<HashMap<String, Value>> {
    match json {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(json)?),
        _ => Ok(HashMap::new()),
    }
}

/// Fixed-width UTC timestamps sort lexicographically
///
/// Rows with equal timestamps fall back to rowid, which `INSERT OR REPLACE`
/// renews, so the latest write sorts as newest.
fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn from_db_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Validation(format!("invalid timestamp {:?}: {}", s, e)))
}
