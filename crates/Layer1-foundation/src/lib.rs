//! # recall-foundation
//!
//! Response cache and conversation history for an AI assistant:
//! - Cache: request fingerprinting, LRU/TTL/byte-bounded artifact cache, janitor
//! - History: bounded append log with search and compaction flagging
//! - Storage: SQLite write-behind mirror used for warm start
//! - Config: one JSON-loadable `RecallConfig`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  RecallManager                                          │
//! │  ├── KeyDeriver ──▶ ResponseCache ◀── Janitor           │
//! │  └── HistoryStore                                       │
//! │              │ PersistJob (try_send)                    │
//! │              ▼                                          │
//! │     PersistenceWorker ──▶ SqliteStore (recall.db)       │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod manager;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    HistoryConfig, JanitorConfig, PersistenceConfig, RecallConfig, ResponseCacheConfig,
    RECALL_CONFIG_FILE, RECALL_DB_FILE,
};

// ============================================================================
// Cache
// ============================================================================
pub use cache::{
    ArtifactKind, CacheKey, CachedArtifact, Janitor, KeyDerivationError, KeyDeriver,
    ResponseCache, ResponseCacheStats, ToolCall,
};

// ============================================================================
// History
// ============================================================================
pub use history::{HistoryEntry, HistoryStats, HistoryStore, Role};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{
    PersistJob, PersistenceBackend, PersistenceHandle, PersistenceStats, PersistenceWorker,
    SqliteStore,
};

// ============================================================================
// Manager
// ============================================================================
pub use manager::{RecallManager, RecallStats};
