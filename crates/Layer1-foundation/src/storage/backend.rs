//! Persistence backend trait
//!
//! The worker only talks to this trait, so the SQLite store can be swapped
//! for a failing or slow double in tests.

use chrono::{DateTime, Utc};

use crate::cache::CachedArtifact;
use crate::history::HistoryEntry;
use crate::Result;

/// Write side of the durable mirror
///
/// Implementations are called from the single persistence worker thread and
/// may block.
pub trait PersistenceBackend: Send + Sync {
    /// Insert or replace the row for `artifact.key`
    fn save_artifact(&self, artifact: &CachedArtifact) -> Result<()>;

    /// Insert or replace the row for `entry.id`
    fn save_history_entry(&self, entry: &HistoryEntry) -> Result<()>;

    /// Delete the history row for `id`, if any
    fn delete_history_entry(&self, id: &str) -> Result<()>;

    /// Delete every cached artifact row
    fn clear_artifacts(&self) -> Result<()>;

    /// Delete every history row
    fn clear_history(&self) -> Result<()>;

    /// Delete artifact rows created before `cutoff`, returning how many went
    fn purge_artifacts_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
