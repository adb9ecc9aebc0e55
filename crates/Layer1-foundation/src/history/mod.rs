//! Conversation history
//!
//! - `entry`: turn types
//! - `store`: bounded append log with search and compaction

mod entry;
mod store;

pub use entry::{HistoryEntry, Role, COMPACTED_FLAG};
pub use store::{HistoryStats, HistoryStore};
