//! Storage module
//!
//! - `backend`: write-side trait used by the worker
//! - `db`: SQLite mirror of cache and history entries
//! - `worker`: bounded write-behind queue

mod backend;
mod db;
mod worker;

pub use backend::PersistenceBackend;
pub use db::SqliteStore;
pub use worker::{PersistJob, PersistenceHandle, PersistenceStats, PersistenceWorker};
