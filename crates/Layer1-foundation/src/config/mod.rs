//! Configuration module

mod recall;

pub use recall::{
    default_db_path, HistoryConfig, JanitorConfig, PersistenceConfig, RecallConfig,
    ResponseCacheConfig, RECALL_CONFIG_FILE, RECALL_DB_FILE,
};
