//! Recall Manager
//!
//! Owns the response cache, the history store and their background tasks,
//! all built from one [`RecallConfig`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::cache::{CacheKey, CachedArtifact, Janitor, KeyDeriver, ResponseCache, ResponseCacheStats};
use crate::config::RecallConfig;
use crate::history::{HistoryEntry, HistoryStats, HistoryStore, Role};
use crate::storage::{PersistenceStats, PersistenceWorker, SqliteStore};
use crate::{Error, Result};

/// Combined statistics
#[derive(Debug, Clone, Serialize)]
pub struct RecallStats {
    pub cache: ResponseCacheStats,
    pub history: HistoryStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceStats>,
}

/// Process-local owner of cache and history
///
/// # Usage
///
/// ```rust,ignore
/// let recall = RecallManager::open(RecallConfig::load(path)?).await;
///
/// if let Some(hit) = recall.lookup(&request) {
///     return Ok(hit.content);
/// }
/// let content = generate(&request).await?;
/// recall.store(&request, CachedArtifact::text(content.clone()))?;
/// recall.record_turn(Role::Assistant, content);
///
/// recall.shutdown().await;
/// ```
pub struct RecallManager {
    config: RecallConfig,
    deriver: KeyDeriver,
    cache: Arc<ResponseCache>,
    history: Arc<HistoryStore>,
    worker: Option<PersistenceWorker>,
    janitor: Option<Janitor>,
}

impl RecallManager {
    /// Memory-only manager without background tasks
    pub fn in_memory(config: RecallConfig) -> Self {
        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let history = Arc::new(HistoryStore::new(config.history.clone()));
        Self {
            config,
            deriver: KeyDeriver::new(),
            cache,
            history,
            worker: None,
            janitor: None,
        }
    }

    /// Build the manager, warm-start from disk and start background tasks
    ///
    /// When persistence is enabled but the database cannot be opened or read,
    /// the error is logged and the manager runs memory-only. Must be called
    /// from within a tokio runtime.
    pub async fn open(config: RecallConfig) -> Self {
        let mut cache = ResponseCache::new(config.cache.clone());
        let mut history = HistoryStore::new(config.history.clone());
        let mut worker = None;

        if config.persistence.enabled {
            match warm_start(&config, &cache, &history).await {
                Ok(store) => {
                    let spawned = PersistenceWorker::spawn(store, &config.persistence);
                    cache = cache.with_persistence(spawned.handle());
                    history = history.with_persistence(spawned.handle());
                    worker = Some(spawned);
                }
                Err(e) => {
                    error!(
                        db_path = %config.persistence.db_path().display(),
                        error = %e,
                        "Persistence unavailable, running in memory only"
                    );
                }
            }
        }

        let cache = Arc::new(cache);
        let janitor = config
            .janitor
            .enabled
            .then(|| Janitor::spawn(cache.clone(), config.janitor.interval()));

        Self {
            config,
            deriver: KeyDeriver::new(),
            cache,
            history: Arc::new(history),
            worker,
            janitor,
        }
    }

    /// Replace the key deriver (custom volatile fields)
    pub fn with_key_deriver(mut self, deriver: KeyDeriver) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    pub fn key_deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn persistence_enabled(&self) -> bool {
        self.worker.is_some()
    }

    pub fn derive_key<T: Serialize + ?Sized>(&self, request: &T) -> Result<CacheKey> {
        Ok(self.deriver.derive(request)?)
    }

    /// Cached artifact for a request
    ///
    /// A request that cannot be fingerprinted is reported as a miss.
    pub fn lookup<T: Serialize + ?Sized>(&self, request: &T) -> Option<CachedArtifact> {
        match self.deriver.derive(request) {
            Ok(key) => self.cache.get(&key),
            Err(e) => {
                debug!(error = %e, "Request not cacheable");
                None
            }
        }
    }

    /// Cache an artifact under the request's fingerprint
    pub fn store<T: Serialize + ?Sized>(
        &self,
        request: &T,
        artifact: CachedArtifact,
    ) -> Result<CacheKey> {
        let key = self.derive_key(request)?;
        self.cache.put(key.clone(), artifact)?;
        Ok(key)
    }

    /// Append a turn to the history, returning its id
    pub fn record_turn(&self, role: Role, content: impl Into<String>) -> String {
        self.history.append(HistoryEntry::new(role, content))
    }

    pub fn stats(&self) -> RecallStats {
        RecallStats {
            cache: self.cache.stats(),
            history: self.history.stats(),
            persistence: self.worker.as_ref().map(PersistenceWorker::stats),
        }
    }

    /// Stop the janitor, then drain pending persistence jobs
    pub async fn shutdown(self) -> RecallStats {
        if let Some(janitor) = self.janitor {
            janitor.shutdown().await;
        }

        let persistence = match self.worker {
            Some(worker) => Some(worker.shutdown().await),
            None => None,
        };

        RecallStats {
            cache: self.cache.stats(),
            history: self.history.stats(),
            persistence,
        }
    }
}

/// Open the database and restore what fits into the empty stores
async fn warm_start(
    config: &RecallConfig,
    cache: &ResponseCache,
    history: &HistoryStore,
) -> Result<Arc<SqliteStore>> {
    let path = config.persistence.db_path();
    let ttl = cache.config().ttl();
    let max_bytes = cache.config().max_memory_bytes;
    let max_count = cache.config().max_size;
    let history_limit = history.config().max_entries;

    let (store, artifacts, entries) = tokio::task::spawn_blocking(move || {
        let store = SqliteStore::open(&path)?;
        let artifacts = store.load_artifacts(ttl, max_bytes, max_count)?;
        let entries = store.load_history(history_limit)?;
        Ok::<_, Error>((store, artifacts, entries))
    })
    .await
    .map_err(|e| Error::Internal(format!("Warm start task failed: {}", e)))??;

    let artifacts = cache.restore(artifacts);
    let entries = history.restore(entries);
    info!(artifacts, entries, "Warm start complete");

    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_store_then_lookup() {
        let recall = RecallManager::in_memory(RecallConfig::default());
        let request = json!({"model": "grok-3", "prompt": "hi", "request_id": "r1"});

        assert!(recall.lookup(&request).is_none());
        let key = recall
            .store(&request, CachedArtifact::text("hello"))
            .unwrap();

        let replay = json!({"request_id": "r2", "prompt": "hi", "model": "grok-3"});
        let hit = recall.lookup(&replay).expect("same fingerprint");
        assert_eq!(hit.key, key.as_str());
        assert_eq!(hit.content, "hello");

        let stats = recall.stats();
        assert_eq!(stats.cache.hits, 1);
        assert_eq!(stats.cache.misses, 1);
        assert!(stats.persistence.is_none());
    }

    #[test]
    fn test_uncacheable_request_is_a_miss() {
        let recall = RecallManager::in_memory(RecallConfig::default());
        let mut request: HashMap<(u8, u8), &str> = HashMap::new();
        request.insert((0, 1), "x");

        assert!(recall.lookup(&request).is_none());
        let err = recall
            .store(&request, CachedArtifact::text("x"))
            .unwrap_err();
        assert!(matches!(err, Error::KeyDerivation(_)));
        assert!(recall.cache().is_empty());
    }

    #[test]
    fn test_record_turn() {
        let recall = RecallManager::in_memory(RecallConfig::default());
        let id = recall.record_turn(Role::User, "question");
        recall.record_turn(Role::Assistant, "answer");

        assert_eq!(recall.history().get(&id).unwrap().content, "question");
        assert_eq!(recall.stats().history.current_entries, 2);
    }

    #[tokio::test]
    async fn test_open_without_persistence() {
        let recall = RecallManager::open(RecallConfig::default()).await;
        assert!(!recall.persistence_enabled());

        recall.record_turn(Role::User, "hi");
        let stats = recall.shutdown().await;
        assert_eq!(stats.history.current_entries, 1);
    }

    #[tokio::test]
    async fn test_drop_releases_cache() {
        let recall = RecallManager::open(RecallConfig::default()).await;
        assert!(recall.janitor.is_some());
        let cache = Arc::downgrade(recall.cache());

        drop(recall);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert!(cache.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_open_falls_back_when_db_unusable() {
        let dir = tempfile::tempdir().unwrap();
        // Parent of the database path is a regular file
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let config = RecallConfig::default()
            .with_persistence_path(blocker.join("recall.db"))
            .without_janitor();

        let recall = RecallManager::open(config).await;
        assert!(!recall.persistence_enabled());

        recall.store(&json!({"p": 1}), CachedArtifact::text("ok")).unwrap();
        assert!(recall.lookup(&json!({"p": 1})).is_some());
        recall.shutdown().await;
    }
}
