//! Response cache
//!
//! Bounded key -> artifact store with strict LRU eviction, a TTL measured from
//! creation and a byte budget over `size_bytes`.
//!
//! All bookkeeping happens under one mutex. Persistence jobs are built while
//! the lock is held and handed to the worker after it is released.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use super::artifact::CachedArtifact;
use super::util::OrderedMap;
use crate::config::ResponseCacheConfig;
use crate::storage::{PersistJob, PersistenceHandle};
use crate::{Error, Result};

/// Cache statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseCacheStats {
    pub entries: usize,
    pub memory_bytes: usize,
    pub max_memory_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
    pub avg_entry_bytes: usize,
}

#[derive(Default)]
struct CacheState {
    /// Front is least recently used
    entries: OrderedMap<String, CachedArtifact>,
    memory_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl CacheState {
    fn remove_entry(&mut self, key: &str) -> Option<CachedArtifact> {
        let artifact = self.entries.remove(key)?;
        self.memory_bytes = self.memory_bytes.saturating_sub(artifact.size_bytes);
        Some(artifact)
    }

    fn evict_lru(&mut self) -> bool {
        match self.entries.pop_front() {
            Some((key, artifact)) => {
                self.memory_bytes = self.memory_bytes.saturating_sub(artifact.size_bytes);
                self.evictions += 1;
                debug!(key = %key, size_bytes = artifact.size_bytes, "Evicted cache entry");
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, artifact: CachedArtifact) {
        self.memory_bytes += artifact.size_bytes;
        self.entries.push_back(artifact.key.clone(), artifact);
    }
}

/// In-memory response cache
pub struct ResponseCache {
    config: ResponseCacheConfig,
    inner: Mutex<CacheState>,
    persistence: Option<PersistenceHandle>,
}

impl ResponseCache {
    pub fn new(mut config: ResponseCacheConfig) -> Self {
        config.max_size = config.max_size.max(1);
        Self {
            config,
            inner: Mutex::new(CacheState::default()),
            persistence: None,
        }
    }

    /// Mirror puts, clears and sweeps through the persistence worker
    pub fn with_persistence(mut self, handle: PersistenceHandle) -> Self {
        self.persistence = Some(handle);
        self
    }

    pub fn config(&self) -> &ResponseCacheConfig {
        &self.config
    }

    /// Look up an artifact
    ///
    /// An expired entry is removed and reported as a miss. A hit refreshes
    /// `accessed_at`, bumps `access_count` and makes the entry most recent.
    pub fn get(&self, key: &str) -> Option<CachedArtifact> {
        let now = Utc::now();
        let ttl = self.config.ttl();
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        match state.entries.get(key).map(|a| a.is_expired(ttl, now)) {
            None => {
                state.misses += 1;
                None
            }
            Some(true) => {
                state.remove_entry(key);
                state.expirations += 1;
                state.misses += 1;
                debug!(key, "Cache entry expired");
                None
            }
            Some(false) => {
                state.hits += 1;
                state.entries.touch(key);
                let artifact = state.entries.get_mut(key)?;
                artifact.record_access(now);
                Some(artifact.clone())
            }
        }
    }

    /// Insert or replace an artifact
    ///
    /// The artifact's key and size are overwritten. Fails with
    /// [`Error::EntryTooLarge`] when the artifact alone exceeds the byte
    /// budget, leaving the cache untouched.
    pub fn put(&self, key: impl Into<String>, mut artifact: CachedArtifact) -> Result<()> {
        artifact.key = key.into();
        artifact.recompute_size();

        let budget = self.config.max_memory_bytes;
        if artifact.size_bytes > budget {
            return Err(Error::entry_too_large(
                artifact.key,
                artifact.size_bytes,
                budget,
            ));
        }

        let job = {
            let mut state = self.inner.lock();
            state.remove_entry(&artifact.key);

            while state.entries.len() >= self.config.max_size
                || state.memory_bytes + artifact.size_bytes > budget
            {
                if !state.evict_lru() {
                    break;
                }
            }

            let job = self
                .persistence
                .as_ref()
                .map(|_| PersistJob::SaveArtifact(artifact.clone()));
            state.insert(artifact);
            job
        };

        self.submit(job);
        Ok(())
    }

    /// Remove an artifact from memory
    ///
    /// The on-disk row is left for the expiry purge.
    pub fn remove(&self, key: &str) -> Option<CachedArtifact> {
        self.inner.lock().remove_entry(key)
    }

    /// Presence check without touching recency or counters
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        {
            let mut state = self.inner.lock();
            *state = CacheState::default();
        }
        self.submit(
            self.persistence
                .as_ref()
                .map(|_| PersistJob::ClearArtifacts),
        );
        info!("Response cache cleared");
    }

    /// Remove every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let ttl = self.config.ttl();

        let removed = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            let expired = state
                .entries
                .remove_where(|_, artifact| artifact.is_expired(ttl, now));
            for (_, artifact) in &expired {
                state.memory_bytes = state.memory_bytes.saturating_sub(artifact.size_bytes);
            }
            state.expirations += expired.len() as u64;
            expired.len()
        };

        if removed > 0 {
            info!(removed, "Swept expired cache entries");
        }

        if self.persistence.is_some() {
            if let Ok(ttl) = chrono::Duration::from_std(ttl) {
                self.submit(Some(PersistJob::PurgeArtifactsCreatedBefore(now - ttl)));
            }
        }

        removed
    }

    /// Load artifacts from the backing store without persisting them again
    ///
    /// Input is most recently accessed first. Expired artifacts are skipped and
    /// loading stops at the first artifact that does not fit the remaining
    /// count or byte budget. Returns the number restored.
    pub fn restore(&self, artifacts: Vec<CachedArtifact>) -> usize {
        let now = Utc::now();
        let ttl = self.config.ttl();
        let mut state = self.inner.lock();

        let mut slots = self.config.max_size.saturating_sub(state.entries.len());
        let mut bytes = self
            .config
            .max_memory_bytes
            .saturating_sub(state.memory_bytes);

        let mut accepted = Vec::new();
        for mut artifact in artifacts {
            if artifact.is_expired(ttl, now) || state.entries.contains_key(&artifact.key) {
                continue;
            }
            artifact.recompute_size();
            if slots == 0 || artifact.size_bytes > bytes {
                break;
            }
            slots -= 1;
            bytes -= artifact.size_bytes;
            accepted.push(artifact);
        }

        let restored = accepted.len();
        // Oldest first, so the most recently accessed ends up most recent
        for artifact in accepted.into_iter().rev() {
            state.insert(artifact);
        }
        restored
    }

    pub fn stats(&self) -> ResponseCacheStats {
        let state = self.inner.lock();
        let entries = state.entries.len();
        let lookups = state.hits + state.misses;

        ResponseCacheStats {
            entries,
            memory_bytes: state.memory_bytes,
            max_memory_bytes: self.config.max_memory_bytes,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            hit_rate: if lookups > 0 {
                state.hits as f64 / lookups as f64
            } else {
                0.0
            },
            avg_entry_bytes: if entries > 0 {
                state.memory_bytes / entries
            } else {
                0
            },
        }
    }

    fn submit(&self, job: Option<PersistJob>) {
        if let (Some(handle), Some(job)) = (&self.persistence, job) {
            handle.submit(job);
        }
    }
}
