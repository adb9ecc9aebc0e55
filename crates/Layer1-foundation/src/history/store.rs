//! Conversation history store
//!
//! Append-ordered, id-indexed log of turns. Appending an id that is already
//! present replaces the old entry and moves it to the newest position. At
//! capacity the oldest entry is evicted.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use super::entry::{HistoryEntry, Role};
use crate::cache::OrderedMap;
use crate::config::HistoryConfig;
use crate::storage::{PersistJob, PersistenceHandle};

/// History statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    /// Entries ever appended or restored
    pub total_entries: u64,
    pub current_entries: usize,
    pub max_entries: usize,
    /// Entries ever flagged by compaction, including ones since evicted
    pub compacted_entries: u64,
    /// `compacted_entries / max(total_entries, 1)`
    pub compaction_ratio: f64,
    pub estimated_memory_bytes: usize,
}

#[derive(Default)]
struct HistoryState {
    /// Front is oldest
    entries: OrderedMap<String, HistoryEntry>,
    total_entries: u64,
    compacted_entries: u64,
}

/// Bounded conversation log
pub struct HistoryStore {
    config: HistoryConfig,
    inner: Mutex<HistoryState>,
    persistence: Option<PersistenceHandle>,
}

impl HistoryStore {
    pub fn new(mut config: HistoryConfig) -> Self {
        config.max_entries = config.max_entries.max(1);
        Self {
            config,
            inner: Mutex::new(HistoryState::default()),
            persistence: None,
        }
    }

    /// Mirror appends and clears through the persistence worker
    pub fn with_persistence(mut self, handle: PersistenceHandle) -> Self {
        self.persistence = Some(handle);
        self
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Append a turn, returning its id
    ///
    /// Entries evicted to make room are deleted from the mirror as well.
    pub fn append(&self, entry: HistoryEntry) -> String {
        let id = entry.id.clone();
        let mirrored = self.persistence.is_some();
        let mut jobs = Vec::new();

        {
            let mut state = self.inner.lock();
            if state.entries.remove(&id).is_some() {
                debug!(id = %id, "Replacing history entry");
            }

            while state.entries.len() >= self.config.max_entries {
                match state.entries.pop_front() {
                    Some((evicted, _)) => {
                        debug!(id = %evicted, "Evicted history entry");
                        if mirrored {
                            jobs.push(PersistJob::DeleteHistoryEntry(evicted));
                        }
                    }
                    None => break,
                }
            }

            if mirrored {
                jobs.push(PersistJob::SaveHistoryEntry(entry.clone()));
            }
            state.entries.push_back(id.clone(), entry);
            state.total_entries += 1;

            if self.config.auto_compact {
                self.compact_locked(&mut state);
            }
        }

        if let Some(handle) = &self.persistence {
            for job in jobs {
                handle.submit(job);
            }
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.inner.lock().entries.get(id).cloned()
    }

    /// The last `limit` entries in chronological order
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let state = self.inner.lock();
        let mut recent: Vec<HistoryEntry> = state
            .entries
            .iter()
            .rev()
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect();
        recent.reverse();
        recent
    }

    /// Newest-first case-insensitive substring search
    ///
    /// An empty query matches every entry.
    pub fn search(&self, query: &str, role: Option<Role>, limit: usize) -> Vec<HistoryEntry> {
        let needle = query.to_lowercase();
        let state = self.inner.lock();
        state
            .entries
            .iter()
            .rev()
            .map(|(_, entry)| entry)
            .filter(|entry| role.map_or(true, |r| entry.role == r))
            .filter(|entry| needle.is_empty() || entry.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Flag old entries as compacted, returning how many were newly flagged
    pub fn compact(&self) -> usize {
        let mut state = self.inner.lock();
        self.compact_locked(&mut state)
    }

    fn compact_locked(&self, state: &mut HistoryState) -> usize {
        let count = state.entries.len();
        if count <= self.config.compaction_threshold {
            return 0;
        }

        let to_flag = count.saturating_sub(self.config.keep_count());
        let mut flagged = 0;
        state.entries.for_each_front_mut(to_flag, |_, entry| {
            if !entry.is_compacted() {
                entry.mark_compacted();
                flagged += 1;
            }
        });

        state.compacted_entries += flagged as u64;
        if flagged > 0 {
            debug!(flagged, live = count, "Compacted history entries");
        }
        flagged
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        *self.inner.lock() = HistoryState::default();
        if let Some(handle) = &self.persistence {
            handle.submit(PersistJob::ClearHistory);
        }
        info!("History cleared");
    }

    /// Load entries from the backing store without persisting them again
    ///
    /// Input is newest first; at most `max_entries` are kept and memory order
    /// ends up chronological. Returns the number restored.
    pub fn restore(&self, entries: Vec<HistoryEntry>) -> usize {
        let mut state = self.inner.lock();
        let room = self.config.max_entries.saturating_sub(state.entries.len());

        let mut restored = 0;
        for entry in entries.into_iter().take(room).rev() {
            if state.entries.contains_key(&entry.id) {
                continue;
            }
            state.entries.push_back(entry.id.clone(), entry);
            restored += 1;
        }
        state.total_entries += restored as u64;

        if self.config.auto_compact {
            self.compact_locked(&mut state);
        }
        restored
    }

    pub fn stats(&self) -> HistoryStats {
        let state = self.inner.lock();
        let estimated_memory_bytes = state
            .entries
            .iter()
            .map(|(_, entry)| entry.estimated_bytes())
            .sum();

        HistoryStats {
            total_entries: state.total_entries,
            current_entries: state.entries.len(),
            max_entries: self.config.max_entries,
            compacted_entries: state.compacted_entries,
            compaction_ratio: state.compacted_entries as f64 / state.total_entries.max(1) as f64,
            estimated_memory_bytes,
        }
    }
}
