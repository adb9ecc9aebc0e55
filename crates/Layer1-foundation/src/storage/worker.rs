//! Write-behind persistence worker
//!
//! Cache and history mutations enqueue a [`PersistJob`] and return
//! immediately. A single blocking thread drains the queue in submission order
//! and applies each job to the backend.
//!
//! The queue is bounded. When it is full the newest job is dropped and
//! counted; the in-memory state stays authoritative either way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::PersistenceBackend;
use crate::cache::CachedArtifact;
use crate::config::PersistenceConfig;
use crate::history::HistoryEntry;
use crate::Result;

/// A unit of work for the persistence backend
#[derive(Debug, Clone)]
pub enum PersistJob {
    SaveArtifact(CachedArtifact),
    SaveHistoryEntry(HistoryEntry),
    DeleteHistoryEntry(String),
    ClearArtifacts,
    ClearHistory,
    PurgeArtifactsCreatedBefore(DateTime<Utc>),
}

impl PersistJob {
    /// Apply the job to a backend
    pub fn apply(&self, backend: &dyn PersistenceBackend) -> Result<()> {
        match self {
            PersistJob::SaveArtifact(artifact) => backend.save_artifact(artifact),
            PersistJob::SaveHistoryEntry(entry) => backend.save_history_entry(entry),
            PersistJob::DeleteHistoryEntry(id) => backend.delete_history_entry(id),
            PersistJob::ClearArtifacts => backend.clear_artifacts(),
            PersistJob::ClearHistory => backend.clear_history(),
            PersistJob::PurgeArtifactsCreatedBefore(cutoff) => {
                let removed = backend.purge_artifacts_created_before(*cutoff)?;
                if removed > 0 {
                    debug!(removed, "Purged expired artifact rows");
                }
                Ok(())
            }
        }
    }

    /// Short name for logs
    pub fn describe(&self) -> &'static str {
        match self {
            PersistJob::SaveArtifact(_) => "save_artifact",
            PersistJob::SaveHistoryEntry(_) => "save_history_entry",
            PersistJob::DeleteHistoryEntry(_) => "delete_history_entry",
            PersistJob::ClearArtifacts => "clear_artifacts",
            PersistJob::ClearHistory => "clear_history",
            PersistJob::PurgeArtifactsCreatedBefore(_) => "purge_artifacts",
        }
    }
}

/// Worker counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceStats {
    /// Jobs accepted into the queue
    pub submitted: u64,
    /// Jobs applied successfully
    pub completed: u64,
    /// Jobs abandoned after their last attempt
    pub failed: u64,
    /// Jobs rejected because the queue was full or closed
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PersistenceStats {
        PersistenceStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

enum Message {
    Job(PersistJob),
    Shutdown,
}

/// Cloneable submit side of the worker
#[derive(Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<Message>,
    counters: Arc<Counters>,
}

impl PersistenceHandle {
    /// Enqueue a job without blocking
    ///
    /// Returns `false` when the job was dropped.
    pub fn submit(&self, job: PersistJob) -> bool {
        let kind = job.describe();
        match self.tx.try_send(Message::Job(job)) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(job = kind, "Persistence queue full, dropping job");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(job = kind, "Persistence worker stopped, dropping job");
                false
            }
        }
    }

    pub fn stats(&self) -> PersistenceStats {
        self.counters.snapshot()
    }
}

/// Owner of the background persistence thread
pub struct PersistenceWorker {
    handle: PersistenceHandle,
    join: JoinHandle<()>,
}

impl PersistenceWorker {
    /// Start the worker on tokio's blocking pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(backend: Arc<dyn PersistenceBackend>, config: &PersistenceConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let retry = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        };
        let worker_counters = counters.clone();
        let join = tokio::task::spawn_blocking(move || {
            run(rx, backend, retry, worker_counters);
        });

        debug!(
            queue_capacity = config.queue_capacity,
            max_attempts = config.max_attempts,
            "Persistence worker started"
        );

        Self {
            handle: PersistenceHandle { tx, counters },
            join,
        }
    }

    pub fn handle(&self) -> PersistenceHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> PersistenceStats {
        self.handle.stats()
    }

    /// Drain everything queued so far, then stop
    pub async fn shutdown(self) -> PersistenceStats {
        // The sentinel queues behind pending jobs, so they are applied first
        if self.handle.tx.send(Message::Shutdown).await.is_err() {
            debug!("Persistence worker already stopped");
        }
        if let Err(e) = self.join.await {
            error!(error = %e, "Persistence worker panicked");
        }

        let stats = self.handle.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            dropped = stats.dropped,
            "Persistence worker stopped"
        );
        stats
    }
}

#[derive(Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

fn run(
    mut rx: mpsc::Receiver<Message>,
    backend: Arc<dyn PersistenceBackend>,
    retry: RetryPolicy,
    counters: Arc<Counters>,
) {
    while let Some(message) = rx.blocking_recv() {
        let job = match message {
            Message::Job(job) => job,
            Message::Shutdown => break,
        };

        if apply_with_retry(&job, backend.as_ref(), retry) {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn apply_with_retry(job: &PersistJob, backend: &dyn PersistenceBackend, retry: RetryPolicy) -> bool {
    let mut attempt = 1;
    loop {
        match job.apply(backend) {
            Ok(()) => return true,
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                warn!(
                    job = job.describe(),
                    attempt,
                    error = %e,
                    "Persistence job failed, retrying"
                );
                std::thread::sleep(retry.backoff * attempt);
                attempt += 1;
            }
            Err(e) => {
                error!(
                    job = job.describe(),
                    attempt,
                    error = %e,
                    "Persistence job failed"
                );
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Records saved keys; optionally fails the first `fail_first` calls
    #[derive(Default)]
    struct RecordingBackend {
        saved: Mutex<Vec<String>>,
        calls: AtomicUsize,
        fail_first: usize,
        fatal: bool,
        gate: Mutex<()>,
    }

    impl RecordingBackend {
        fn failing(fail_first: usize) -> Self {
            Self {
                fail_first,
                ..Default::default()
            }
        }

        fn check(&self) -> Result<()> {
            let _open = self.gate.lock().unwrap();
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                if self.fatal {
                    let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
                    return Err(Error::Json(err));
                }
                return Err(Error::Storage("database is locked".to_string()));
            }
            Ok(())
        }
    }

    impl PersistenceBackend for RecordingBackend {
        fn save_artifact(&self, artifact: &CachedArtifact) -> Result<()> {
            self.check()?;
            self.saved.lock().unwrap().push(artifact.key.clone());
            Ok(())
        }

        fn save_history_entry(&self, entry: &HistoryEntry) -> Result<()> {
            self.check()?;
            self.saved.lock().unwrap().push(entry.id.clone());
            Ok(())
        }

        fn delete_history_entry(&self, id: &str) -> Result<()> {
            self.check()?;
            self.saved.lock().unwrap().retain(|saved| saved != id);
            Ok(())
        }

        fn clear_artifacts(&self) -> Result<()> {
            self.check()?;
            self.saved.lock().unwrap().clear();
            Ok(())
        }

        fn clear_history(&self) -> Result<()> {
            self.check()
        }

        fn purge_artifacts_created_before(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
            self.check()?;
            Ok(0)
        }
    }

    fn config(queue_capacity: usize) -> PersistenceConfig {
        PersistenceConfig {
            enabled: true,
            queue_capacity,
            max_attempts: 3,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn save(key: &str) -> PersistJob {
        let mut artifact = CachedArtifact::text("content");
        artifact.key = key.to_string();
        PersistJob::SaveArtifact(artifact)
    }

    #[tokio::test]
    async fn test_jobs_applied_in_order() {
        let backend = Arc::new(RecordingBackend::default());
        let worker = PersistenceWorker::spawn(backend.clone(), &config(16));
        let handle = worker.handle();

        for key in ["a", "b", "c"] {
            assert!(handle.submit(save(key)));
        }
        assert!(handle.submit(PersistJob::SaveHistoryEntry(
            HistoryEntry::user("hi").with_id("h1")
        )));

        let stats = worker.shutdown().await;
        assert_eq!(stats.submitted, 4);
        assert_eq!(stats.completed, 4);
        assert_eq!(*backend.saved.lock().unwrap(), vec!["a", "b", "c", "h1"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let backend = Arc::new(RecordingBackend::default());
        let worker = PersistenceWorker::spawn(backend.clone(), &config(2));
        let handle = worker.handle();

        // Hold the gate so the worker stalls on its first job
        let gate = backend.gate.lock().unwrap();
        let accepted: Vec<bool> = (0..6).map(|i| handle.submit(save(&i.to_string()))).collect();
        drop(gate);

        // Whatever was accepted is a prefix of the submissions
        let first_dropped = accepted.iter().position(|ok| !ok).unwrap();
        assert!(accepted[first_dropped..].iter().all(|ok| !ok));

        let stats = worker.shutdown().await;
        assert!(stats.dropped >= 3);
        assert_eq!(stats.completed + stats.dropped, 6);
        assert_eq!(stats.submitted, stats.completed);

        let saved = backend.saved.lock().unwrap();
        let expected: Vec<String> = (0..first_dropped).map(|i| i.to_string()).collect();
        assert_eq!(*saved, expected);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(RecordingBackend::failing(2));
        let worker = PersistenceWorker::spawn(backend.clone(), &config(8));

        worker.handle().submit(save("k"));
        let stats = worker.shutdown().await;

        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let backend = Arc::new(RecordingBackend::failing(10));
        let worker = PersistenceWorker::spawn(backend.clone(), &config(8));

        worker.handle().submit(save("k"));
        let stats = worker.shutdown().await;

        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_data_is_not_retried() {
        let backend = Arc::new(RecordingBackend {
            fail_first: 1,
            fatal: true,
            ..Default::default()
        });
        let worker = PersistenceWorker::spawn(backend.clone(), &config(8));

        worker.handle().submit(save("k"));
        let stats = worker.shutdown().await;

        assert_eq!(stats.failed, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_dropped() {
        let backend = Arc::new(RecordingBackend::default());
        let worker = PersistenceWorker::spawn(backend, &config(8));
        let handle = worker.handle();

        worker.shutdown().await;

        assert!(!handle.submit(save("late")));
        assert_eq!(handle.stats().dropped, 1);
    }
}
