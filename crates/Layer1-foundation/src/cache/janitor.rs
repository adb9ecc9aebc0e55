//! Periodic sweep of expired cache entries

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::response::ResponseCache;

/// Background task that calls [`ResponseCache::cleanup_expired`] on an interval
///
/// Cancellation is observed at every sleep, so shutdown does not wait for the
/// next tick. Dropping the janitor cancels it as well.
pub struct Janitor {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl Janitor {
    /// Start sweeping. Must be called from within a tokio runtime.
    pub fn spawn(cache: Arc<ResponseCache>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            debug!(interval_secs = interval.as_secs(), "Janitor started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = cache.cleanup_expired();
                        debug!(removed, "Janitor sweep finished");
                    }
                }
            }
            debug!("Janitor stopped");
        });

        Self {
            cancel,
            join: Some(join),
        }
    }

    /// Token that stops the janitor when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Cancel and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "Janitor task panicked");
            }
        }
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedArtifact;
    use crate::config::ResponseCacheConfig;
    use chrono::Utc;

    fn cache() -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new(ResponseCacheConfig {
            ttl_secs: 60,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_sweeps_expired_entries() {
        let cache = cache();
        let past = Utc::now() - chrono::Duration::minutes(10);
        cache.put("old", CachedArtifact::text("x").with_created_at(past)).unwrap();
        cache.put("new", CachedArtifact::text("y")).unwrap();

        let janitor = Janitor::spawn(cache.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!cache.contains("old"));
        assert!(cache.contains("new"));
        assert_eq!(cache.stats().expirations, 1);

        janitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_sleep() {
        let janitor = Janitor::spawn(cache(), Duration::from_secs(3600));
        assert!(janitor.is_running());

        tokio::time::timeout(Duration::from_secs(1), janitor.shutdown())
            .await
            .expect("janitor should stop promptly");
    }

    #[tokio::test]
    async fn test_drop_releases_cache() {
        let cache = cache();
        let weak = Arc::downgrade(&cache);
        let janitor = Janitor::spawn(cache, Duration::from_secs(3600));

        drop(janitor);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_external_token_cancels() {
        let janitor = Janitor::spawn(cache(), Duration::from_secs(3600));
        janitor.cancellation_token().cancel();

        tokio::time::timeout(Duration::from_secs(1), async {
            while janitor.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("janitor should observe the token");
    }
}
