//! TTL Cleanup Task
//!
//! Background task that periodically removes expired local cache entries.
//! Expired entries already read as absent; the sweep only frees their memory.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::LocalAsyncCache;

/// Shortest pause between sweeps; shorter intervals are raised to this.
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between cleanup runs.
///
/// # Arguments
/// * `cache` - Shared reference to the cache to sweep
/// * `interval` - Time between cleanup runs, at least [`MIN_CLEANUP_INTERVAL`]
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task<K, V>(cache: Arc<LocalAsyncCache<K, V>>, interval: Duration) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let interval = interval.max(MIN_CLEANUP_INTERVAL);
    tokio::spawn(async move {
        info!(
            cache = %cache.name(),
            interval_ms = interval.as_millis() as u64,
            "Starting TTL cleanup task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.cleanup_expired();

            if removed > 0 {
                info!(cache = %cache.name(), removed, "TTL cleanup: removed expired entries");
            } else {
                debug!(cache = %cache.name(), "TTL cleanup: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TypedCache;

    fn cache(ttl: Duration) -> Arc<LocalAsyncCache<String, String>> {
        Arc::new(LocalAsyncCache::new("sweep", 100, ttl))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = cache(Duration::from_secs(1));
        cache
            .set_async("expire_soon".to_string(), "value".to_string())
            .await
            .unwrap();

        let handle = spawn_cleanup_task(Arc::clone(&cache), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(2500)).await;

        // Removed by the sweep, not by a read.
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_preserves_valid_entries() {
        let cache = cache(Duration::from_secs(3600));
        cache
            .set_async("long_lived".to_string(), "value".to_string())
            .await
            .unwrap();

        let handle = spawn_cleanup_task(Arc::clone(&cache), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(
            cache.get_async(&"long_lived".to_string()).await,
            Ok(Some("value".to_string()))
        );

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_sleeps_between_sweeps() {
        let cache = cache(Duration::from_millis(10));
        cache.set_async("k".to_string(), "v".to_string()).await.unwrap();

        let handle = spawn_cleanup_task(Arc::clone(&cache), Duration::ZERO);

        // A spinning sweep would starve this task and the clock would never move.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let handle = spawn_cleanup_task(cache(Duration::from_secs(1)), Duration::from_secs(1));

        handle.abort();

        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled(), "Task should be cancelled after abort");
    }
}
