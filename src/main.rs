//! Typed Cache demo
//!
//! Runs overlapping reads through a loading cache backed by a slow loader and
//! reports how many loads actually reached it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::{join_all, FutureExt};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use typed_cache::cache::LoadFuture;
use typed_cache::remote::{DisplayKeyTranslator, InMemoryProtocol};
use typed_cache::{
    spawn_cleanup_task, CacheConfig, CacheLoader, LoadingCacheDelegate, RemoteCache, TypedCache,
};

const KEYS: u32 = 10;
const READERS: u32 = 50;

/// Loader standing in for a slow database.
#[derive(Default)]
struct SlowDatabase {
    loads: AtomicUsize,
}

impl CacheLoader<u32, String> for SlowDatabase {
    fn load(&self, cache_name: &str, key: &u32) -> LoadFuture<Option<String>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let value = format!("{cache_name}-row-{key}");
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some(value))
        }
        .boxed()
    }

    fn load_bulk(&self, cache_name: &str, keys: &[u32]) -> LoadFuture<HashMap<u32, String>> {
        self.loads.fetch_add(keys.len(), Ordering::SeqCst);
        let rows = keys
            .iter()
            .map(|key| (*key, format!("{cache_name}-row-{key}")))
            .collect();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(rows)
        }
        .boxed()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "typed_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        cache = %config.cache_name,
        max_entries = config.max_entries,
        ttl_ms = config.ttl.as_millis() as u64,
        compression = ?config.compression,
        "Configuration loaded"
    );

    // Local cache behind a loading delegate
    let database = Arc::new(SlowDatabase::default());
    let cache = Arc::new(config.build_loading_cache::<u32, String>(database.clone()));
    let cleanup_handle = spawn_cleanup_task(Arc::clone(cache.inner()), config.cleanup_interval);

    let readers = (0..READERS).map(|i| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_async(&(i % KEYS)).await })
    });
    let all_keys: Vec<u32> = (0..KEYS).collect();
    let (results, bulk) = futures::join!(join_all(readers), cache.get_bulk_async(&all_keys));

    let mut found = 0;
    for result in results {
        if result.context("reader task failed")??.is_some() {
            found += 1;
        }
    }
    let bulk = bulk.context("bulk read failed")?;

    info!(
        reads = READERS,
        found,
        bulk_found = bulk.len(),
        loader_calls = database.loads.load(Ordering::SeqCst),
        "Overlapping reads finished"
    );
    let local_stats = serde_json::to_string(&cache.inner().stats())?;
    let loading_stats = serde_json::to_string(&cache.stats())?;
    info!(local = %local_stats, loading = %loading_stats, "Cache statistics");

    // Same loader in front of a (simulated) remote store
    let protocol = Arc::new(InMemoryProtocol::new());
    let remote = Arc::new(RemoteCache::<u32, String, _, _>::from_config(
        Arc::clone(&protocol),
        DisplayKeyTranslator,
        &config,
    ));
    let remote_loading: LoadingCacheDelegate<u32, String, _> =
        LoadingCacheDelegate::new(remote, database.clone(), config.cache_name.clone());

    let first = remote_loading.get_async(&7).await?;
    let second = remote_loading.get_async(&7).await?;
    let stored_bytes = protocol.raw("7").await.map(|raw| raw.len());
    info!(
        value = ?first,
        repeated = first == second,
        stored_bytes = ?stored_bytes,
        "Remote round trip finished"
    );

    cleanup_handle.abort();
    info!("Demo complete");
    Ok(())
}
