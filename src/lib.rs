//! Typed Cache - asynchronous typed key/value caching
//!
//! Provides a bounded local cache with TTL expiration, LRU eviction and
//! compare-and-set, an adapter to memcache-like remote stores with pluggable
//! compression, and a loading layer that coalesces concurrent misses into a
//! single upstream fetch per key.

pub mod cache;
pub mod compression;
pub mod concurrent;
pub mod config;
pub mod error;
pub mod loading;
pub mod remote;
pub mod tasks;

pub use cache::{CacheLoader, LocalAsyncCache, TypedCache};
pub use compression::CompressionAlgorithm;
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use loading::{LoadingCacheDelegate, RefreshLoadingCacheDelegate, ValueWithWriteTime};
pub use remote::RemoteCache;
pub use tasks::spawn_cleanup_task;
