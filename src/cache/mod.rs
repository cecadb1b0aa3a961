//! Cache Module
//!
//! The typed cache and loader contracts, plus the in-memory implementation
//! with TTL expiration, LRU eviction and compare-and-set.

mod entry;
mod loader;
mod local;
mod lru;
mod stats;
mod store;
mod typed;


// Re-export public types
pub use entry::CacheEntry;
pub use loader::{CacheLoader, LoadFuture};
pub use local::LocalAsyncCache;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::CacheStore;
pub use typed::{EntryMapper, TypedCache};
