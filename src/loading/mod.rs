//! Loading Module
//!
//! Read-through layer that fills cache misses from a loader while keeping
//! at most one load in flight per key, optionally refreshing stale values
//! in the background.

mod delegate;
mod inflight;
mod refresh;

pub use delegate::{LoadingCacheDelegate, LoadingStats};
pub use refresh::{RefreshLoadingCacheDelegate, RefreshStats, ValueWithWriteTime};
