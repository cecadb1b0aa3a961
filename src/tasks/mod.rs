//! Background Tasks Module
//!
//! Contains background tasks that run periodically next to a cache.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired local entries at configured intervals

mod cleanup;

pub use cleanup::{spawn_cleanup_task, MIN_CLEANUP_INTERVAL};
