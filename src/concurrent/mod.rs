//! Concurrent Module
//!
//! The small async substrate the caches are built on: a write-once
//! [`Promise`], the cloneable [`CacheFuture`] it resolves, and the
//! [`all`] aggregation used by bulk operations.

mod aggregate;
mod promise;

pub use aggregate::{all, all_present};
pub use promise::{CacheFuture, Promise};
