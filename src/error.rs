//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror. Errors are `Clone` so a
//! single load outcome can be handed to every caller waiting on it.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for every cache operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The loader failed, either through its returned future or while producing it
    #[error("Loader error: {0}")]
    Loader(String),

    /// The loader broke its contract (its future panicked or was abandoned)
    #[error("Loader contract violation: {0}")]
    ContractViolation(String),

    /// The backing store failed (transport error, unavailable server, ...)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Every member of a batch failed, or any member with `fail_on_error`
    #[error("{} of the batch operations failed: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<CacheError>),

    /// Key cannot be used on the wire
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Encoded value exceeds the store's item size limit
    #[error("Value of {size} bytes exceeds maximum size of {limit} bytes")]
    ValueTooLarge { size: usize, limit: usize },

    /// Payload could not be compressed or decompressed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Value could not be encoded or decoded
    #[error("Transcode error: {0}")]
    Transcode(String),

    /// Configuration value could not be understood
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// Returns the individual errors of an aggregate, or the error itself.
    pub fn causes(&self) -> Vec<&CacheError> {
        match self {
            CacheError::Aggregate(errors) => errors.iter().flat_map(|e| e.causes()).collect(),
            other => vec![other],
        }
    }
}

fn join_messages(errors: &[CacheError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Transcode(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
