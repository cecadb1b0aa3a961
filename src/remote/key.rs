//! Key translation and validation for the remote store.

use crate::error::{CacheError, Result};

/// Maximum key length accepted by memcache-style stores, in bytes
pub const MAX_KEY_LENGTH: usize = 250;

// == Key Translator ==
/// Maps a typed key to the string used on the wire.
pub trait KeyTranslator<K>: Send + Sync {
    fn translate(&self, key: &K) -> String;
}

impl<K, F> KeyTranslator<K> for F
where
    F: Fn(&K) -> String + Send + Sync,
{
    fn translate(&self, key: &K) -> String {
        self(key)
    }
}

/// Uses the key's `Display` form as the wire key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayKeyTranslator;

impl<K: std::fmt::Display> KeyTranslator<K> for DisplayKeyTranslator {
    fn translate(&self, key: &K) -> String {
        key.to_string()
    }
}

// == Validate Key ==
/// Checks a wire key: non-empty, at most [`MAX_KEY_LENGTH`] bytes, no
/// whitespace or control characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }

    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key of {} bytes exceeds maximum length of {} bytes",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }

    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CacheError::InvalidKey(format!(
            "key {key:?} contains whitespace or control characters"
        )));
    }

    Ok(())
}
