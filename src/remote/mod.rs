//! Remote Module
//!
//! Adapter from the typed cache contract to a memcache-like byte store.

mod cache;
mod key;
mod protocol;
mod transcoder;

pub use cache::{RemoteCache, MAX_VALUE_SIZE};
pub use key::{validate_key, DisplayKeyTranslator, KeyTranslator, MAX_KEY_LENGTH};
pub use protocol::{CasResponse, InMemoryProtocol, KeyValueProtocol};
pub use transcoder::{json_transcoder, CompressionTranscoder, JsonTranscoder, Transcoder};
