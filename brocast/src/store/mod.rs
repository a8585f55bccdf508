//! Record store for broadcasts.
//!
//! The store hands out a [`RecordKey`] for every record it writes. The key's
//! string encoding is the only thing that travels through the task queue, so
//! the rest of the service treats it as opaque.
//!
//! ## Implementations
//!
//! - [`MemoryStore`]: process-local map, used in tests and local runs
//! - [`RedisStore`]: JSON values in Redis, ids from `INCR`

pub mod memory;
pub mod redis_store;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::broadcast::{Broadcast, BROADCAST_KIND};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("stored record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors raised when an encoded key cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("key is not valid hex")]
    InvalidHex,

    #[error("key is not valid utf-8")]
    InvalidUtf8,

    #[error("key has unexpected kind {0:?}")]
    WrongKind(String),

    #[error("key has malformed id {0:?}")]
    InvalidId(String),
}

/// Store-assigned identifier of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    id: u64,
}

impl RecordKey {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Encode as an opaque string safe for form parameters and URLs.
    pub fn encode(&self) -> String {
        hex::encode(format!("{}:{}", BROADCAST_KIND, self.id))
    }

    /// Decode a string produced by [`RecordKey::encode`].
    pub fn decode(encoded: &str) -> Result<Self, KeyDecodeError> {
        let bytes = hex::decode(encoded.trim()).map_err(|_| KeyDecodeError::InvalidHex)?;
        let raw = String::from_utf8(bytes).map_err(|_| KeyDecodeError::InvalidUtf8)?;

        let (kind, id) = raw
            .split_once(':')
            .ok_or_else(|| KeyDecodeError::InvalidId(raw.clone()))?;

        if kind != BROADCAST_KIND {
            return Err(KeyDecodeError::WrongKind(kind.to_string()));
        }

        let id = id
            .parse::<u64>()
            .map_err(|_| KeyDecodeError::InvalidId(id.to_string()))?;

        Ok(Self { id })
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Keyed document store for broadcast records.
#[async_trait]
pub trait BroadcastStore: Send + Sync {
    /// Persist a new record and return its freshly assigned key.
    async fn put(&self, record: &Broadcast) -> Result<RecordKey, StoreError>;

    /// Load a record. `Ok(None)` when no record exists for the key.
    async fn get(&self, key: &RecordKey) -> Result<Option<Broadcast>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_encoding_is_opaque_hex() {
        let encoded = RecordKey::new(42).encode();
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(RecordKey::decode(&encoded), Ok(RecordKey::new(42)));
    }

    #[test]
    fn test_key_decode_rejects_garbage() {
        assert_eq!(RecordKey::decode("zz"), Err(KeyDecodeError::InvalidHex));
        assert_eq!(RecordKey::decode(""), Err(KeyDecodeError::InvalidId(String::new())));
        assert_eq!(
            RecordKey::decode(&hex::encode("User:1")),
            Err(KeyDecodeError::WrongKind("User".to_string()))
        );
        assert_eq!(
            RecordKey::decode(&hex::encode("Broadcast:abc")),
            Err(KeyDecodeError::InvalidId("abc".to_string()))
        );
        assert_eq!(
            RecordKey::decode(&hex::encode([0xff, 0xfe])),
            Err(KeyDecodeError::InvalidUtf8)
        );
    }
}
