//! Redis-backed record store.
//!
//! ## Key layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `broadcast:next_id` | id counter (`INCR`) |
//! | `broadcast:{id}` | `Broadcast` as JSON |

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::info;

use super::{BroadcastStore, RecordKey, StoreError};
use crate::broadcast::Broadcast;

const ID_COUNTER_KEY: &str = "broadcast:next_id";

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Record store writing JSON documents to Redis.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis, e.g. `redis://localhost:6379`.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("redis_store_connected");
        Ok(Self { conn })
    }

    fn record_key(id: u64) -> String {
        format!("broadcast:{}", id)
    }
}

#[async_trait]
impl BroadcastStore for RedisStore {
    async fn put(&self, record: &Broadcast) -> Result<RecordKey, StoreError> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();

        let id: u64 = conn.incr(ID_COUNTER_KEY, 1u64).await?;
        let _: () = conn.set(Self::record_key(id), json).await?;

        Ok(RecordKey::new(id))
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Broadcast>, StoreError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = conn.get(Self::record_key(key.id())).await?;

        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
