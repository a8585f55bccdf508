//! In-process record store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BroadcastStore, RecordKey, StoreError};
use crate::broadcast::Broadcast;

/// Record store backed by a `HashMap`. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    records: RwLock<HashMap<u64, Broadcast>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All stored records ordered by key.
    pub async fn records(&self) -> Vec<(RecordKey, Broadcast)> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records
            .iter()
            .map(|(id, record)| (RecordKey::new(*id), record.clone()))
            .collect();
        all.sort_by_key(|(key, _)| key.id());
        all
    }
}

#[async_trait]
impl BroadcastStore for MemoryStore {
    async fn put(&self, record: &Broadcast) -> Result<RecordKey, StoreError> {
        // Ids start at 1
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.records.write().await.insert(id, record.clone());
        Ok(RecordKey::new(id))
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Broadcast>, StoreError> {
        Ok(self.records.read().await.get(&key.id()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastRequest;
    use chrono::Utc;

    fn record(body: &str) -> Broadcast {
        let request = BroadcastRequest {
            body: body.to_string(),
            ..Default::default()
        };
        Broadcast::from_request(request, "a@x.com", Utc::now())
    }

    #[tokio::test]
    async fn test_put_assigns_unique_keys() {
        let store = MemoryStore::new();

        let first = store.put(&record("one")).await.unwrap();
        let second = store.put(&record("one")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_get_round_trips_through_encoded_key() {
        let store = MemoryStore::new();
        let key = store.put(&record("hello")).await.unwrap();

        let decoded = RecordKey::decode(&key.encode()).unwrap();
        let loaded = store.get(&decoded).await.unwrap().unwrap();

        assert_eq!(loaded.body, "hello");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.get(&RecordKey::new(99)).await.unwrap().is_none());
    }
}
