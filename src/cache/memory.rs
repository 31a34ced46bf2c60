use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::cache::{CacheError, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process store. Only suitable when the API and worker share a process,
/// or as a test double.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    store: Arc<DashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries; expired ones are dropped as a side effect.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.store.retain(|_, entry| entry.expires_at > now);
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = Instant::now();
        let expired = match self.store.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.store.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.store.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .store
            .remove(key)
            .is_some_and(|(_, entry)| entry.expires_at > now))
    }

    async fn delete_if(&self, key: &str, expected: &Value) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .store
            .remove_if(key, |_, entry| entry.expires_at > now && entry.value == *expected)
            .is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
