// Cache backends and the tax rate cache built on them

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod rate;

pub use rate::RateCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            Instant::now() >= expires_at
        } else {
            false
        }
    }
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Process-local cache. Readers and writers never block each other across
/// shards; concurrent writes to the same key resolve to the last writer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        self.store.retain(|_, entry| !entry.is_expired());
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.store.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // Expired: remove unless a writer replaced it in the meantime
        self.store.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.store
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .store
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.store.clear();
        Ok(())
    }
}
