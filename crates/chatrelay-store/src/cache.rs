//! Cache tier of the session store.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatrelay_core::ChatSession;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Default number of users whose session lists are kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Key under which a user's full session list is cached.
pub fn cache_key(user_id: &str) -> String {
    format!("session-{}", user_id)
}

/// Keyed cache of whole per-user session lists with per-entry expiry.
///
/// Writes always replace the full list.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<ChatSession>>, StoreError>;
    async fn set(
        &self,
        key: &str,
        sessions: Vec<ChatSession>,
        ttl: Duration,
    ) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;
}

struct CacheEntry {
    sessions: Vec<ChatSession>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process LRU cache; least recently used lists are evicted at capacity.
pub struct MemorySessionCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemorySessionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for MemorySessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<ChatSession>>, StoreError> {
        let mut entries = self.entries.lock().await;

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.sessions.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }

        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        sessions: Vec<ChatSession>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let entry = CacheEntry {
            sessions,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().await.pop(key).is_some())
    }
}
