use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::{ChatSession, Preamble};

use crate::cache::{cache_key, SessionCache};
use crate::durable::DurableStore;
use crate::error::StoreError;
use crate::locks::{UserGuard, UserLocks};

/// Lifetime of a cached session list after each write.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Cache-first, durable-backed repository of per-user session lists.
///
/// Callers that read, modify and write back a user's list hold
/// [`SessionStore::lock_user`] for the whole cycle so concurrent transports of
/// the same user cannot overwrite each other's turns.
pub struct SessionStore {
    cache: Arc<dyn SessionCache>,
    durable: Arc<dyn DurableStore>,
    preamble: Preamble,
    cache_ttl: Duration,
    locks: UserLocks,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn SessionCache>, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            cache,
            durable,
            preamble: Preamble::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            locks: UserLocks::new(),
        }
    }

    pub fn with_preamble(mut self, preamble: Preamble) -> Self {
        self.preamble = preamble;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    pub async fn lock_user(&self, user_id: &str) -> UserGuard {
        self.locks.lock(user_id).await
    }

    /// Read-through load of a user's session list for a read-modify-write cycle.
    ///
    /// A cache miss refills the cache from the durable tier, so callers must
    /// hold [`SessionStore::lock_user`]. Read-only callers use
    /// [`SessionStore::list_sessions`].
    pub async fn get_or_create_sessions(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChatSession>, StoreError> {
        let key = cache_key(user_id);

        if let Some(sessions) = self.cache.get(&key).await? {
            if !sessions.is_empty() {
                tracing::debug!(
                    user_id = %user_id,
                    session_count = sessions.len(),
                    "SessionStore: Cache hit"
                );
                return Ok(sessions);
            }
        }

        let sessions = self.durable.list(user_id).await?;
        tracing::debug!(
            user_id = %user_id,
            session_count = sessions.len(),
            "SessionStore: Cache miss, loaded from durable store"
        );

        self.cache
            .set(&key, sessions.clone(), self.cache_ttl)
            .await?;
        Ok(sessions)
    }

    /// Find `explicit_id` in `sessions`, or append a new preamble-seeded session.
    ///
    /// An existing entry is returned as the same in-memory instance.
    pub fn get_or_create_session<'a>(
        &self,
        sessions: &'a mut Vec<ChatSession>,
        user_id: &str,
        explicit_id: Option<&str>,
    ) -> &'a mut ChatSession {
        let explicit_id = explicit_id.filter(|id| !id.is_empty());

        if let Some(index) =
            explicit_id.and_then(|id| sessions.iter().position(|session| session.id == id))
        {
            return &mut sessions[index];
        }

        let session = ChatSession::seeded(explicit_id, user_id, &self.preamble);
        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            preamble_count = self.preamble.len(),
            "SessionStore: Created session"
        );

        let index = sessions.len();
        sessions.push(session);
        &mut sessions[index]
    }

    /// Snapshot of a user's session list that never writes the cache.
    ///
    /// Safe without the user lock: a stale durable read cannot replace a list
    /// a concurrent turn has just saved.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        if let Some(sessions) = self.cache.get(&cache_key(user_id)).await? {
            if !sessions.is_empty() {
                return Ok(sessions);
            }
        }

        let sessions = self.durable.list(user_id).await?;
        tracing::debug!(
            user_id = %user_id,
            session_count = sessions.len(),
            "SessionStore: Read-only load from durable store"
        );
        Ok(sessions)
    }

    /// Look up one session of a user without creating it.
    pub async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<ChatSession>, StoreError> {
        Ok(self
            .list_sessions(user_id)
            .await?
            .into_iter()
            .find(|session| session.id == session_id))
    }

    /// Replace the cached list and upsert the mutated session durably.
    pub async fn save_turn(
        &self,
        user_id: &str,
        sessions: &[ChatSession],
        session_id: &str,
    ) -> Result<(), StoreError> {
        self.cache
            .set(&cache_key(user_id), sessions.to_vec(), self.cache_ttl)
            .await?;

        match sessions.iter().find(|session| session.id == session_id) {
            Some(session) => {
                self.durable.upsert(user_id, session).await?;
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %session_id,
                    message_count = session.messages.len(),
                    "SessionStore: Turn saved"
                );
            }
            None => {
                tracing::warn!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "SessionStore: Saved list does not contain the mutated session"
                );
            }
        }

        Ok(())
    }

    /// Remove a session from both tiers. Reports whether anything was removed.
    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool, StoreError> {
        let removed_durable = self.durable.delete(user_id, session_id).await?;

        let key = cache_key(user_id);
        let removed_cached = match self.cache.get(&key).await? {
            Some(mut sessions) => {
                let before = sessions.len();
                sessions.retain(|session| session.id != session_id);
                let removed = sessions.len() != before;
                if removed {
                    self.cache.set(&key, sessions, self.cache_ttl).await?;
                }
                removed
            }
            None => false,
        };

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            removed_durable,
            removed_cached,
            "SessionStore: Session deleted"
        );

        Ok(removed_durable || removed_cached)
    }

    /// Every session of every user, from the durable tier.
    pub async fn list_all_sessions(&self) -> Result<Vec<ChatSession>, StoreError> {
        let sessions = self.durable.list_all().await?;
        tracing::debug!(session_count = sessions.len(), "SessionStore: Listed all sessions");
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySessionCache;
    use crate::durable::MemoryDurableStore;
    use async_trait::async_trait;
    use chatrelay_core::ChatMessage;

    struct UnavailableCache;

    #[async_trait]
    impl SessionCache for UnavailableCache {
        async fn get(&self, _key: &str) -> Result<Option<Vec<ChatSession>>, StoreError> {
            Err(StoreError::CacheUnavailable("connection refused".to_string()))
        }

        async fn set(
            &self,
            _key: &str,
            _sessions: Vec<ChatSession>,
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::CacheUnavailable("connection refused".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::CacheUnavailable("connection refused".to_string()))
        }
    }

    fn store() -> (SessionStore, Arc<MemorySessionCache>, Arc<MemoryDurableStore>) {
        let cache = Arc::new(MemorySessionCache::default());
        let durable = Arc::new(MemoryDurableStore::new());
        let store = SessionStore::new(cache.clone(), durable.clone())
            .with_preamble(Preamble::new(["p1", "p2"]));
        (store, cache, durable)
    }

    #[tokio::test]
    async fn empty_tiers_yield_empty_list() {
        let (store, _, _) = store();

        assert!(store.get_or_create_sessions("u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saved_turn_is_visible_through_cache() {
        let (store, cache, _) = store();
        let mut sessions = store.get_or_create_sessions("u").await.unwrap();
        let id = store.get_or_create_session(&mut sessions, "u", None).id.clone();

        store.save_turn("u", &sessions, &id).await.unwrap();

        let cached = cache.get(&cache_key("u")).await.unwrap().unwrap();
        assert!(cached.iter().any(|s| s.id == id));
        let reloaded = store.get_or_create_sessions("u").await.unwrap();
        assert!(reloaded.iter().any(|s| s.id == id));
    }

    #[tokio::test]
    async fn cache_miss_reads_durable_and_populates_cache() {
        let (store, cache, durable) = store();
        durable
            .upsert("u", &ChatSession::new("stored", "u"))
            .await
            .unwrap();

        let sessions = store.get_or_create_sessions("u").await.unwrap();

        assert_eq!(sessions.len(), 1);
        assert!(cache.get(&cache_key("u")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn read_only_listing_leaves_cache_untouched() {
        let (store, cache, durable) = store();
        durable
            .upsert("u", &ChatSession::new("stored", "u"))
            .await
            .unwrap();

        let sessions = store.list_sessions("u").await.unwrap();

        assert_eq!(sessions.len(), 1);
        assert!(cache.get(&cache_key("u")).await.unwrap().is_none());
        assert!(store.get_session("u", "stored").await.unwrap().is_some());
        assert!(cache.get(&cache_key("u")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_only_listing_prefers_the_cached_list() {
        let (store, _, durable) = store();
        let mut sessions = Vec::new();
        store.get_or_create_session(&mut sessions, "u", Some("cached"));
        store.save_turn("u", &sessions, "cached").await.unwrap();
        durable.delete("u", "cached").await.unwrap();

        let listed = store.list_sessions("u").await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "cached");
    }

    #[tokio::test]
    async fn explicit_id_returns_same_instance_without_duplicates() {
        let (store, _, _) = store();
        let mut sessions = Vec::new();

        let first = store.get_or_create_session(&mut sessions, "u", Some("abc")) as *const ChatSession;
        let second = store.get_or_create_session(&mut sessions, "u", Some("abc")) as *const ChatSession;

        assert_eq!(first, second);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "abc");
        assert_eq!(sessions[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn missing_or_empty_id_creates_new_session() {
        let (store, _, _) = store();
        let mut sessions = Vec::new();

        store.get_or_create_session(&mut sessions, "u", None);
        store.get_or_create_session(&mut sessions, "u", Some(""));

        assert_eq!(sessions.len(), 2);
        assert_ne!(sessions[0].id, sessions[1].id);
    }

    #[tokio::test]
    async fn save_turn_upserts_only_the_mutated_session() {
        let (store, _, durable) = store();
        let mut sessions = Vec::new();
        store.get_or_create_session(&mut sessions, "u", Some("a"));
        store
            .get_or_create_session(&mut sessions, "u", Some("b"))
            .append(ChatMessage::user("hi"));

        store.save_turn("u", &sessions, "b").await.unwrap();

        let persisted = durable.list("u").await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, "b");
        assert_eq!(persisted[0].messages.len(), 3);
    }

    #[tokio::test]
    async fn delete_removes_from_both_tiers() {
        let (store, cache, durable) = store();
        let mut sessions = Vec::new();
        store.get_or_create_session(&mut sessions, "u", Some("s"));
        store.save_turn("u", &sessions, "s").await.unwrap();

        assert!(store.delete_session("u", "s").await.unwrap());

        assert!(durable.list("u").await.unwrap().is_empty());
        let cached = cache.get(&cache_key("u")).await.unwrap().unwrap();
        assert!(cached.is_empty());
        assert!(!store.delete_session("u", "s").await.unwrap());
    }

    #[tokio::test]
    async fn list_all_spans_users() {
        let (store, _, durable) = store();
        durable.upsert("a", &ChatSession::new("1", "a")).await.unwrap();
        durable.upsert("b", &ChatSession::new("2", "b")).await.unwrap();

        assert_eq!(store.list_all_sessions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cache_unavailability_is_surfaced() {
        let store = SessionStore::new(Arc::new(UnavailableCache), Arc::new(MemoryDurableStore::new()));

        let error = store.get_or_create_sessions("u").await.unwrap_err();

        assert!(matches!(error, StoreError::CacheUnavailable(_)));
    }
}
