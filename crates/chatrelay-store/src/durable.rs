//! Durable tier of the session store, partitioned by user id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chatrelay_core::ChatSession;
use tokio::fs;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Keyed document store: partition = user id, item = session id.
///
/// A missing partition or item is never an error.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn list(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError>;
    async fn upsert(&self, user_id: &str, session: &ChatSession) -> Result<(), StoreError>;
    async fn delete(&self, user_id: &str, session_id: &str) -> Result<bool, StoreError>;
    async fn list_all(&self) -> Result<Vec<ChatSession>, StoreError>;
}

#[derive(Default)]
pub struct MemoryDurableStore {
    partitions: RwLock<HashMap<String, Vec<ChatSession>>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn list(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        Ok(self
            .partitions
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert(&self, user_id: &str, session: &ChatSession) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(user_id.to_string()).or_default();

        match partition.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => partition.push(session.clone()),
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, session_id: &str) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().await;
        let Some(partition) = partitions.get_mut(user_id) else {
            return Ok(false);
        };

        let before = partition.len();
        partition.retain(|s| s.id != session_id);
        Ok(partition.len() != before)
    }

    async fn list_all(&self) -> Result<Vec<ChatSession>, StoreError> {
        Ok(self
            .partitions
            .read()
            .await
            .values()
            .flat_map(|partition| partition.iter().cloned())
            .collect())
    }
}

/// One JSON document per session under `<base>/sessions/<user>/<session>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileDurableStore {
    base_path: PathBuf,
}

impl JsonFileDurableStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().join("sessions"),
        }
    }

    pub async fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    fn partition_path(&self, user_id: &str) -> PathBuf {
        self.base_path.join(encode_component(user_id))
    }

    fn session_path(&self, user_id: &str, session_id: &str) -> PathBuf {
        self.partition_path(user_id)
            .join(format!("{}.json", encode_component(session_id)))
    }

    async fn read_partition(&self, dir: &Path) -> Result<Vec<ChatSession>, StoreError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<ChatSession>(&content) {
                Ok(session) => sessions.push(session),
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %error,
                        "DurableStore: Skipping unreadable session document"
                    );
                }
            }
        }

        sessions.sort_by_key(|session| session.last_activity);
        Ok(sessions)
    }
}

/// Make an identifier safe to use as a single path component.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => encoded.push(byte as char),
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    if encoded.is_empty() {
        encoded.push('%');
    }
    encoded
}

#[async_trait]
impl DurableStore for JsonFileDurableStore {
    async fn list(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        self.read_partition(&self.partition_path(user_id)).await
    }

    async fn upsert(&self, user_id: &str, session: &ChatSession) -> Result<(), StoreError> {
        fs::create_dir_all(self.partition_path(user_id)).await?;
        let json = serde_json::to_string_pretty(session)?;
        fs::write(self.session_path(user_id, &session.id), json).await?;
        Ok(())
    }

    async fn delete(&self, user_id: &str, session_id: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.session_path(user_id, session_id)).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<ChatSession>, StoreError> {
        let mut partitions = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = partitions.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                sessions.extend(self.read_partition(&entry.path()).await?);
            }
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::{ChatMessage, Preamble};
    use tempfile::TempDir;

    fn session(id: &str, user: &str) -> ChatSession {
        ChatSession::seeded(Some(id), user, &Preamble::default())
    }

    #[tokio::test]
    async fn memory_upsert_replaces_by_id() {
        let store = MemoryDurableStore::new();
        let mut s = session("s1", "u");

        store.upsert("u", &s).await.unwrap();
        s.append(ChatMessage::user("hi"));
        store.upsert("u", &s).await.unwrap();

        let listed = store.list("u").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].messages.len(), s.messages.len());
    }

    #[tokio::test]
    async fn memory_missing_partition_is_empty() {
        let store = MemoryDurableStore::new();

        assert!(store.list("nobody").await.unwrap().is_empty());
        assert!(!store.delete("nobody", "s").await.unwrap());
    }

    #[tokio::test]
    async fn json_store_round_trips_sessions_per_user() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileDurableStore::new(dir.path());
        store.init().await.unwrap();

        store.upsert("alice", &session("a1", "alice")).await.unwrap();
        store.upsert("bob", &session("b1", "bob")).await.unwrap();

        let alice = store.list("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, "a1");
        assert_eq!(alice[0].owner_user_id, "alice");

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn json_store_delete_reports_presence() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileDurableStore::new(dir.path());

        store.upsert("u", &session("s1", "u")).await.unwrap();

        assert!(store.delete("u", "s1").await.unwrap());
        assert!(!store.delete("u", "s1").await.unwrap());
        assert!(store.list("u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_store_without_directory_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileDurableStore::new(dir.path().join("missing"));

        assert!(store.list("u").await.unwrap().is_empty());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_store_skips_corrupt_documents() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileDurableStore::new(dir.path());

        store.upsert("u", &session("good", "u")).await.unwrap();
        fs::write(store.partition_path("u").join("bad.json"), "{not json")
            .await
            .unwrap();

        let listed = store.list("u").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
    }

    #[test]
    fn path_components_are_encoded() {
        assert_eq!(encode_component("user-1_a"), "user-1_a");
        assert_eq!(encode_component("../etc"), "%2E%2E%2Fetc");
        assert_eq!(encode_component(""), "%");
    }
}
