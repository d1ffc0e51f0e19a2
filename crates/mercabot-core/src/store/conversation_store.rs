//! Conversation persistence.
//!
//! File format: one pretty-printed JSON document per conversation in
//! `{data_dir}/conversations/{id}.json`. A save overwrites the whole
//! document, so two concurrent turns on one conversation resolve as
//! last-write-wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::conversation::{Conversation, ConversationStatus};
use crate::error::StoreError;
use crate::utils;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The active conversation for `(user_id, domain)`, if any.
    async fn find_active(&self, user_id: &str, domain: &str) -> Result<Option<Conversation>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Overwrite the stored document.
    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError>;

    /// Every conversation of the pair, newest first.
    async fn list_for_user(&self, user_id: &str, domain: &str) -> Result<Vec<Conversation>, StoreError>;

    /// Move closed conversations older than `retention` to archived.
    /// Returns how many were archived.
    async fn archive_expired(&self, now: DateTime<Utc>, retention: Duration) -> Result<usize, StoreError>;
}

fn newest_first(mut list: Vec<Conversation>) -> Vec<Conversation> {
    list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    list
}

/// Most recently updated active conversation of the pair.
fn pick_active<'a>(
    all: impl Iterator<Item = &'a Conversation>,
    user_id: &str,
    domain: &str,
) -> Option<Conversation> {
    all.filter(|c| c.user_id == user_id && c.domain == domain && c.is_active())
        .max_by_key(|c| c.updated_at)
        .cloned()
}

// ─────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryConversationStore {
    docs: RwLock<HashMap<String, Conversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Conversation>> {
        self.docs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Conversation>> {
        self.docs.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_active(&self, user_id: &str, domain: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(pick_active(self.read().values(), user_id, domain))
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.read().get(id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.write()
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str, domain: &str) -> Result<Vec<Conversation>, StoreError> {
        let list = self
            .read()
            .values()
            .filter(|c| c.user_id == user_id && c.domain == domain)
            .cloned()
            .collect();
        Ok(newest_first(list))
    }

    async fn archive_expired(&self, now: DateTime<Utc>, retention: Duration) -> Result<usize, StoreError> {
        let mut docs = self.write();
        let mut archived = 0;
        for conv in docs.values_mut() {
            if conv.retention_expired(now, retention) {
                conv.archive(now)?;
                archived += 1;
            }
        }
        Ok(archived)
    }
}

// ─────────────────────────────────────────────
// JSON directory
// ─────────────────────────────────────────────

/// Conversation documents on disk with an in-process cache.
///
/// All documents are loaded into the cache when the store opens; every save
/// writes through to disk.
pub struct JsonConversationStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Conversation>>,
}

impl JsonConversationStore {
    /// Open (creating if needed) the store under `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut docs = HashMap::new();
        for entry in std::fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match load_document(&path) {
                Ok(conv) => {
                    docs.insert(conv.id.clone(), conv);
                }
                Err(e) => warn!("Skipping unreadable conversation {}: {}", path.display(), e),
            }
        }
        info!(count = docs.len(), dir = %dir.display(), "conversation store opened");

        Ok(JsonConversationStore {
            dir,
            cache: RwLock::new(docs),
        })
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", utils::safe_filename(id)))
    }

    async fn write_document(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let path = self.document_path(&conversation.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(conversation)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(id = %conversation.id, path = %path.display(), "conversation saved");
        Ok(())
    }

    fn snapshot(&self) -> Vec<Conversation> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

fn load_document(path: &Path) -> Result<Conversation, StoreError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl ConversationStore for JsonConversationStore {
    async fn find_active(&self, user_id: &str, domain: &str) -> Result<Option<Conversation>, StoreError> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        Ok(pick_active(cache.values(), user_id, domain))
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        Ok(cache.get(id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.write_document(conversation).await?;
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str, domain: &str) -> Result<Vec<Conversation>, StoreError> {
        let list = self
            .snapshot()
            .into_iter()
            .filter(|c| c.user_id == user_id && c.domain == domain)
            .collect();
        Ok(newest_first(list))
    }

    async fn archive_expired(&self, now: DateTime<Utc>, retention: Duration) -> Result<usize, StoreError> {
        let expired: Vec<Conversation> = self
            .snapshot()
            .into_iter()
            .filter(|c| c.retention_expired(now, retention))
            .collect();

        let mut archived = 0;
        for mut conv in expired {
            conv.archive(now)?;
            self.save(&conv).await?;
            archived += 1;
        }
        if archived > 0 {
            info!(archived, "archived closed conversations past retention");
        }
        Ok(archived)
    }
}

/// Status counts across the store, for the CLI.
pub async fn status_counts(store: &dyn ConversationStore, user_id: &str, domain: &str) -> Result<HashMap<ConversationStatus, usize>, StoreError> {
    let mut counts = HashMap::new();
    for conv in store.list_for_user(user_id, domain).await? {
        *counts.entry(conv.status).or_insert(0) += 1;
    }
    Ok(counts)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConversationMessage, Role};

    fn conversation(user: &str, domain: &str) -> Conversation {
        let mut conv = Conversation::new(user, domain);
        conv.push_turn(
            ConversationMessage::new(Role::User, "hola"),
            ConversationMessage::new(Role::Assistant, "¡hola!"),
        );
        conv
    }

    #[tokio::test]
    async fn test_memory_find_active_ignores_closed() {
        let store = MemoryConversationStore::new();
        let mut closed = conversation("u1", "d");
        closed.close(Utc::now()).unwrap();
        store.save(&closed).await.unwrap();
        assert!(store.find_active("u1", "d").await.unwrap().is_none());

        let active = conversation("u1", "d");
        store.save(&active).await.unwrap();
        let found = store.find_active("u1", "d").await.unwrap().unwrap();
        assert_eq!(found.id, active.id);
        assert!(store.find_active("u1", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_archive_expired() {
        let store = MemoryConversationStore::new();
        let now = Utc::now();
        let mut old = conversation("u1", "d");
        old.close(now - Duration::days(91)).unwrap();
        let mut recent = conversation("u1", "d");
        recent.close(now - Duration::days(10)).unwrap();
        let active = conversation("u2", "d");
        for c in [&old, &recent, &active] {
            store.save(c).await.unwrap();
        }

        let n = store.archive_expired(now, Duration::days(90)).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            store.get(&old.id).await.unwrap().unwrap().status,
            ConversationStatus::Archived
        );
        assert_eq!(
            store.get(&recent.id).await.unwrap().unwrap().status,
            ConversationStatus::Closed
        );
        assert!(store.get(&active.id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_json_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let conv = conversation("u1", "shop.example");
        {
            let store = JsonConversationStore::open(dir.path()).unwrap();
            store.save(&conv).await.unwrap();
        }

        let reopened = JsonConversationStore::open(dir.path()).unwrap();
        let loaded = reopened.get(&conv.id).await.unwrap().unwrap();
        assert_eq!(loaded, conv);
        assert!(reopened
            .find_active("u1", "shop.example")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_json_store_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConversationStore::open(dir.path()).unwrap();
        let mut a = conversation("u1", "d");
        let mut b = a.clone();

        a.messages.push(ConversationMessage::new(Role::User, "from a"));
        b.messages.push(ConversationMessage::new(Role::User, "from b"));
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        let stored = store.get(&a.id).await.unwrap().unwrap();
        assert_eq!(stored.messages.last().unwrap().content, "from b");
    }

    #[tokio::test]
    async fn test_json_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        let store = JsonConversationStore::open(dir.path()).unwrap();
        assert!(store.list_for_user("u", "d").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_counts() {
        let store = MemoryConversationStore::new();
        let mut closed = conversation("u1", "d");
        closed.close(Utc::now()).unwrap();
        store.save(&closed).await.unwrap();
        store.save(&conversation("u1", "d")).await.unwrap();

        let counts = status_counts(&store, "u1", "d").await.unwrap();
        assert_eq!(counts[&ConversationStatus::Active], 1);
        assert_eq!(counts[&ConversationStatus::Closed], 1);
    }
}
