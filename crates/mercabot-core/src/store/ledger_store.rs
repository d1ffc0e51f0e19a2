//! Append-only token/cost ledger.
//!
//! File format: JSONL in `{data_dir}/ledger.jsonl`, one [`LedgerEntry`] per
//! line. Entries are never rewritten.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::ledger::LedgerEntry;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Entries for `domain` created within `[start, end]`.
    async fn query(
        &self,
        domain: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}

// ─────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }

    async fn query(
        &self,
        domain: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .filter(|e| e.domain == domain && e.within(start, end))
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────
// JSONL file
// ─────────────────────────────────────────────

pub struct JsonlLedgerStore {
    path: PathBuf,
    /// Serializes appends within the process.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlLedgerStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(JsonlLedgerStore {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }
}

#[async_trait]
impl LedgerStore for JsonlLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(conversation = %entry.conversation_id, provider = %entry.provider, "ledger entry appended");
        Ok(())
    }

    async fn query(
        &self,
        domain: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEntry>(line) {
                Ok(entry) if entry.domain == domain && entry.within(start, end) => out.push(entry),
                Ok(_) => {}
                Err(e) => warn!(line = lineno + 1, "skipping malformed ledger line: {}", e),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TokenCost;
    use crate::types::TokenUsage;
    use chrono::Duration;

    fn entry(domain: &str, at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry::new(
            "c1",
            "u1",
            domain,
            "openai",
            "gpt-4o-mini",
            TokenUsage::new(10, 5, 15),
            TokenCost::zero("USD"),
            at,
        )
    }

    #[tokio::test]
    async fn test_memory_query_filters_domain_and_range() {
        let store = MemoryLedgerStore::new();
        let now = Utc::now();
        store.append(&entry("a", now - Duration::days(2))).await.unwrap();
        store.append(&entry("a", now)).await.unwrap();
        store.append(&entry("b", now)).await.unwrap();

        assert_eq!(store.query("a", None, None).await.unwrap().len(), 2);
        assert_eq!(
            store
                .query("a", Some(now - Duration::days(1)), None)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_jsonl_append_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlLedgerStore::open(dir.path().join("nested/ledger.jsonl")).unwrap();
        assert!(store.query("a", None, None).await.unwrap().is_empty());

        let now = Utc::now();
        store.append(&entry("a", now)).await.unwrap();
        store.append(&entry("b", now)).await.unwrap();

        let found = store.query("a", None, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tokens.total, 15);
    }

    #[tokio::test]
    async fn test_jsonl_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let good = serde_json::to_string(&entry("a", Utc::now())).unwrap();
        std::fs::write(&path, format!("garbage\n{good}\n\n")).unwrap();

        let store = JsonlLedgerStore::open(&path).unwrap();
        assert_eq!(store.query("a", None, None).await.unwrap().len(), 1);
    }
}
