//! Long-term lookup index.
//!
//! A single JSON file mapping key -> `{path, timestamp, type, keywords}`.
//! The item files stay authoritative: the index can always be rebuilt from
//! them, and a missing or unreadable index file just starts out empty.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::warn;

use crate::error::Result;
use crate::store::record::write_atomic;
use crate::types::IndexEntry;
use crate::value::{Leaf, Value};

/// Index file name inside the long-term directory
pub const INDEX_FILE: &str = ".index.json";

/// Persisted key -> location/metadata map for long-term items.
pub struct LongTermIndex {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl LongTermIndex {
    /// Load the index stored in `dir`.
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE);

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Unreadable long-term index, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Option<IndexEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Insert or replace one entry and persist.
    pub async fn upsert(&self, key: &str, entry: IndexEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        self.persist(&entries).await
    }

    /// Drop one entry and persist. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&entries).await?;
        Ok(true)
    }

    /// Replace the whole index, writing the new file before swapping it in.
    pub async fn replace_all(&self, rebuilt: BTreeMap<String, IndexEntry>) -> Result<()> {
        let mut entries = self.entries.write().await;
        self.persist(&rebuilt).await?;
        *entries = rebuilt;
        Ok(())
    }

    async fn persist(&self, entries: &BTreeMap<String, IndexEntry>) -> Result<()> {
        let bytes = serde_json::to_vec(entries)?;
        write_atomic(&self.path, &bytes).await
    }
}

/// Flat keyword set of a payload: mapping keys plus the whitespace-separated
/// tokens of every string leaf, sorted and deduplicated.
pub fn extract_keywords(payload: &Value) -> Vec<String> {
    let mut keywords = BTreeSet::new();
    let _ = payload.walk_strings(&mut |leaf| {
        match leaf {
            Leaf::Key(key) => {
                keywords.insert(key.to_string());
            }
            Leaf::Str(text) => keywords.extend(text.split_whitespace().map(str::to_string)),
        }
        ControlFlow::Continue(())
    });
    keywords.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(path: &str) -> IndexEntry {
        IndexEntry {
            path: path.into(),
            timestamp: Utc::now(),
            item_type: "mapping".into(),
            keywords: vec!["a".into()],
        }
    }

    #[test]
    fn test_extract_keywords() {
        let payload = Value::from(json!({
            "theme": "slow checkout",
            "quotes": ["too slow", {"speaker": "P3"}],
            "count": 4
        }));
        assert_eq!(
            extract_keywords(&payload),
            vec!["P3", "checkout", "count", "quotes", "slow", "speaker", "theme", "too"]
        );
        assert!(extract_keywords(&Value::Int(1)).is_empty());
    }

    #[tokio::test]
    async fn test_upsert_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let index = LongTermIndex::load(dir.path()).await.unwrap();
        assert!(index.is_empty().await);

        index.upsert("k1", entry("/tmp/k1.json")).await.unwrap();
        index.upsert("k2", entry("/tmp/k2.json")).await.unwrap();
        assert!(index.remove("k1").await.unwrap());
        assert!(!index.remove("k1").await.unwrap());

        let reloaded = LongTermIndex::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.keys().await, vec!["k2".to_string()]);
        assert_eq!(reloaded.get("k2").await.unwrap().path, "/tmp/k2.json");
    }

    #[tokio::test]
    async fn test_corrupt_index_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"{not json").unwrap();

        let index = LongTermIndex::load(dir.path()).await.unwrap();
        assert_eq!(index.len().await, 0);
    }

    #[tokio::test]
    async fn test_replace_all() {
        let dir = TempDir::new().unwrap();
        let index = LongTermIndex::load(dir.path()).await.unwrap();
        index.upsert("stale", entry("/tmp/stale.json")).await.unwrap();

        let mut rebuilt = BTreeMap::new();
        rebuilt.insert("fresh".to_string(), entry("/tmp/fresh.json"));
        index.replace_all(rebuilt).await.unwrap();

        assert!(index.get("stale").await.is_none());
        let reloaded = LongTermIndex::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.keys().await, vec!["fresh".to_string()]);
    }
}
