//! File-backed storage for one retention tier.
//!
//! Each item lives in `<dir>/<key>.json`. A store instance owns its
//! directory: writes are serialized through one write scope per store and
//! land via temp file + rename, so readers never see a partial file. Reads
//! go through a read-through cache.

pub(crate) mod record;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::index::{LongTermIndex, extract_keywords};
use crate::types::{IndexEntry, LongTermMetadata, MemoryItem, MemoryTier, StoreOptions, TierMetadata};
use crate::validation::{validate_key, validate_session_id};
use crate::value::Value;

pub use record::{DEFAULT_SESSION, ITEM_EXTENSION};
use record::{decode_item, encode_item, key_for_file, write_atomic};

/// Storage for a single memory tier.
pub struct TierStore {
    tier: MemoryTier,
    dir: PathBuf,
    schema_version: String,
    write_scope: Mutex<()>,
    cache: RwLock<HashMap<String, MemoryItem>>,
    index: Option<LongTermIndex>,
}

impl TierStore {
    /// Open (creating if needed) the store for `tier` rooted at `dir`.
    ///
    /// `schema_version` stamps long-term items written without an explicit
    /// version and fills in records missing their metadata.
    pub async fn open(tier: MemoryTier, dir: impl Into<PathBuf>, schema_version: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let index = match tier {
            MemoryTier::LongTerm => Some(LongTermIndex::load(&dir).await?),
            _ => None,
        };

        debug!(tier = %tier, dir = %dir.display(), "Opened tier store");

        Ok(Self {
            tier,
            dir,
            schema_version: schema_version.into(),
            write_scope: Mutex::new(()),
            cache: RwLock::new(HashMap::new()),
            index,
        })
    }

    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// The long-term index, present only for the long-term tier.
    pub fn index(&self) -> Option<&LongTermIndex> {
        self.index.as_ref()
    }

    /// Canonical file path for a key.
    pub fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ITEM_EXTENSION))
    }

    /// Store a payload under `key`, stamped with the current time.
    ///
    /// Last write wins for the same key.
    pub async fn store(&self, key: &str, payload: Value, options: &StoreOptions) -> Result<MemoryItem> {
        validate_key(key)?;
        if !payload.is_text_representable() {
            return Err(Error::validation(format!(
                "payload for {} contains bytes or non-finite floats; store it compressed",
                key
            )));
        }

        let metadata = match self.tier {
            MemoryTier::ShortTerm => TierMetadata::ShortTerm,
            MemoryTier::Working => {
                let session_id = options
                    .session_id
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| Error::validation("working memory requires a session id"))?;
                validate_session_id(&session_id)?;
                TierMetadata::Working {
                    session_id,
                    merged_from: None,
                }
            }
            MemoryTier::LongTerm => TierMetadata::LongTerm(LongTermMetadata {
                item_type: options
                    .item_type
                    .clone()
                    .unwrap_or_else(|| payload.kind_name().to_string()),
                version: self.schema_version.clone(),
            }),
        };

        // Stamp inside the write scope so the surviving write is the newest.
        let _scope = self.write_scope.lock().await;
        let item = MemoryItem {
            key: key.to_string(),
            payload,
            timestamp: Utc::now(),
            metadata,
        };
        self.persist(&item).await?;
        debug!(tier = %self.tier, key = %key, "Stored item");
        Ok(item)
    }

    /// Write an item as-is, keeping its timestamp and metadata.
    pub async fn rewrite(&self, item: MemoryItem) -> Result<()> {
        self.check_rewrite(&item)?;
        let _scope = self.write_scope.lock().await;
        self.persist(&item).await?;
        debug!(tier = %self.tier, key = %item.key, "Rewrote item");
        Ok(())
    }

    /// Write an item as-is if `predicate` accepts whatever is currently on
    /// disk under its key (`None` when nothing is). Returns whether it was
    /// written.
    ///
    /// The check and the write happen under the write scope.
    pub async fn rewrite_if<F>(&self, item: MemoryItem, predicate: F) -> Result<bool>
    where
        F: FnOnce(Option<&MemoryItem>) -> bool,
    {
        self.check_rewrite(&item)?;
        let _scope = self.write_scope.lock().await;
        let current = self.read_file(&self.item_path(&item.key), &item.key).await?;
        if !predicate(current.as_ref()) {
            return Ok(false);
        }
        self.persist(&item).await?;
        debug!(tier = %self.tier, key = %item.key, "Rewrote item");
        Ok(true)
    }

    fn check_rewrite(&self, item: &MemoryItem) -> Result<()> {
        validate_key(&item.key)?;
        if item.tier() != self.tier {
            return Err(Error::validation(format!(
                "cannot write a {} item into the {} tier",
                item.tier(),
                self.tier
            )));
        }
        Ok(())
    }

    /// Payload stored under `key`, if any.
    pub async fn retrieve(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.retrieve_item(key).await?.map(|item| item.payload))
    }

    /// Full item stored under `key`, if any.
    pub async fn retrieve_item(&self, key: &str) -> Result<Option<MemoryItem>> {
        validate_key(key)?;

        if let Some(item) = self.cache.read().await.get(key) {
            return Ok(Some(item.clone()));
        }

        let Some(item) = self.load_from_disk(key).await? else {
            debug!(tier = %self.tier, key = %key, "Item not found");
            return Ok(None);
        };

        self.cache.write().await.insert(key.to_string(), item.clone());
        debug!(tier = %self.tier, key = %key, "Loaded item from disk");
        Ok(Some(item))
    }

    /// Delete the item under `key`. Returns whether anything was removed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        self.remove_if(key, |_| true).await
    }

    /// Delete the item under `key` if `predicate` holds for its current
    /// on-disk state.
    ///
    /// The check and the delete happen under the write scope, so an item
    /// rewritten since the caller looked at it is judged by its new contents.
    pub async fn remove_if<F>(&self, key: &str, predicate: F) -> Result<bool>
    where
        F: FnOnce(&MemoryItem) -> bool,
    {
        validate_key(key)?;
        let _scope = self.write_scope.lock().await;

        let path = self.item_path(key);
        let Some(current) = self.read_file(&path, key).await? else {
            self.cache.write().await.remove(key);
            if let Some(index) = &self.index {
                index.remove(key).await?;
            }
            return Ok(false);
        };
        if !predicate(&current) {
            return Ok(false);
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.cache.write().await.remove(key);
        if let Some(index) = &self.index {
            index.remove(key).await?;
        }

        debug!(tier = %self.tier, key = %key, "Removed item");
        Ok(true)
    }

    /// Every item currently on disk, in key order.
    ///
    /// Files that cannot be read or parsed are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<MemoryItem>> {
        let mut items = Vec::new();
        for (key, path) in self.list_files().await? {
            match self.read_file(&path, &key).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(e) => warn!(tier = %self.tier, key = %key, error = %e, "Skipping unreadable item"),
            }
        }
        Ok(items)
    }

    /// Blocking counterpart of [`load_all`](Self::load_all), for use on
    /// blocking worker threads.
    pub fn scan_blocking(&self) -> Result<Vec<MemoryItem>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some(key) = key_for_file(&path) {
                files.push((key, path));
            }
        }
        files.sort();

        let mut items = Vec::with_capacity(files.len());
        for (key, path) in files {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(tier = %self.tier, key = %key, error = %e, "Skipping unreadable item");
                    continue;
                }
            };
            match decode_item(&bytes, self.tier, &key, &self.schema_version) {
                Ok(item) => items.push(item),
                Err(e) => warn!(tier = %self.tier, key = %key, error = %e, "Skipping malformed item"),
            }
        }
        Ok(items)
    }

    /// Keys of every item file on disk, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.list_files().await?.into_iter().map(|(key, _)| key).collect())
    }

    /// Number of item files on disk.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.list_files().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drop every cached item; the next read goes to disk.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Rebuild the long-term index from the item files.
    ///
    /// Returns the number of indexed items; other tiers have no index and
    /// return 0.
    pub async fn reindex(&self) -> Result<usize> {
        let Some(index) = &self.index else {
            return Ok(0);
        };

        let _scope = self.write_scope.lock().await;
        let mut rebuilt = BTreeMap::new();
        for item in self.load_all().await? {
            rebuilt.insert(item.key.clone(), self.index_entry(&item));
        }
        let count = rebuilt.len();
        index.replace_all(rebuilt).await?;

        info!(tier = %self.tier, items = count, "Rebuilt long-term index");
        Ok(count)
    }

    /// Write an item file, then refresh the index and cache.
    ///
    /// Callers hold the write scope.
    async fn persist(&self, item: &MemoryItem) -> Result<()> {
        let bytes = encode_item(item)?;
        let path = self.item_path(&item.key);
        write_atomic(&path, &bytes).await?;

        if let Some(index) = &self.index {
            index.upsert(&item.key, self.index_entry(item)).await?;
        }
        self.cache.write().await.insert(item.key.clone(), item.clone());
        Ok(())
    }

    fn index_entry(&self, item: &MemoryItem) -> IndexEntry {
        let item_type = match &item.metadata {
            TierMetadata::LongTerm(metadata) => metadata.item_type.clone(),
            _ => item.payload.kind_name().to_string(),
        };
        IndexEntry {
            path: self.item_path(&item.key).to_string_lossy().into_owned(),
            timestamp: item.timestamp,
            item_type,
            keywords: extract_keywords(&item.payload),
        }
    }

    async fn load_from_disk(&self, key: &str) -> Result<Option<MemoryItem>> {
        if let Some(index) = &self.index {
            if let Some(entry) = index.get(key).await {
                let indexed = PathBuf::from(&entry.path);
                if indexed.starts_with(&self.dir) {
                    if let Some(item) = self.read_file(&indexed, key).await? {
                        return Ok(Some(item));
                    }
                }
            }
        }
        self.read_file(&self.item_path(key), key).await
    }

    async fn read_file(&self, path: &Path, key: &str) -> Result<Option<MemoryItem>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(decode_item(&bytes, self.tier, key, &self.schema_version)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(key) = key_for_file(&path) {
                files.push((key, path));
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open(tier: MemoryTier, dir: &TempDir) -> TierStore {
        TierStore::open(tier, dir.path().join(tier.as_str()), "1.0").await.unwrap()
    }

    #[tokio::test]
    async fn test_store_then_retrieve() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::ShortTerm, &dir).await;

        let payload = Value::from(json!({"topic": "pricing", "mentions": [1, 2]}));
        store.store("notes", payload.clone(), &StoreOptions::default()).await.unwrap();

        assert_eq!(store.retrieve("notes").await.unwrap(), Some(payload.clone()));
        assert!(store.item_path("notes").exists());

        // Survives a cold cache
        store.clear_cache().await;
        assert_eq!(store.retrieve("notes").await.unwrap(), Some(payload));
        assert_eq!(store.retrieve("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::ShortTerm, &dir).await;

        store.store("k", Value::from("first"), &StoreOptions::default()).await.unwrap();
        store.store("k", Value::from("second"), &StoreOptions::default()).await.unwrap();
        store.clear_cache().await;

        assert_eq!(store.retrieve("k").await.unwrap(), Some(Value::from("second")));
        assert_eq!(store.keys().await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_stores_to_different_keys() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open(MemoryTier::ShortTerm, &dir).await);

        let mut handles = Vec::new();
        for i in 0..16i64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .store(&format!("item-{}", i), Value::from(json!({"n": i})), &StoreOptions::default())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        store.clear_cache().await;
        let items = store.load_all().await.unwrap();
        assert_eq!(items.len(), 16);
        for item in items {
            let n = item.key.trim_start_matches("item-").parse::<i64>().unwrap();
            assert_eq!(item.payload, Value::from(json!({"n": n})));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_survivor_is_newest_write() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open(MemoryTier::ShortTerm, &dir).await);

        let mut handles = Vec::new();
        for i in 0..24i64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.store("hot", Value::Int(i), &StoreOptions::default()).await.unwrap()
            }));
        }
        let mut written = Vec::new();
        for handle in handles {
            written.push(handle.await.unwrap());
        }

        let newest = written.iter().max_by_key(|item| item.timestamp).unwrap();
        store.clear_cache().await;
        let survivor = store.retrieve_item("hot").await.unwrap().unwrap();
        assert_eq!(survivor.timestamp, newest.timestamp);
        assert_eq!(survivor.payload, newest.payload);
    }

    #[tokio::test]
    async fn test_working_tier_requires_session() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::Working, &dir).await;

        let err = store.store("k", Value::Int(1), &StoreOptions::default()).await.unwrap_err();
        assert!(err.is_validation());

        let item = store.store("k", Value::Int(1), &StoreOptions::session("s-1")).await.unwrap();
        assert_eq!(item.metadata.session_id(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_working_tier_rejects_unusable_session_ids() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::Working, &dir).await;

        let too_long = "s".repeat(200);
        for session in ["team/alpha", "line\nbreak", too_long.as_str()] {
            let err = store
                .store("k", Value::Int(1), &StoreOptions::session(session))
                .await
                .unwrap_err();
            assert!(err.is_validation(), "accepted session {:?}", session);
        }
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_rewrite_if_checks_current_item() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::Working, &dir).await;
        store
            .store("shared", Value::from("theirs"), &StoreOptions::session("other"))
            .await
            .unwrap();

        let ours = |key: &str| MemoryItem {
            key: key.into(),
            payload: Value::from("ours"),
            timestamp: Utc::now(),
            metadata: TierMetadata::Working {
                session_id: "mine".into(),
                merged_from: None,
            },
        };
        let same_session =
            |current: Option<&MemoryItem>| current.is_none_or(|c| c.metadata.session_id() == Some("mine"));

        assert!(!store.rewrite_if(ours("shared"), same_session).await.unwrap());
        assert_eq!(store.retrieve("shared").await.unwrap(), Some(Value::from("theirs")));

        assert!(store.rewrite_if(ours("fresh"), same_session).await.unwrap());
        assert_eq!(store.retrieve("fresh").await.unwrap(), Some(Value::from("ours")));
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::ShortTerm, &dir).await;

        let opts = StoreOptions::default();
        assert!(store.store("../x", Value::Null, &opts).await.unwrap_err().is_validation());
        assert!(store.store(".index", Value::Null, &opts).await.unwrap_err().is_validation());
        assert!(
            store
                .store("blob", Value::Bytes(vec![0, 1]), &opts)
                .await
                .unwrap_err()
                .is_validation()
        );
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_long_term_metadata_and_index() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::LongTerm, &dir).await;

        let item = store
            .store(
                "persona",
                Value::from(json!({"name": "Researcher", "goals": ["fast answers"]})),
                &StoreOptions::default().item_type("persona"),
            )
            .await
            .unwrap();
        assert_eq!(
            item.metadata,
            TierMetadata::LongTerm(LongTermMetadata {
                item_type: "persona".into(),
                version: "1.0".into(),
            })
        );

        let entry = store.index().unwrap().get("persona").await.unwrap();
        assert_eq!(entry.item_type, "persona");
        assert!(entry.keywords.contains(&"answers".to_string()));
        assert!(entry.keywords.contains(&"goals".to_string()));

        // Index file is not an item
        assert_eq!(store.keys().await.unwrap(), vec!["persona".to_string()]);
    }

    #[tokio::test]
    async fn test_long_term_falls_back_to_canonical_path() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::LongTerm, &dir).await;
        store.store("doc", Value::from("body"), &StoreOptions::default()).await.unwrap();

        // Reopen with the index gone
        std::fs::remove_file(store.index().unwrap().path()).unwrap();
        let reopened = open(MemoryTier::LongTerm, &dir).await;
        assert_eq!(reopened.retrieve("doc").await.unwrap(), Some(Value::from("body")));
    }

    #[tokio::test]
    async fn test_remove_and_remove_if() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::LongTerm, &dir).await;
        let opts = StoreOptions::default();

        store.store("a", Value::Int(1), &opts).await.unwrap();
        store.store("b", Value::Int(2), &opts).await.unwrap();

        assert!(!store.remove_if("a", |item| item.payload == Value::Int(9)).await.unwrap());
        assert!(store.remove_if("a", |item| item.payload == Value::Int(1)).await.unwrap());
        assert!(store.remove("b").await.unwrap());
        assert!(!store.remove("b").await.unwrap());

        assert_eq!(store.retrieve("a").await.unwrap(), None);
        assert!(store.index().unwrap().is_empty().await);
    }

    #[tokio::test]
    async fn test_rewrite_keeps_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::ShortTerm, &dir).await;

        let mut item = store.store("k", Value::Int(1), &StoreOptions::default()).await.unwrap();
        let stamped = item.timestamp;
        item.payload = Value::Int(2);
        store.rewrite(item).await.unwrap();
        store.clear_cache().await;

        let reloaded = store.retrieve_item("k").await.unwrap().unwrap();
        assert_eq!(reloaded.payload, Value::Int(2));
        assert_eq!(reloaded.timestamp, stamped);

        let foreign = MemoryItem {
            key: "x".into(),
            payload: Value::Null,
            timestamp: Utc::now(),
            metadata: TierMetadata::Working {
                session_id: "s".into(),
                merged_from: None,
            },
        };
        assert!(store.rewrite(foreign).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_scans_skip_malformed_files() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::ShortTerm, &dir).await;
        store.store("good", Value::Bool(true), &StoreOptions::default()).await.unwrap();
        std::fs::write(store.item_path("bad"), b"not json").unwrap();
        std::fs::write(store.dir().join("notes.txt"), b"ignored").unwrap();

        assert_eq!(store.load_all().await.unwrap().len(), 1);
        assert_eq!(store.scan_blocking().unwrap().len(), 1);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reindex_drops_deleted_files() {
        let dir = TempDir::new().unwrap();
        let store = open(MemoryTier::LongTerm, &dir).await;
        let opts = StoreOptions::default();
        store.store("keep", Value::from("kept text"), &opts).await.unwrap();
        store.store("gone", Value::from("deleted text"), &opts).await.unwrap();

        std::fs::remove_file(store.item_path("gone")).unwrap();
        assert_eq!(store.reindex().await.unwrap(), 1);

        let index = store.index().unwrap();
        assert!(index.get("gone").await.is_none());
        assert_eq!(index.get("keep").await.unwrap().keywords, vec!["kept", "text"]);

        let stm = open(MemoryTier::ShortTerm, &dir).await;
        assert_eq!(stm.reindex().await.unwrap(), 0);
    }
}
