//! Embedded storage adapter
//!
//! Metadata records go into a sled database under the storage root; shard
//! payloads sit next to it as plain files named by their fskey.
//!
//! ## Consistency
//!
//! sled and the filesystem fail independently and share no transaction.
//! `del` always removes the metadata record before unlinking the shard, so a
//! failure can leave an orphaned shard file but never a record pointing at a
//! file that was already deleted. Orphans are reported, not cleaned up.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapter::{KeyIter, StorageAdapter, StorageSize};
use crate::config::Config;
use crate::error::{Result, StorageError};
use crate::item::StorageItem;
use crate::paths::{ensure_storage_dir, validate_key};
use crate::shard::ShardFiles;

/// Lifecycle of the metadata store handle
enum AdapterState {
    Closed,
    Open(sled::Db),
}

/// Storage adapter backed by sled plus a directory of shard files
pub struct EmbeddedStorageAdapter {
    config: Config,
    shards: ShardFiles,
    state: Arc<RwLock<AdapterState>>,
}

impl EmbeddedStorageAdapter {
    /// Validate the storage root and open the metadata store.
    ///
    /// Fails with [`StorageError::Config`] when the root exists but is not a
    /// directory.
    pub async fn new(config: Config) -> Result<Self> {
        let root_dir = ensure_storage_dir(&config.storage_dir).await?;

        let adapter = Self {
            shards: ShardFiles::new(&root_dir),
            config,
            state: Arc::new(RwLock::new(AdapterState::Closed)),
        };
        adapter.open().await?;

        info!(path = %root_dir.display(), "Initialized shard storage");
        Ok(adapter)
    }

    /// Create adapter at a specific path
    pub async fn at_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Config::at_path(path)).await
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.read(), AdapterState::Open(_))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn db(&self) -> Result<sled::Db> {
        match &*self.state.read() {
            AdapterState::Open(db) => Ok(db.clone()),
            AdapterState::Closed => Err(StorageError::Closed),
        }
    }
}

/// Key cursor that resumes after the last yielded key on every step.
///
/// No engine handle is held between steps, so `close` releases the store
/// even while a cursor is alive.
struct KeyCursor {
    state: Arc<RwLock<AdapterState>>,
    last: Option<sled::IVec>,
}

impl Iterator for KeyCursor {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let lower = match self.last.take() {
            Some(last) => Bound::Excluded(last),
            None => Bound::Unbounded,
        };

        let next = match &*self.state.read() {
            AdapterState::Open(db) => db
                .range::<sled::IVec, _>((lower, Bound::Unbounded))
                .keys()
                .next(),
            AdapterState::Closed => return Some(Err(StorageError::Closed)),
        };

        match next? {
            Ok(key) => {
                let text = String::from_utf8_lossy(&key).into_owned();
                self.last = Some(key);
                Some(Ok(text))
            }
            Err(e) => Some(Err(StorageError::Iteration(e))),
        }
    }
}

#[async_trait]
impl StorageAdapter for EmbeddedStorageAdapter {
    async fn get(&self, key: &str) -> Result<StorageItem> {
        let mut item = self.peek(key).await?;
        let fskey = item.shard_key(key).to_string();
        validate_key(&fskey)?;

        item.shard = Some(self.shards.open_stream(&fskey).await?);
        Ok(item)
    }

    async fn peek(&self, key: &str) -> Result<StorageItem> {
        let db = self.db()?;
        let value = db
            .get(key.as_bytes())
            .map_err(|source| StorageError::Read {
                key: key.to_string(),
                source,
            })?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        serde_json::from_slice(&value).map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })
    }

    async fn put(&self, key: &str, item: &mut StorageItem) -> Result<()> {
        validate_key(key)?;

        item.shard = None;
        item.fskey = Some(key.to_string());

        let value = serde_json::to_vec(&*item).map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })?;

        let db = self.db()?;
        db.insert(key.as_bytes(), value)
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                source,
            })?;
        db.flush_async().await.map_err(|source| StorageError::Write {
            key: key.to_string(),
            source,
        })?;

        debug!(key = %key, "Stored metadata");
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let fskey = match self.peek(key).await {
            Ok(item) => item.shard_key(key).to_string(),
            Err(e) => {
                debug!(key = %key, error = %e, "Metadata unreadable, removing shard by key");
                key.to_string()
            }
        };

        let db = self.db()?;
        db.remove(key.as_bytes())
            .map_err(|source| StorageError::DeleteMetadata {
                key: key.to_string(),
                source,
            })?;
        db.flush_async()
            .await
            .map_err(|source| StorageError::DeleteMetadata {
                key: key.to_string(),
                source,
            })?;

        if let Err(e) = validate_key(&fskey) {
            warn!(key = %key, fskey = %fskey, "Metadata deleted but recorded fskey is unusable");
            return Err(e);
        }

        if let Err(source) = self.shards.remove(&fskey).await {
            warn!(key = %key, fskey = %fskey, error = %source, "Metadata deleted but shard remains");
            return Err(StorageError::DeleteShard {
                key: key.to_string(),
                fskey,
                source,
            });
        }

        debug!(key = %key, fskey = %fskey, "Deleted item");
        Ok(())
    }

    async fn size(&self) -> Result<StorageSize> {
        let db = self.db()?;
        let metadata_bytes = db.size_on_disk().map_err(StorageError::SizeMetadata)?;
        let shard_bytes = self
            .shards
            .total_size()
            .await
            .map_err(StorageError::SizeShards)?;

        Ok(StorageSize {
            shard_bytes,
            metadata_bytes,
        })
    }

    fn keys(&self) -> KeyIter {
        KeyIter::new(KeyCursor {
            state: Arc::clone(&self.state),
            last: None,
        })
    }

    async fn open(&self) -> Result<()> {
        let mut state = self.state.write();
        if let AdapterState::Open(_) = *state {
            return Ok(());
        }

        let path = self.config.metadata_db_path();
        let db = sled::Config::new()
            .path(&path)
            .cache_capacity(self.config.cache_capacity)
            .open()
            .map_err(StorageError::Open)?;
        *state = AdapterState::Open(db);

        info!(path = %path.display(), "Opened metadata database");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let db = match &*self.state.read() {
            AdapterState::Open(db) => db.clone(),
            AdapterState::Closed => return Ok(()),
        };

        db.flush_async().await.map_err(StorageError::Close)?;
        *self.state.write() = AdapterState::Closed;
        drop(db);

        info!(path = %self.config.metadata_db_path().display(), "Closed metadata database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_adapter() -> (EmbeddedStorageAdapter, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let adapter = EmbeddedStorageAdapter::at_path(temp_dir.path()).await.unwrap();
        (adapter, temp_dir)
    }

    #[tokio::test]
    async fn test_new_opens_store() {
        let (adapter, temp_dir) = create_adapter().await;
        assert!(adapter.is_open());
        assert!(temp_dir.path().join("metadata.sled").is_dir());
    }

    #[tokio::test]
    async fn test_new_creates_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("node").join("storage");

        let adapter = EmbeddedStorageAdapter::at_path(&root).await.unwrap();
        assert!(adapter.is_open());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_new_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("storage");
        std::fs::write(&file, b"not a directory").unwrap();

        let result = EmbeddedStorageAdapter::at_path(&file).await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (adapter, _temp) = create_adapter().await;

        adapter.close().await.unwrap();
        assert!(!adapter.is_open());
        adapter.close().await.unwrap();
        assert!(!adapter.is_open());
    }

    #[tokio::test]
    async fn test_closed_adapter_rejects_operations() {
        let (adapter, _temp) = create_adapter().await;
        adapter.close().await.unwrap();

        assert!(matches!(adapter.peek("abc").await, Err(StorageError::Closed)));
        assert!(matches!(adapter.get("abc").await, Err(StorageError::Closed)));
        assert!(matches!(
            adapter.put("abc", &mut StorageItem::new("abc")).await,
            Err(StorageError::Closed)
        ));
        assert!(matches!(adapter.size().await, Err(StorageError::Closed)));

        let keys: Vec<_> = adapter.keys().collect();
        assert_eq!(keys.len(), 1);
        assert!(matches!(keys[0], Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn test_reopen_after_close_keeps_data() {
        let (adapter, _temp) = create_adapter().await;
        adapter.put("abc", &mut StorageItem::new("abc")).await.unwrap();

        adapter.close().await.unwrap();
        adapter.open().await.unwrap();
        assert!(adapter.is_open());

        let item = adapter.peek("abc").await.unwrap();
        assert_eq!(item.hash, "abc");
    }

    #[tokio::test]
    async fn test_failed_open_stays_closed() {
        let (adapter, _temp) = create_adapter().await;
        adapter.close().await.unwrap();

        // Another handle owns the database lock
        let _held = sled::open(adapter.config().metadata_db_path()).unwrap();

        let result = adapter.open().await;
        assert!(matches!(result, Err(StorageError::Open(_))));
        assert!(!adapter.is_open());
    }

    #[tokio::test]
    async fn test_live_key_iterator_does_not_pin_store() {
        let (adapter, _temp) = create_adapter().await;
        adapter.put("a", &mut StorageItem::new("a")).await.unwrap();
        adapter.put("b", &mut StorageItem::new("b")).await.unwrap();

        let mut keys = adapter.keys();
        assert_eq!(keys.next().unwrap().unwrap(), "a");

        adapter.close().await.unwrap();
        adapter.open().await.unwrap();
        assert!(adapter.is_open());

        // Resumes after the last key once the store is back
        assert_eq!(keys.next().unwrap().unwrap(), "b");
        assert!(keys.next().is_none());
    }

    #[tokio::test]
    async fn test_key_iterator_fails_once_store_closes() {
        let (adapter, _temp) = create_adapter().await;
        adapter.put("a", &mut StorageItem::new("a")).await.unwrap();
        adapter.put("b", &mut StorageItem::new("b")).await.unwrap();

        let mut keys = adapter.keys();
        assert_eq!(keys.next().unwrap().unwrap(), "a");
        adapter.close().await.unwrap();

        assert!(matches!(keys.next(), Some(Err(StorageError::Closed))));
        assert!(keys.next().is_none());
    }

    #[tokio::test]
    async fn test_del_with_unusable_fskey_still_removes_metadata() {
        let (adapter, _temp) = create_adapter().await;
        let record = serde_json::json!({"hash": "abc", "fskey": "../escape"});
        adapter
            .db()
            .unwrap()
            .insert(b"abc", serde_json::to_vec(&record).unwrap())
            .unwrap();

        let result = adapter.del("abc").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(matches!(adapter.peek("abc").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_put_rejects_unsafe_key() {
        let (adapter, _temp) = create_adapter().await;
        let result = adapter.put("../escape", &mut StorageItem::new("x")).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_peek_reports_corrupt_record() {
        let (adapter, _temp) = create_adapter().await;
        adapter.db().unwrap().insert(b"abc", &b"not json"[..]).unwrap();

        let result = adapter.peek("abc").await;
        assert!(matches!(result, Err(StorageError::Serialization { .. })));
    }
}
