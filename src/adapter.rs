//! Core trait for storage adapters.
//!
//! This module defines the `StorageAdapter` trait - the unified interface the
//! node's protocol handlers talk to, regardless of where metadata and shard
//! bytes physically live.

use async_trait::async_trait;

use crate::error::{Result, StorageError};
use crate::item::StorageItem;

/// Byte totals reported by [`StorageAdapter::size`].
///
/// The two numbers come from independent snapshots and are approximate
/// under concurrent writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageSize {
    /// Sum of on-disk shard file sizes
    pub shard_bytes: u64,
    /// Metadata store's own size estimate
    pub metadata_bytes: u64,
}

impl StorageSize {
    pub fn total(&self) -> u64 {
        self.shard_bytes + self.metadata_bytes
    }
}

/// Lazy, single-pass, ordered sequence of keys.
///
/// A failure is yielded once as `Err` and ends the sequence.
pub struct KeyIter {
    inner: Option<Box<dyn Iterator<Item = Result<String>> + Send>>,
}

impl KeyIter {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<String>> + Send + 'static,
    {
        Self {
            inner: Some(Box::new(iter)),
        }
    }

    /// Sequence that yields `err` and nothing else.
    pub fn failed(err: StorageError) -> Self {
        Self::new(std::iter::once(Err(err)))
    }
}

impl Iterator for KeyIter {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.as_mut()?.next();
        if !matches!(next, Some(Ok(_))) {
            self.inner = None;
        }
        next
    }
}

impl std::iter::FusedIterator for KeyIter {}

/// Storage backend seen by the rest of the node.
///
/// Implementations keep metadata and shard payloads behind one key space.
/// None of the operations are atomic across backends.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read the metadata record and attach a shard stream: readable when the
    /// shard exists, writable when it has not been uploaded yet.
    async fn get(&self, key: &str) -> Result<StorageItem>;

    /// Read the metadata record only.
    async fn peek(&self, key: &str) -> Result<StorageItem>;

    /// Durably store metadata for `key`. Clears `item.shard` and records
    /// `item.fskey`. Never writes shard bytes.
    async fn put(&self, key: &str, item: &mut StorageItem) -> Result<()>;

    /// Remove the metadata record, then the shard file.
    async fn del(&self, key: &str) -> Result<()>;

    /// Approximate bytes used by shards and by metadata.
    async fn size(&self) -> Result<StorageSize>;

    /// Every stored key in ascending order.
    fn keys(&self) -> KeyIter;

    /// Open the metadata store. No-op when already open.
    async fn open(&self) -> Result<()>;

    /// Close the metadata store. No-op when already closed.
    async fn close(&self) -> Result<()>;
}
