//! Shard Store - hybrid metadata/shard storage for storage nodes
//!
//! Keeps small structured records in an embedded ordered key-value store
//! while large shard payloads live as individual files, behind one
//! [`StorageAdapter`] interface.
//!
//! ## Architecture
//!
//! - **sled**: metadata records (`StorageItem` minus the shard bytes)
//! - **Shard files**: one file per key, named by the item's fskey
//! - **Adapter**: `get` attaches a read stream for stored shards and a write
//!   stream for missing ones; `del` removes the record first, then the file
//!
//! ## Storage Layout
//!
//! ```text
//! <storage_dir>/
//! ├── metadata.sled/         # Metadata database
//! ├── 3c1a9f0e...            # Shard file, named by fskey
//! └── 8b22d4c7...
//! ```

pub mod adapter;
pub mod config;
pub mod embedded;
pub mod error;
pub mod item;
pub mod paths;
pub mod shard;

// Re-exports
pub use adapter::{KeyIter, StorageAdapter, StorageSize};
pub use config::Config;
pub use embedded::EmbeddedStorageAdapter;
pub use error::{Result, StorageError};
pub use item::StorageItem;
pub use shard::{ShardFiles, ShardReader, ShardStream, ShardWriter};
