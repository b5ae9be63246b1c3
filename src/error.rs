//! Error types for shard-store

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Metadata store is closed")]
    Closed,

    #[error("Failed to read metadata for {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("Failed to decode metadata for {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to open shard {}: {source}", .path.display())]
    Shard {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metadata for {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("Failed to delete metadata for {key}: {source}")]
    DeleteMetadata {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("Metadata for {key} deleted but shard {fskey} could not be removed: {source}")]
    DeleteShard {
        key: String,
        fskey: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to estimate metadata size: {0}")]
    SizeMetadata(#[source] sled::Error),

    #[error("Failed to measure shard files: {0}")]
    SizeShards(#[source] std::io::Error),

    #[error("Key iteration failed: {0}")]
    Iteration(#[source] sled::Error),

    #[error("Failed to open metadata store: {0}")]
    Open(#[source] sled::Error),

    #[error("Failed to close metadata store: {0}")]
    Close(#[source] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
