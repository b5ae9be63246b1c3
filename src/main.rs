//! Shard Store CLI
//!
//! Operator tool over a node's shard storage directory.
//!
//! ## Usage
//!
//! ```bash
//! # Byte totals for shards and metadata
//! shard-store --storage-dir /data/shards stats
//!
//! # List keys in order
//! shard-store keys
//!
//! # Store metadata and upload a shard from a file
//! shard-store put 3c1a9f0e --file chunk.bin
//!
//! # Stream a shard to stdout
//! shard-store cat 3c1a9f0e > chunk.bin
//!
//! # Remove metadata and shard
//! shard-store del 3c1a9f0e
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use shard_store::{Config, EmbeddedStorageAdapter, ShardStream, StorageAdapter, StorageError, StorageItem};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shard-store")]
#[command(about = "Inspect and manage a node's shard storage")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "SHARD_STORE_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print shard and metadata byte totals
    Stats,
    /// Print every key in order
    Keys,
    /// Print the metadata record for a key
    Peek { key: String },
    /// Store metadata for a key, optionally uploading its shard
    Put {
        key: String,
        /// File to upload as the shard
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Write a shard to stdout
    Cat { key: String },
    /// Delete metadata and shard for a key
    Del { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("shard_store=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }

    let adapter = EmbeddedStorageAdapter::new(config).await?;
    let result = run(&adapter, args.command).await;
    adapter.close().await?;
    result
}

async fn run(adapter: &EmbeddedStorageAdapter, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Stats => {
            let size = adapter.size().await?;
            println!("shard_bytes    {}", size.shard_bytes);
            println!("metadata_bytes {}", size.metadata_bytes);
            println!("total_bytes    {}", size.total());
        }
        Command::Keys => {
            for key in adapter.keys() {
                println!("{}", key?);
            }
        }
        Command::Peek { key } => {
            let item = adapter.peek(&key).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        Command::Put { key, file } => {
            let mut item = match adapter.peek(&key).await {
                Ok(item) => item,
                Err(StorageError::NotFound(_)) => StorageItem::new(key.clone()),
                Err(e) => return Err(e.into()),
            };
            adapter.put(&key, &mut item).await?;

            if let Some(path) = file {
                let mut source = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;

                match adapter.get(&key).await?.take_shard() {
                    Some(ShardStream::Writable(mut writer)) => {
                        tokio::io::copy(&mut source, &mut writer).await?;
                        let bytes = writer.finish().await?;
                        info!(key = %key, bytes = bytes, "Uploaded shard");
                    }
                    Some(ShardStream::Readable(_)) => bail!("shard for {key} is already stored"),
                    None => bail!("no shard stream attached for {key}"),
                }
            }
        }
        Command::Cat { key } => match adapter.get(&key).await?.take_shard() {
            Some(ShardStream::Readable(mut reader)) => {
                let mut stdout = tokio::io::stdout();
                tokio::io::copy(&mut reader, &mut stdout).await?;
                stdout.flush().await?;
            }
            Some(ShardStream::Writable(writer)) => {
                writer.discard().await?;
                bail!("shard for {key} has not been uploaded");
            }
            None => bail!("no shard stream attached for {key}"),
        },
        Command::Del { key } => {
            adapter.del(&key).await?;
            info!(key = %key, "Deleted");
        }
    }
    Ok(())
}
