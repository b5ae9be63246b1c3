//! Storage root bootstrap and key-to-filename checks

use crate::config::METADATA_DB_NAME;
use crate::error::{Result, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Make sure `path` exists and is a directory.
///
/// A missing directory is created along with its ancestors. An existing
/// non-directory is a configuration error and is never retried.
pub async fn ensure_storage_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref().to_path_buf();

    match fs::metadata(&path).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(&path).await?;
            info!(path = %path.display(), "Created storage directory");
        }
        Err(e) => return Err(e.into()),
    }

    let metadata = fs::metadata(&path).await?;
    if !metadata.is_dir() {
        return Err(StorageError::Config(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    Ok(path)
}

/// Reject keys that cannot safely name a file directly inside the storage root.
pub fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key == METADATA_DB_NAME
        || key.contains(&['/', '\\', '\0'][..]);

    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
