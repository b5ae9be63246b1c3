//! Shard file storage
//!
//! Every shard is a single regular file directly inside the storage root,
//! named by its fskey. The adapter hands out streams over these files:
//! a [`ShardReader`] when the shard is already on disk, a [`ShardWriter`]
//! when it has not been uploaded yet.

use crate::error::{Result, StorageError};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::debug;

/// Stream attached to a [`StorageItem`](crate::StorageItem) by `get`.
#[derive(Debug)]
pub enum ShardStream {
    /// Shard is present; read its bytes.
    Readable(ShardReader),
    /// Shard is absent; write its bytes.
    Writable(ShardWriter),
}

impl ShardStream {
    pub fn is_readable(&self) -> bool {
        matches!(self, ShardStream::Readable(_))
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, ShardStream::Writable(_))
    }

    pub fn path(&self) -> &Path {
        match self {
            ShardStream::Readable(r) => &r.path,
            ShardStream::Writable(w) => &w.path,
        }
    }

    pub fn into_reader(self) -> Option<ShardReader> {
        match self {
            ShardStream::Readable(r) => Some(r),
            ShardStream::Writable(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<ShardWriter> {
        match self {
            ShardStream::Writable(w) => Some(w),
            ShardStream::Readable(_) => None,
        }
    }
}

/// Read half of a stored shard
#[derive(Debug)]
pub struct ShardReader {
    file: File,
    path: PathBuf,
    size: u64,
}

impl ShardReader {
    /// Size of the shard file when it was opened
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsyncRead for ShardReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

/// Write half for a shard that has not been uploaded yet
#[derive(Debug)]
pub struct ShardWriter {
    file: File,
    path: PathBuf,
    bytes_written: u64,
}

impl ShardWriter {
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and fsync the shard, returning the number of bytes written.
    pub async fn finish(mut self) -> io::Result<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        debug!(path = %self.path.display(), bytes = self.bytes_written, "Finished shard upload");
        Ok(self.bytes_written)
    }

    /// Drop the stream and remove the file it created, if nothing was written.
    ///
    /// Returns `false` and leaves the file alone once bytes have been written.
    pub async fn discard(self) -> io::Result<bool> {
        if self.bytes_written > 0 {
            return Ok(false);
        }
        let ShardWriter { file, path, .. } = self;
        drop(file);
        fs::remove_file(&path).await?;
        debug!(path = %path.display(), "Discarded empty shard");
        Ok(true)
    }
}

impl AsyncWrite for ShardWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.file).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            self.bytes_written += *n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

/// Shard files living directly in the storage root
#[derive(Debug, Clone)]
pub struct ShardFiles {
    root_dir: PathBuf,
}

impl ShardFiles {
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
        }
    }

    /// Get path for a shard by fskey
    pub fn shard_path(&self, fskey: &str) -> PathBuf {
        self.root_dir.join(fskey)
    }

    /// Open a read stream if the shard exists, otherwise create it and open a write stream.
    ///
    /// The existence check and the open are two separate filesystem calls.
    pub async fn open_stream(&self, fskey: &str) -> Result<ShardStream> {
        let path = self.shard_path(fskey);

        match fs::metadata(&path).await {
            Ok(metadata) => {
                let file = File::open(&path).await.map_err(|source| StorageError::Shard {
                    path: path.clone(),
                    source,
                })?;
                debug!(fskey = %fskey, size = metadata.len(), "Attached shard read stream");
                Ok(ShardStream::Readable(ShardReader {
                    file,
                    path,
                    size: metadata.len(),
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let file = File::create(&path).await.map_err(|source| StorageError::Shard {
                    path: path.clone(),
                    source,
                })?;
                debug!(fskey = %fskey, "Attached shard write stream");
                Ok(ShardStream::Writable(ShardWriter {
                    file,
                    path,
                    bytes_written: 0,
                }))
            }
            Err(source) => Err(StorageError::Shard { path, source }),
        }
    }

    /// Check if a shard file exists
    pub async fn exists(&self, fskey: &str) -> bool {
        fs::metadata(self.shard_path(fskey)).await.is_ok()
    }

    /// Unlink a shard file
    pub async fn remove(&self, fskey: &str) -> io::Result<()> {
        fs::remove_file(self.shard_path(fskey)).await
    }

    /// Sum the sizes of every regular file in the root.
    ///
    /// Directories (the metadata database among them) are skipped.
    pub async fn total_size(&self) -> io::Result<u64> {
        let mut total_bytes = 0u64;
        let mut entries = fs::read_dir(&self.root_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                total_bytes += metadata.len();
            }
        }

        Ok(total_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_missing_shard_opens_writer() {
        let temp_dir = TempDir::new().unwrap();
        let files = ShardFiles::new(temp_dir.path());

        let stream = files.open_stream("abc").await.unwrap();
        assert!(stream.is_writable());
        assert_eq!(stream.path(), temp_dir.path().join("abc"));
    }

    #[tokio::test]
    async fn test_written_shard_reopens_as_reader() {
        let temp_dir = TempDir::new().unwrap();
        let files = ShardFiles::new(temp_dir.path());

        let mut writer = files.open_stream("abc").await.unwrap().into_writer().unwrap();
        writer.write_all(b"shard bytes").await.unwrap();
        assert_eq!(writer.finish().await.unwrap(), 11);

        let mut reader = files.open_stream("abc").await.unwrap().into_reader().unwrap();
        assert_eq!(reader.size(), 11);

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"shard bytes");
    }

    #[tokio::test]
    async fn test_discard_removes_untouched_file() {
        let temp_dir = TempDir::new().unwrap();
        let files = ShardFiles::new(temp_dir.path());

        let writer = files.open_stream("abc").await.unwrap().into_writer().unwrap();
        assert!(files.exists("abc").await);
        assert!(writer.discard().await.unwrap());
        assert!(!files.exists("abc").await);
    }

    #[tokio::test]
    async fn test_discard_keeps_written_file() {
        let temp_dir = TempDir::new().unwrap();
        let files = ShardFiles::new(temp_dir.path());

        let mut writer = files.open_stream("abc").await.unwrap().into_writer().unwrap();
        writer.write_all(b"x").await.unwrap();
        writer.flush().await.unwrap();
        assert!(!writer.discard().await.unwrap());
        assert!(files.exists("abc").await);
    }

    #[tokio::test]
    async fn test_total_size_skips_directories() {
        let temp_dir = TempDir::new().unwrap();
        let files = ShardFiles::new(temp_dir.path());

        std::fs::write(temp_dir.path().join("one"), vec![0u8; 10]).unwrap();
        std::fs::write(temp_dir.path().join("two"), vec![0u8; 32]).unwrap();
        std::fs::create_dir(temp_dir.path().join("nested")).unwrap();
        std::fs::write(temp_dir.path().join("nested").join("ignored"), vec![0u8; 100]).unwrap();

        assert_eq!(files.total_size().await.unwrap(), 42);
    }
}
