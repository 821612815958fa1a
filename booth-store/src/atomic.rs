//! Atomic file operations for crash safety

use blake3::Hasher;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::{Result, StoreError};

/// Writes to a temporary sibling file and renames it over the target on commit,
/// so readers never observe a half-written file.
pub struct AtomicWriter {
    final_path: PathBuf,
    temp_path: PathBuf,
    file: Option<fs::File>,
    hasher: Hasher,
    bytes_written: u64,
}

impl AtomicWriter {
    /// Create a new atomic writer for the given path
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let final_path = path.as_ref().to_path_buf();
        let temp_path = final_path.with_extension(format!(
            "{}.tmp.{}",
            final_path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or(""),
            uuid::Uuid::new_v4().simple()
        ));

        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = fs::File::create(&temp_path).await?;

        Ok(Self {
            final_path,
            temp_path,
            file: Some(file),
            hasher: Hasher::new(),
            bytes_written: 0,
        })
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(StoreError::AtomicWriteFailed(
                "Writer already finalized".to_string(),
            ));
        };
        file.write_all(data).await?;
        self.hasher.update(data);
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush, fsync and move the temp file over the target
    pub async fn commit(mut self) -> Result<AtomicWriteResult> {
        let Some(file) = self.file.take() else {
            return Err(StoreError::AtomicWriteFailed(
                "Writer already finalized".to_string(),
            ));
        };
        if let Err(e) = persist(file, &self.temp_path, &self.final_path).await {
            remove_temp(&self.temp_path).await;
            return Err(e.into());
        }

        let hash = self.hasher.finalize();
        debug!(
            "Committed atomic write to {}: {} bytes, hash: {}",
            self.final_path.display(),
            self.bytes_written,
            hash.to_hex()
        );

        Ok(AtomicWriteResult {
            path: self.final_path.clone(),
            bytes_written: self.bytes_written,
            content_hash: hash,
        })
    }

    /// Abort the write and clean up
    pub async fn abort(mut self) -> Result<()> {
        if self.file.take().is_some() {
            remove_temp(&self.temp_path).await;
        }
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

async fn persist(mut file: fs::File, temp_path: &Path, final_path: &Path) -> std::io::Result<()> {
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, final_path).await
}

async fn remove_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("Failed to cleanup temp file {}: {}", path.display(), e);
    }
}

/// Result of successful atomic write
#[derive(Debug, Clone)]
pub struct AtomicWriteResult {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub content_hash: blake3::Hash,
}

/// Write `bytes` to `path` with write-temp-then-replace semantics
pub async fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<AtomicWriteResult> {
    let mut writer = AtomicWriter::new(path).await?;
    if let Err(e) = writer.write(bytes).await {
        writer.abort().await?;
        return Err(e);
    }
    writer.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_atomic_writer() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("sync-manifest.json");

        let mut writer = AtomicWriter::new(&test_file).await.unwrap();
        writer.write(b"{\"items\": ").await.unwrap();
        writer.write(b"[]}").await.unwrap();

        assert!(!test_file.exists());

        let result = writer.commit().await.unwrap();
        assert!(test_file.exists());
        assert_eq!(result.bytes_written, 13);
        assert_eq!(result.content_hash, blake3::hash(b"{\"items\": []}"));

        let content = fs::read_to_string(&test_file).await.unwrap();
        assert_eq!(content, "{\"items\": []}");
    }

    #[tokio::test]
    async fn test_atomic_writer_abort_keeps_previous_content() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("settings.json");
        write_atomic(&test_file, b"old").await.unwrap();

        let mut writer = AtomicWriter::new(&test_file).await.unwrap();
        writer.write(b"half written").await.unwrap();
        writer.abort().await.unwrap();

        assert_eq!(fs::read(&test_file).await.unwrap(), b"old");
        let mut entries = fs::read_dir(temp_dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1, "temp file should be removed");
    }

    #[tokio::test]
    async fn test_failed_commit_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("assets");
        fs::create_dir_all(target.join("logo.png")).await.unwrap();

        let mut writer = AtomicWriter::new(&target).await.unwrap();
        writer.write(b"not a directory").await.unwrap();
        assert!(writer.commit().await.is_err());

        let mut entries = fs::read_dir(temp_dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name());
        }
        assert_eq!(names, vec![std::ffi::OsString::from("assets")]);
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parent_and_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("item.bin");

        write_atomic(&nested, b"first").await.unwrap();
        write_atomic(&nested, b"second").await.unwrap();

        assert_eq!(fs::read(&nested).await.unwrap(), b"second");
    }
}
