//! Object store backed by a directory (mounted bucket or shared folder)

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

use crate::atomic::write_atomic;
use crate::errors::{Result, StoreError};
use crate::object_store::{validate_key, ObjectStore};

/// Maps object keys onto files under `root`.
///
/// The root must already exist: a missing root means the bucket is not
/// mounted, which is reported as [`StoreError::Unavailable`] rather than
/// silently recreated.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed and open the store
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(StoreError::Unavailable(format!(
                "sync root {} is not reachable",
                self.root.display()
            )));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key).await?;
        write_atomic(&path, bytes)
            .await
            .map_err(|e| StoreError::UploadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        debug!("Stored {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key).await?;
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!("Read {} ({} bytes)", key, bytes.len());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::DownloadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
