//! Object-store client contract

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use crate::atomic::write_atomic;
use crate::errors::{Result, StoreError};

/// Client for the shared bucket all booths sync through.
///
/// Keys are `/`-separated relative paths under the sync root
/// (`templates/a.xml`, `sync-manifest.json`). Writes fully overwrite
/// the destination, so every operation is safe to retry.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch the object under `key`, or `None` if it does not exist
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the object under `key`; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<()>;

    /// Human-readable location for logs
    fn describe(&self) -> String;

    /// Upload the contents of a local file
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<()> {
        let bytes = tokio::fs::read(local_path).await?;
        debug!("Uploading {} as {}", local_path.display(), key);
        self.upload(key, &bytes).await
    }

    /// Download an object into a local file; returns `false` if the key is absent
    async fn download_to(&self, key: &str, local_path: &Path) -> Result<bool> {
        match self.download(key).await? {
            Some(bytes) => {
                write_atomic(local_path, &bytes).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Reject keys that could escape the sync root
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("sync-manifest.json").is_ok());
        assert!(validate_key("templates/tpl1.xml").is_ok());

        for bad in ["", "/abs", "../up", "templates/../x", "a//b", "dir\\file", "templates/"] {
            assert!(validate_key(bad).is_err(), "{bad} should be rejected");
        }
    }
}
