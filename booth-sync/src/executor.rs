//! Transfer executor: moves item bytes between a booth and the shared store

use booth_manifest::{BoothId, ContentHash, ItemKey, SyncItem, SyncKind};
use booth_store::ObjectStore;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Result, SyncError};
use crate::provider::ArtifactProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "upload"),
            TransferDirection::Download => write!(f, "download"),
        }
    }
}

/// One item transfer that did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub key: ItemKey,
    pub direction: TransferDirection,
    pub reason: String,
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} failed: {}", self.direction, self.key, self.reason)
    }
}

/// Transfers settled for one kind
#[derive(Debug, Clone)]
pub struct KindOutcome {
    pub kind: SyncKind,
    /// Uploaded items as they should now be recorded
    pub uploaded: Vec<SyncItem>,
    /// Downloaded items, carrying the remote metadata
    pub downloaded: Vec<SyncItem>,
    pub failures: Vec<TransferFailure>,
}

impl KindOutcome {
    fn new(kind: SyncKind) -> Self {
        Self {
            kind,
            uploaded: Vec::new(),
            downloaded: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn synced(&self) -> usize {
        self.uploaded.len() + self.downloaded.len()
    }
}

/// Performs uploads and downloads, at most `max_concurrent` at a time.
///
/// Every transfer fully overwrites its destination, so retrying a partially
/// failed batch converges on the same end state.
pub struct TransferExecutor {
    store: Arc<dyn ObjectStore>,
    provider: Arc<dyn ArtifactProvider>,
    booth_id: BoothId,
    max_concurrent: usize,
}

impl TransferExecutor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        provider: Arc<dyn ArtifactProvider>,
        booth_id: BoothId,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            provider,
            booth_id,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Upload the local bytes of `item`.
    ///
    /// The hash is recomputed from the bytes actually sent; the returned
    /// entry is owned by this booth.
    pub async fn upload(&self, item: &SyncItem) -> Result<SyncItem> {
        let bytes = self
            .provider
            .read(item)
            .await?
            .ok_or_else(|| SyncError::ArtifactMissing(item.key().to_string()))?;

        let hash = ContentHash::of(&bytes);
        if hash != item.content_hash {
            debug!("{} changed since refresh, uploading current content", item.key());
        }

        self.store
            .upload(&item.remote_path, &bytes)
            .await
            .map_err(|e| SyncError::TransferFailed {
                item: item.key().to_string(),
                reason: e.to_string(),
            })?;

        let mut uploaded = item.clone();
        uploaded.content_hash = hash;
        uploaded.last_modified = Utc::now();
        uploaded.modified_by = self.booth_id.to_string();
        debug!("Uploaded {} ({} bytes) to {}", item.key(), bytes.len(), item.remote_path);
        Ok(uploaded)
    }

    /// Download `item` and apply it locally.
    ///
    /// Bytes that do not match the advertised hash are rejected.
    pub async fn download(&self, item: &SyncItem) -> Result<SyncItem> {
        let bytes = self
            .store
            .download(&item.remote_path)
            .await
            .map_err(|e| SyncError::TransferFailed {
                item: item.key().to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| SyncError::TransferFailed {
                item: item.key().to_string(),
                reason: format!("{} not found in store", item.remote_path),
            })?;

        let actual = ContentHash::of(&bytes);
        if actual != item.content_hash {
            return Err(SyncError::HashMismatch {
                item: item.key().to_string(),
                expected: item.content_hash.to_hex(),
                actual: actual.to_hex(),
            });
        }

        self.provider.write(item, &bytes).await?;
        debug!("Downloaded {} ({} bytes) from {}", item.key(), bytes.len(), item.remote_path);
        Ok(item.clone())
    }

    /// Run the uploads, then the downloads, of one kind.
    ///
    /// Failing items are collected, not raised. Cancellation is checked
    /// before each transfer starts; a cancelled batch returns `Cancelled`
    /// once in-flight transfers have settled.
    pub async fn execute(
        &self,
        kind: SyncKind,
        uploads: &[SyncItem],
        downloads: &[SyncItem],
        cancel: &CancellationToken,
    ) -> Result<KindOutcome> {
        let mut outcome = KindOutcome::new(kind);

        for (direction, items) in [
            (TransferDirection::Upload, uploads),
            (TransferDirection::Download, downloads),
        ] {
            let results: Vec<(ItemKey, Result<SyncItem>)> = stream::iter(items.iter().cloned())
                .map(|item| self.transfer(direction, item, cancel))
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

            for (key, result) in results {
                match result {
                    Ok(item) => match direction {
                        TransferDirection::Upload => outcome.uploaded.push(item),
                        TransferDirection::Download => outcome.downloaded.push(item),
                    },
                    Err(SyncError::Cancelled) => {}
                    Err(e) => {
                        warn!("Failed to {} {}: {}", direction, key, e);
                        outcome.failures.push(TransferFailure {
                            key,
                            direction,
                            reason: e.to_string(),
                        });
                    }
                }
            }

            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
        }

        Ok(outcome)
    }

    async fn transfer(
        &self,
        direction: TransferDirection,
        item: SyncItem,
        cancel: &CancellationToken,
    ) -> (ItemKey, Result<SyncItem>) {
        if cancel.is_cancelled() {
            return (item.key(), Err(SyncError::Cancelled));
        }
        let result = match direction {
            TransferDirection::Upload => self.upload(&item).await,
            TransferDirection::Download => self.download(&item).await,
        };
        (item.key(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FsArtifactProvider;
    use crate::repository::JsonRecordRepository;
    use booth_store::InMemoryObjectStore;
    use std::path::Path;
    use tempfile::tempdir;

    fn booth() -> BoothId {
        "BOOTH-X-0000AAAA".parse().unwrap()
    }

    fn executor(root: &Path, store: Arc<InMemoryObjectStore>) -> TransferExecutor {
        let repository = Arc::new(JsonRecordRepository::new(root.join("database")));
        let provider = Arc::new(FsArtifactProvider::new(root, repository));
        TransferExecutor::new(store, provider, booth(), 2)
    }

    fn template(id: &str, content: &[u8]) -> SyncItem {
        SyncItem::new(
            id,
            SyncKind::Template,
            Some(format!("{id}.xml")),
            ContentHash::of(content),
            Utc::now(),
            "BOOTH-Y",
        )
    }

    #[tokio::test]
    async fn test_upload_claims_ownership() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new());
        let executor = executor(dir.path(), store.clone());
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/tpl1.xml"), b"A").unwrap();

        let uploaded = executor.upload(&template("tpl1", b"A")).await.unwrap();
        assert_eq!(uploaded.modified_by, booth().as_str());
        assert_eq!(store.get("templates/tpl1.xml").await, Some(b"A".to_vec()));
    }

    #[tokio::test]
    async fn test_download_verifies_hash() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new());
        let executor = executor(dir.path(), store.clone());
        store.upload("templates/tpl1.xml", b"tampered").await.unwrap();

        let result = executor.download(&template("tpl1", b"B")).await;
        assert!(matches!(result, Err(SyncError::HashMismatch { .. })));
        assert!(!dir.path().join("templates/tpl1.xml").exists());

        store.upload("templates/tpl1.xml", b"B").await.unwrap();
        let downloaded = executor.download(&template("tpl1", b"B")).await.unwrap();
        assert_eq!(downloaded.modified_by, "BOOTH-Y");
        assert_eq!(std::fs::read(dir.path().join("templates/tpl1.xml")).unwrap(), b"B");
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new());
        let executor = executor(dir.path(), store.clone());
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        for id in ["a", "b", "c"] {
            std::fs::write(dir.path().join(format!("templates/{id}.xml")), id).unwrap();
        }
        store.fail_key("templates/b.xml").await;

        let uploads = vec![template("a", b"a"), template("b", b"b"), template("c", b"c")];
        let outcome = executor
            .execute(SyncKind::Template, &uploads, &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.uploaded.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].key, ItemKey::new(SyncKind::Template, "b"));
        assert_eq!(outcome.failures[0].direction, TransferDirection::Upload);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_a_failure() {
        let dir = tempdir().unwrap();
        let executor = executor(dir.path(), Arc::new(InMemoryObjectStore::new()));

        let outcome = executor
            .execute(SyncKind::Template, &[template("ghost", b"x")], &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.uploaded.is_empty());
        assert!(outcome.failures[0].reason.contains("missing"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_transfers_nothing() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new());
        let executor = executor(dir.path(), store.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor
            .execute(SyncKind::Template, &[], &[template("tpl1", b"B")], &cancel)
            .await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_runs_on_spawned_task() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new());
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/tpl1.xml"), b"A").unwrap();
        let executor = Arc::new(executor(dir.path(), store.clone()));

        let handle = tokio::spawn(async move {
            let uploads = vec![template("tpl1", b"A")];
            executor
                .execute(SyncKind::Template, &uploads, &[], &CancellationToken::new())
                .await
        });
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.uploaded.len(), 1);
        assert_eq!(store.get("templates/tpl1.xml").await, Some(b"A".to_vec()));
    }
}
