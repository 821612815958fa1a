//! Local and remote manifest persistence

use booth_manifest::{BoothId, SyncManifest, REMOTE_BOOTH_ID};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::errors::Result;
use crate::object_store::ObjectStore;

/// Key of the shared manifest at the root of the sync namespace
pub const MANIFEST_KEY: &str = "sync-manifest.json";

/// Where a fetched remote manifest came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOrigin {
    /// Parsed from the shared manifest object
    Published,
    /// No manifest has been published yet
    Absent,
    /// The object exists but could not be parsed
    Corrupt,
    /// The store could not be reached
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub manifest: SyncManifest,
    pub origin: RemoteOrigin,
}

/// Loads and saves this booth's manifest and the shared one.
///
/// Reads never fail: a missing or unreadable manifest is a valid
/// "never synced" state and yields an empty manifest.
pub struct ManifestStore {
    local_path: PathBuf,
    booth_id: BoothId,
    store: Arc<dyn ObjectStore>,
}

impl ManifestStore {
    pub fn new(local_path: impl Into<PathBuf>, booth_id: BoothId, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            local_path: local_path.into(),
            booth_id,
            store,
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn booth_id(&self) -> &BoothId {
        &self.booth_id
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Load the local manifest, or a fresh one stamped with this booth's id
    pub async fn load_local(&self) -> SyncManifest {
        let bytes = match tokio::fs::read(&self.local_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No local manifest at {}, starting fresh", self.local_path.display());
                return SyncManifest::new(self.booth_id.as_str());
            }
            Err(e) => {
                warn!(
                    "Failed to read local manifest {}: {}, starting fresh",
                    self.local_path.display(),
                    e
                );
                return SyncManifest::new(self.booth_id.as_str());
            }
        };

        match SyncManifest::from_json(&bytes) {
            Ok(mut manifest) => {
                if manifest.booth_id != self.booth_id.as_str() {
                    warn!(
                        "Local manifest belongs to {}, re-stamping for {}",
                        manifest.booth_id, self.booth_id
                    );
                    manifest.booth_id = self.booth_id.to_string();
                }
                debug!("Loaded local manifest with {} items", manifest.len());
                manifest
            }
            Err(e) => {
                warn!("Discarding corrupt local manifest: {}", e);
                SyncManifest::new(self.booth_id.as_str())
            }
        }
    }

    /// Fetch the shared manifest, degrading to an empty one on any failure
    pub async fn fetch_remote(&self) -> FetchedManifest {
        let (manifest, origin) = match self.store.download(MANIFEST_KEY).await {
            Ok(Some(bytes)) => match SyncManifest::from_json(&bytes) {
                Ok(manifest) => (manifest, RemoteOrigin::Published),
                Err(e) => {
                    warn!("Remote manifest is corrupt, treating as empty: {}", e);
                    (SyncManifest::empty_remote(), RemoteOrigin::Corrupt)
                }
            },
            Ok(None) => {
                info!("No remote manifest at {}", self.store.describe());
                (SyncManifest::empty_remote(), RemoteOrigin::Absent)
            }
            Err(e) => {
                warn!("Remote manifest unreachable, treating as empty: {}", e);
                (SyncManifest::empty_remote(), RemoteOrigin::Unreachable)
            }
        };
        debug!("Fetched remote manifest ({:?}) with {} items", origin, manifest.len());
        FetchedManifest { manifest, origin }
    }

    /// Atomically write the local manifest
    pub async fn persist_local(&self, manifest: &SyncManifest) -> Result<()> {
        let bytes = manifest.to_json()?;
        write_atomic(&self.local_path, &bytes).await?;
        debug!("Persisted local manifest ({} items)", manifest.len());
        Ok(())
    }

    /// Upload the shared manifest; always published under the remote sentinel
    pub async fn publish_remote(&self, manifest: &SyncManifest) -> Result<()> {
        let mut shared = manifest.clone();
        shared.booth_id = REMOTE_BOOTH_ID.to_string();
        let bytes = shared.to_json()?;
        self.store.upload(MANIFEST_KEY, &bytes).await?;
        info!("Published remote manifest ({} items)", shared.len());
        Ok(())
    }
}
