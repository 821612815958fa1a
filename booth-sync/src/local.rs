//! Refreshing the local manifest from the artifacts actually on disk

use booth_manifest::{BoothId, ContentHash, SyncItem, SyncKind, SyncManifest};
use tracing::{debug, info, warn};

use crate::provider::{ArtifactProvider, LocalArtifact};

/// Result of a refresh pass
#[derive(Debug, Clone)]
pub struct LocalRefresh {
    pub manifest: SyncManifest,
    /// Artifacts that are new or whose content changed since the last run
    pub changed: usize,
    /// Kinds that could not be enumerated, as log-ready messages
    pub errors: Vec<String>,
}

/// Rebuild the item list of `previous` from the current local artifacts.
///
/// An artifact whose hash and file name match the recorded entry keeps its
/// recorded metadata. New or changed artifacts take their modification time
/// and this booth as owner. Entries whose artifact vanished are dropped.
/// If a kind cannot be enumerated its previous entries are carried over.
pub async fn refresh_local_manifest(
    previous: &SyncManifest,
    provider: &dyn ArtifactProvider,
    booth_id: &BoothId,
) -> LocalRefresh {
    let mut manifest = SyncManifest::new(booth_id.as_str());
    manifest.last_modified = previous.last_modified;
    manifest.modified_by = previous.modified_by.clone();

    let mut changed = 0;
    let mut errors = Vec::new();
    for kind in SyncKind::ALL {
        let artifacts = match provider.enumerate(kind).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!("Failed to enumerate local {} artifacts: {}", kind, e);
                errors.push(format!("enumerate {kind}: {e}"));
                for item in previous.items_of(kind) {
                    manifest.upsert(item.clone());
                }
                continue;
            }
        };

        for artifact in artifacts {
            let (item, is_change) = refresh_item(previous, artifact, booth_id);
            if is_change {
                debug!("{} changed locally", item.key());
                changed += 1;
            }
            manifest.upsert(item);
        }
    }

    let dropped = previous
        .items()
        .iter()
        .filter(|item| manifest.get(&item.key()).is_none())
        .count();
    if changed > 0 || dropped > 0 {
        info!(
            "Local refresh: {} new or changed, {} no longer present",
            changed, dropped
        );
    }

    LocalRefresh {
        manifest,
        changed,
        errors,
    }
}

fn refresh_item(
    previous: &SyncManifest,
    artifact: LocalArtifact,
    booth_id: &BoothId,
) -> (SyncItem, bool) {
    let hash = ContentHash::of(&artifact.bytes);
    match previous.get_item(artifact.kind, &artifact.id) {
        Some(recorded) if recorded.content_hash == hash && recorded.file_name == artifact.file_name => {
            let mut item = recorded.clone();
            if artifact.payload.is_some() {
                item.payload = artifact.payload;
            }
            (item, false)
        }
        _ => {
            let mut item = SyncItem::new(
                artifact.id,
                artifact.kind,
                artifact.file_name,
                hash,
                artifact.last_modified,
                booth_id.as_str(),
            );
            item.payload = artifact.payload;
            (item, true)
        }
    }
}
