//! Manifest reconciliation
//!
//! Compares this booth's manifest with the shared one and decides, per item,
//! whether to upload, download, or surface a conflict. Items are independent:
//! the plan is the union of per-item decisions.

use booth_manifest::{ItemKey, SyncItem, SyncKind, SyncManifest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::conflict::{ConflictResolver, Resolution};

/// A divergence the active policy could not settle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub local: SyncItem,
    pub remote: SyncItem,
}

impl Conflict {
    pub fn key(&self) -> ItemKey {
        self.local.key()
    }
}

/// Upload, download and conflict decisions for one sync run.
///
/// Created fresh per run and never persisted. `to_upload` and
/// `to_download` are disjoint; conflicting items appear in neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_upload: Vec<SyncItem>,
    pub to_download: Vec<SyncItem>,
    pub conflicts: Vec<Conflict>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_download.is_empty() && self.conflicts.is_empty()
    }

    pub fn uploads_of(&self, kind: SyncKind) -> Vec<SyncItem> {
        self.to_upload.iter().filter(|i| i.kind == kind).cloned().collect()
    }

    pub fn downloads_of(&self, kind: SyncKind) -> Vec<SyncItem> {
        self.to_download.iter().filter(|i| i.kind == kind).cloned().collect()
    }

    pub fn total_transfers(&self) -> usize {
        self.to_upload.len() + self.to_download.len()
    }
}

/// Computes sync plans
pub struct Reconciler {
    resolver: ConflictResolver,
}

impl Reconciler {
    pub fn new(resolver: ConflictResolver) -> Self {
        Self { resolver }
    }

    /// Compare `local` against `remote`.
    ///
    /// Only content hashes decide whether an item differs; timestamps are
    /// consulted solely by the resolver once a difference exists.
    pub fn compare(&self, local: &SyncManifest, remote: &SyncManifest) -> SyncPlan {
        let local_index = local.index();
        let remote_index = remote.index();
        let keys: BTreeSet<&ItemKey> = local_index.keys().chain(remote_index.keys()).collect();

        let mut plan = SyncPlan::default();
        for key in keys {
            match (local_index.get(key), remote_index.get(key)) {
                (Some(local_item), None) => {
                    debug!("{} only present locally, staging upload", key);
                    plan.to_upload.push((*local_item).clone());
                }
                (None, Some(remote_item)) => {
                    debug!("{} only present remotely, staging download", key);
                    plan.to_download.push((*remote_item).clone());
                }
                (Some(local_item), Some(remote_item)) => {
                    if local_item.content_hash == remote_item.content_hash {
                        continue;
                    }
                    match self.resolver.decide(local_item, remote_item) {
                        Resolution::UseLocal => {
                            debug!("{} diverged, local version wins", key);
                            plan.to_upload.push((*local_item).clone());
                        }
                        Resolution::UseRemote => {
                            debug!("{} diverged, remote version wins", key);
                            plan.to_download.push((*remote_item).clone());
                        }
                        Resolution::Manual => {
                            debug!("{} diverged, needs manual resolution", key);
                            plan.conflicts.push(Conflict {
                                local: (*local_item).clone(),
                                remote: (*remote_item).clone(),
                            });
                        }
                    }
                }
                (None, None) => {}
            }
        }

        info!(
            "Sync plan ({}): {} to upload, {} to download, {} conflicts",
            self.resolver.policy(),
            plan.to_upload.len(),
            plan.to_download.len(),
            plan.conflicts.len()
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictPolicy;
    use booth_manifest::ContentHash;
    use chrono::{DateTime, Duration, Utc};

    fn item(id: &str, kind: SyncKind, content: &[u8], at: DateTime<Utc>, by: &str) -> SyncItem {
        SyncItem::new(id, kind, Some(format!("{id}.dat")), ContentHash::of(content), at, by)
    }

    fn reconciler(policy: ConflictPolicy) -> Reconciler {
        Reconciler::new(ConflictResolver::new(policy))
    }

    #[test]
    fn test_one_sided_items() {
        let now = Utc::now();
        let mut local = SyncManifest::new("BOOTH-X");
        local.upsert(item("mine", SyncKind::Template, b"1", now, "BOOTH-X"));
        let mut remote = SyncManifest::empty_remote();
        remote.upsert(item("theirs", SyncKind::Setting, b"2", now, "BOOTH-Y"));

        let plan = reconciler(ConflictPolicy::NewestWins).compare(&local, &remote);
        assert_eq!(plan.to_upload.len(), 1);
        assert_eq!(plan.to_upload[0].id, "mine");
        assert_eq!(plan.to_download.len(), 1);
        assert_eq!(plan.to_download[0].id, "theirs");
        assert!(plan.conflicts.is_empty());
    }

    #[test]
    fn test_equal_hashes_ignore_timestamps() {
        let now = Utc::now();
        let mut local = SyncManifest::new("BOOTH-X");
        local.upsert(item("tpl1", SyncKind::Template, b"same", now, "BOOTH-X"));
        let mut remote = SyncManifest::empty_remote();
        remote.upsert(item("tpl1", SyncKind::Template, b"same", now - Duration::days(3), "BOOTH-Y"));

        for policy in [
            ConflictPolicy::NewestWins,
            ConflictPolicy::LocalWins,
            ConflictPolicy::RemoteWins,
            ConflictPolicy::Manual,
        ] {
            assert!(reconciler(policy).compare(&local, &remote).is_empty());
        }
    }

    #[test]
    fn test_newest_wins_downloads_newer_remote() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(30);
        let mut local = SyncManifest::new("BOOTH-X");
        local.upsert(item("tpl1", SyncKind::Template, b"A", t1, "BOOTH-X"));
        let mut remote = SyncManifest::empty_remote();
        remote.upsert(item("tpl1", SyncKind::Template, b"B", t2, "BOOTH-Y"));

        let plan = reconciler(ConflictPolicy::NewestWins).compare(&local, &remote);
        assert!(plan.to_upload.is_empty());
        assert_eq!(plan.to_download.len(), 1);
        assert_eq!(plan.to_download[0].content_hash, ContentHash::of(b"B"));
        assert_eq!(plan.to_download[0].modified_by, "BOOTH-Y");
    }

    #[test]
    fn test_manual_policy_excludes_conflicts_from_transfers() {
        let now = Utc::now();
        let mut local = SyncManifest::new("BOOTH-X");
        local.upsert(item("tpl1", SyncKind::Template, b"A", now, "BOOTH-X"));
        local.upsert(item("new", SyncKind::Asset, b"N", now, "BOOTH-X"));
        let mut remote = SyncManifest::empty_remote();
        remote.upsert(item("tpl1", SyncKind::Template, b"B", now - Duration::hours(1), "BOOTH-Y"));

        let plan = reconciler(ConflictPolicy::Manual).compare(&local, &remote);
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].key(), ItemKey::new(SyncKind::Template, "tpl1"));
        assert_eq!(plan.to_upload.len(), 1);
        assert_eq!(plan.to_upload[0].id, "new");
        assert!(plan.to_download.is_empty());
    }

    #[test]
    fn test_empty_remote_uploads_everything() {
        let now = Utc::now();
        let mut local = SyncManifest::new("BOOTH-X");
        for (i, kind) in SyncKind::ALL.into_iter().enumerate() {
            local.upsert(item(&format!("item{i}"), kind, b"x", now, "BOOTH-X"));
        }

        let plan = reconciler(ConflictPolicy::NewestWins).compare(&local, &SyncManifest::empty_remote());
        assert_eq!(plan.to_upload.len(), 4);
        assert!(plan.to_download.is_empty());
        assert!(plan.conflicts.is_empty());
        for kind in SyncKind::ALL {
            assert_eq!(plan.uploads_of(kind).len(), 1);
        }
    }
}
