//! Sync manifests: the per-replica list of known items and fingerprints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::errors::{ManifestError, Result};
use crate::hash::ContentHash;
use crate::item::{ItemKey, SyncItem, SyncKind};

/// Current manifest wire format version
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Owner recorded on the shared (remote) manifest
pub const REMOTE_BOOTH_ID: &str = "REMOTE";

/// A versioned collection of items belonging to one booth, or the shared view.
///
/// Items are kept sorted by `(kind, id)` and unique on that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    pub version: u32,
    pub booth_id: String,
    pub last_modified: DateTime<Utc>,
    pub modified_by: String,
    #[serde(default)]
    items: Vec<SyncItem>,
}

impl SyncManifest {
    /// Create an empty manifest owned by `booth_id`
    pub fn new(booth_id: impl Into<String>) -> Self {
        let booth_id = booth_id.into();
        Self {
            version: MANIFEST_FORMAT_VERSION,
            modified_by: booth_id.clone(),
            booth_id,
            last_modified: Utc::now(),
            items: Vec::new(),
        }
    }

    /// Create an empty manifest sentineled as remote-origin
    pub fn empty_remote() -> Self {
        Self::new(REMOTE_BOOTH_ID)
    }

    pub fn is_remote(&self) -> bool {
        self.booth_id == REMOTE_BOOTH_ID
    }

    /// Parse a manifest from its JSON wire form.
    ///
    /// Duplicate `(kind, id)` entries keep the most recently modified one.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut manifest: SyncManifest = serde_json::from_slice(bytes)?;
        if manifest.version > MANIFEST_FORMAT_VERSION {
            return Err(ManifestError::UnsupportedVersion {
                supported: MANIFEST_FORMAT_VERSION,
                actual: manifest.version,
            });
        }
        manifest.normalize();
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    fn normalize(&mut self) {
        let mut by_key: BTreeMap<ItemKey, SyncItem> = BTreeMap::new();
        for item in self.items.drain(..) {
            let key = item.key();
            match by_key.get(&key) {
                Some(existing) if existing.last_modified >= item.last_modified => {
                    warn!("Dropping duplicate manifest entry for {}", key);
                }
                _ => {
                    by_key.insert(key, item);
                }
            }
        }
        self.items = by_key.into_values().collect();
    }

    fn position(&self, key: &ItemKey) -> std::result::Result<usize, usize> {
        self.items
            .binary_search_by(|item| (item.kind, item.id.as_str()).cmp(&(key.kind, key.id.as_str())))
    }

    pub fn get(&self, key: &ItemKey) -> Option<&SyncItem> {
        self.position(key).ok().map(|idx| &self.items[idx])
    }

    pub fn get_item(&self, kind: SyncKind, id: &str) -> Option<&SyncItem> {
        self.get(&ItemKey::new(kind, id))
    }

    /// Insert or replace an item, returning the previous version if any
    pub fn upsert(&mut self, item: SyncItem) -> Option<SyncItem> {
        match self.position(&item.key()) {
            Ok(idx) => Some(std::mem::replace(&mut self.items[idx], item)),
            Err(idx) => {
                self.items.insert(idx, item);
                None
            }
        }
    }

    pub fn remove(&mut self, key: &ItemKey) -> Option<SyncItem> {
        self.position(key).ok().map(|idx| self.items.remove(idx))
    }

    pub fn items(&self) -> &[SyncItem] {
        &self.items
    }

    pub fn items_of(&self, kind: SyncKind) -> impl Iterator<Item = &SyncItem> {
        self.items.iter().filter(move |item| item.kind == kind)
    }

    /// Index items by `(kind, id)`
    pub fn index(&self) -> BTreeMap<ItemKey, &SyncItem> {
        self.items.iter().map(|item| (item.key(), item)).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Update manifest-level bookkeeping
    pub fn mark_modified(&mut self, booth_id: &str, at: DateTime<Utc>) {
        self.last_modified = at;
        self.modified_by = booth_id.to_string();
    }

    /// Digest over every item's identity and content hash.
    ///
    /// Timestamps and owners are excluded, so two manifests describing the
    /// same content share a fingerprint.
    pub fn content_fingerprint(&self) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        for item in &self.items {
            hasher.update(item.kind.as_str().as_bytes());
            hasher.update(&[0]);
            hasher.update(item.id.as_bytes());
            hasher.update(&[0]);
            hasher.update(item.content_hash.as_bytes());
        }
        ContentHash::from_blake3(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(id: &str, kind: SyncKind, content: &[u8], at: DateTime<Utc>) -> SyncItem {
        SyncItem::new(id, kind, Some(format!("{id}.bin")), ContentHash::of(content), at, "BOOTH-X")
    }

    #[test]
    fn test_upsert_keeps_items_unique_and_sorted() {
        let now = Utc::now();
        let mut manifest = SyncManifest::new("BOOTH-X");
        manifest.upsert(item("b", SyncKind::Setting, b"1", now));
        manifest.upsert(item("a", SyncKind::Template, b"1", now));
        let previous = manifest.upsert(item("b", SyncKind::Setting, b"2", now));

        assert_eq!(manifest.len(), 2);
        assert_eq!(previous.unwrap().content_hash, ContentHash::of(b"1"));
        assert_eq!(manifest.items()[0].id, "a");
        assert_eq!(
            manifest.get_item(SyncKind::Setting, "b").unwrap().content_hash,
            ContentHash::of(b"2")
        );
    }

    #[test]
    fn test_same_id_different_kind_are_distinct() {
        let now = Utc::now();
        let mut manifest = SyncManifest::new("BOOTH-X");
        manifest.upsert(item("x", SyncKind::Template, b"1", now));
        manifest.upsert(item("x", SyncKind::Asset, b"1", now));
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn test_json_wire_format() {
        let mut manifest = SyncManifest::new("BOOTH-X");
        manifest.upsert(item("tpl1", SyncKind::Template, b"A", Utc::now()));

        let bytes = manifest.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        for field in ["version", "boothId", "lastModified", "modifiedBy", "items"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }

        let parsed = SyncManifest::from_json(&bytes).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_duplicates_keep_newest() {
        let now = Utc::now();
        let older = item("tpl1", SyncKind::Template, b"old", now - Duration::seconds(10));
        let newer = item("tpl1", SyncKind::Template, b"new", now);
        let raw = serde_json::json!({
            "version": 1,
            "boothId": "REMOTE",
            "lastModified": now,
            "modifiedBy": "BOOTH-Y",
            "items": [newer, older],
        });

        let manifest = SyncManifest::from_json(raw.to_string().as_bytes()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.items()[0].content_hash, ContentHash::of(b"new"));
        assert!(manifest.is_remote());
    }

    #[test]
    fn test_rejects_future_version_and_garbage() {
        let raw = serde_json::json!({
            "version": 99,
            "boothId": "REMOTE",
            "lastModified": Utc::now(),
            "modifiedBy": "x",
            "items": [],
        });
        assert!(matches!(
            SyncManifest::from_json(raw.to_string().as_bytes()),
            Err(ManifestError::UnsupportedVersion { .. })
        ));
        assert!(SyncManifest::from_json(b"{not json").is_err());
    }

    #[test]
    fn test_fingerprint_ignores_timestamps() {
        let now = Utc::now();
        let mut a = SyncManifest::new("BOOTH-X");
        a.upsert(item("tpl1", SyncKind::Template, b"A", now));
        let mut b = SyncManifest::new("BOOTH-Y");
        b.upsert(item("tpl1", SyncKind::Template, b"A", now - Duration::hours(1)));

        assert_eq!(a.content_fingerprint(), b.content_fingerprint());

        b.upsert(item("tpl1", SyncKind::Template, b"B", now));
        assert_ne!(a.content_fingerprint(), b.content_fingerprint());
    }
}
