//! Sync items: one synchronizable artifact tracked by kind and id

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::hash::ContentHash;

/// Table name of event definitions inside the record repository
pub const EVENTS_TABLE: &str = "events";

/// Category of a synchronizable artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SyncKind {
    Template,
    Setting,
    Database,
    Asset,
}

impl SyncKind {
    /// All kinds, in the order a sync run processes them
    pub const ALL: [SyncKind; 4] = [
        SyncKind::Template,
        SyncKind::Setting,
        SyncKind::Database,
        SyncKind::Asset,
    ];

    /// Fixed prefix of this kind under the shared sync root
    pub fn remote_prefix(&self) -> &'static str {
        match self {
            SyncKind::Template => "templates/",
            SyncKind::Setting => "settings/",
            SyncKind::Database => "database/",
            SyncKind::Asset => "assets/",
        }
    }

    /// Directory name of this kind under a local data root
    pub fn dir_name(&self) -> &'static str {
        self.remote_prefix().trim_end_matches('/')
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Template => "template",
            SyncKind::Setting => "setting",
            SyncKind::Database => "database",
            SyncKind::Asset => "asset",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "template" | "templates" => Ok(SyncKind::Template),
            "setting" | "settings" => Ok(SyncKind::Setting),
            "database" | "db" => Ok(SyncKind::Database),
            "asset" | "assets" => Ok(SyncKind::Asset),
            other => Err(format!("unknown sync kind: {other}")),
        }
    }
}

/// Kind-specific metadata carried alongside an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ItemPayload {
    Template { name: String },
    Setting { key: String },
    Database { table: String },
    Asset { media_type: String },
}

/// Identity of an item: unique `id` within its `kind`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub kind: SyncKind,
    pub id: String,
}

impl ItemKey {
    pub fn new(kind: SyncKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// One synchronizable artifact as recorded in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub id: String,
    pub kind: SyncKind,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(rename = "hash")]
    pub content_hash: ContentHash,
    pub last_modified: DateTime<Utc>,
    pub modified_by: String,
    pub remote_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ItemPayload>,
}

impl SyncItem {
    /// Create an item, deriving its remote path from kind and name
    pub fn new(
        id: impl Into<String>,
        kind: SyncKind,
        file_name: Option<String>,
        content_hash: ContentHash,
        last_modified: DateTime<Utc>,
        modified_by: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let remote_path = remote_path_for(kind, &id, file_name.as_deref());
        Self {
            id,
            kind,
            file_name,
            content_hash,
            last_modified,
            modified_by: modified_by.into(),
            remote_path,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: ItemPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.kind, self.id.clone())
    }

    /// Whether this is an event definition stored as a database record
    pub fn is_event_record(&self) -> bool {
        matches!(&self.payload, Some(ItemPayload::Database { table }) if table == EVENTS_TABLE)
    }
}

/// Canonical object-store key of an item.
///
/// Byte-oriented items live at `<prefix><fileName>`; records without a file
/// name are stored as `<prefix><id>.json`.
pub fn remote_path_for(kind: SyncKind, id: &str, file_name: Option<&str>) -> String {
    match file_name {
        Some(name) if !name.is_empty() => format!("{}{}", kind.remote_prefix(), name),
        _ => format!("{}{}.json", kind.remote_prefix(), id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path_is_deterministic() {
        assert_eq!(
            remote_path_for(SyncKind::Template, "tpl1", Some("tpl1.xml")),
            "templates/tpl1.xml"
        );
        assert_eq!(
            remote_path_for(SyncKind::Database, "evt-7", None),
            "database/evt-7.json"
        );
        assert_eq!(
            remote_path_for(SyncKind::Setting, "printer", Some("")),
            "settings/printer.json"
        );
    }

    #[test]
    fn test_item_serializes_wire_field_names() {
        let item = SyncItem::new(
            "tpl1",
            SyncKind::Template,
            Some("tpl1.xml".to_string()),
            ContentHash::of(b"A"),
            Utc::now(),
            "BOOTH-X",
        );
        let value = serde_json::to_value(&item).unwrap();

        for field in ["id", "kind", "fileName", "hash", "lastModified", "modifiedBy", "remotePath"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["kind"], "Template");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn test_event_record_detection() {
        let item = SyncItem::new(
            "evt-1",
            SyncKind::Database,
            None,
            ContentHash::of(b"{}"),
            Utc::now(),
            "BOOTH-X",
        )
        .with_payload(ItemPayload::Database {
            table: EVENTS_TABLE.to_string(),
        });
        assert!(item.is_event_record());

        let other = item.clone().with_payload(ItemPayload::Database {
            table: "templates".to_string(),
        });
        assert!(!other.is_event_record());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Templates".parse::<SyncKind>().unwrap(), SyncKind::Template);
        assert_eq!("db".parse::<SyncKind>().unwrap(), SyncKind::Database);
        assert!("video".parse::<SyncKind>().is_err());
    }
}
