//! Structured record repository (events, templates) behind database items

use async_trait::async_trait;
use booth_store::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::{Result, SyncError};

/// One structured record as exchanged between booths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub id: String,
    pub table: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl DatabaseRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SyncError::InvalidRecord(e.to_string()))
    }
}

/// A stored record together with its exact serialized bytes
#[derive(Debug, Clone)]
pub struct RecordEntry {
    pub record: DatabaseRecord,
    pub bytes: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<RecordEntry>>;

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or update the record serialized in `bytes`
    async fn upsert(&self, id: &str, bytes: &[u8]) -> Result<DatabaseRecord>;
}

/// Stores each record as `<dir>/<id>.json`
#[derive(Debug, Clone)]
pub struct JsonRecordRepository {
    dir: PathBuf,
}

impl JsonRecordRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(SyncError::InvalidRecord(format!("unsafe record id: {id}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl RecordRepository for JsonRecordRepository {
    async fn list(&self) -> Result<Vec<RecordEntry>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let record = match DatabaseRecord::from_bytes(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable record {}: {}", path.display(), e);
                    continue;
                }
            };
            let last_modified = entry
                .metadata()
                .await?
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            records.push(RecordEntry {
                record,
                bytes,
                last_modified,
            });
        }
        records.sort_by(|a, b| a.record.id.cmp(&b.record.id));
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(id)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, id: &str, bytes: &[u8]) -> Result<DatabaseRecord> {
        let record = DatabaseRecord::from_bytes(bytes)?;
        if record.id != id {
            return Err(SyncError::InvalidRecord(format!(
                "record id {} does not match item id {}",
                record.id, id
            )));
        }
        // Stored verbatim so the content hash stays stable across booths
        write_atomic(self.path_for(id)?, bytes).await?;
        debug!("Applied record {} ({})", record.id, record.table);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(id: &str, name: &str) -> DatabaseRecord {
        DatabaseRecord {
            id: id.to_string(),
            table: "events".to_string(),
            data: serde_json::json!({ "name": name }),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_list() {
        let dir = tempdir().unwrap();
        let repo = JsonRecordRepository::new(dir.path().join("database"));
        assert!(repo.list().await.unwrap().is_empty());

        let bytes = event("evt-1", "Wedding").to_bytes().unwrap();
        repo.upsert("evt-1", &bytes).await.unwrap();
        let updated = event("evt-1", "Wedding (late)").to_bytes().unwrap();
        repo.upsert("evt-1", &updated).await.unwrap();

        let listed = repo.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record.data["name"], "Wedding (late)");
        assert_eq!(listed[0].bytes, updated);
        assert_eq!(repo.get("evt-1").await.unwrap(), Some(updated));
        assert_eq!(repo.get("evt-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_rejects_mismatch_and_garbage() {
        let dir = tempdir().unwrap();
        let repo = JsonRecordRepository::new(dir.path());

        let bytes = event("evt-1", "x").to_bytes().unwrap();
        assert!(matches!(
            repo.upsert("evt-2", &bytes).await,
            Err(SyncError::InvalidRecord(_))
        ));
        assert!(repo.upsert("evt-1", b"not json").await.is_err());
        assert!(repo.upsert("../evil", &bytes).await.is_err());
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        let repo = JsonRecordRepository::new(dir.path());
        repo.upsert("evt-1", &event("evt-1", "ok").to_bytes().unwrap())
            .await
            .unwrap();
        fs::write(dir.path().join("broken.json"), b"{").await.unwrap();

        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
