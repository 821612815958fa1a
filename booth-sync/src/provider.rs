//! Local artifact provider: where a booth's synchronizable artifacts live on disk

use async_trait::async_trait;
use booth_manifest::{ItemPayload, SyncItem, SyncKind};
use booth_store::write_atomic;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::errors::{Result, SyncError};
use crate::repository::RecordRepository;

/// One artifact as currently present on this booth
#[derive(Debug, Clone, PartialEq)]
pub struct LocalArtifact {
    pub id: String,
    pub kind: SyncKind,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    pub last_modified: DateTime<Utc>,
    pub payload: Option<ItemPayload>,
}

/// Read/write access to a booth's local artifacts
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    /// All artifacts of `kind` currently present locally
    async fn enumerate(&self, kind: SyncKind) -> Result<Vec<LocalArtifact>>;

    /// Current bytes of the artifact behind `item`, or `None` if it vanished
    async fn read(&self, item: &SyncItem) -> Result<Option<Vec<u8>>>;

    /// Replace the artifact behind `item` with downloaded bytes
    async fn write(&self, item: &SyncItem, bytes: &[u8]) -> Result<()>;
}

/// Artifacts laid out as `<data_root>/{templates,settings,assets}/<file>`.
///
/// Database items are not files; they are enumerated from and applied to
/// the record repository.
pub struct FsArtifactProvider {
    data_root: PathBuf,
    repository: Arc<dyn RecordRepository>,
}

impl FsArtifactProvider {
    pub fn new(data_root: impl Into<PathBuf>, repository: Arc<dyn RecordRepository>) -> Self {
        Self {
            data_root: data_root.into(),
            repository,
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn kind_dir(&self, kind: SyncKind) -> PathBuf {
        self.data_root.join(kind.dir_name())
    }

    fn artifact_path(&self, item: &SyncItem) -> Result<PathBuf> {
        let name = item.file_name.as_deref().unwrap_or(&item.id);
        if !is_safe_file_name(name) {
            return Err(SyncError::InvalidRecord(format!(
                "unsafe file name for {}: {}",
                item.key(),
                name
            )));
        }
        Ok(self.kind_dir(item.kind).join(name))
    }

    async fn enumerate_records(&self) -> Result<Vec<LocalArtifact>> {
        let records = self.repository.list().await?;
        Ok(records
            .into_iter()
            .map(|entry| LocalArtifact {
                id: entry.record.id,
                kind: SyncKind::Database,
                file_name: None,
                bytes: entry.bytes,
                last_modified: entry.last_modified,
                payload: Some(ItemPayload::Database {
                    table: entry.record.table,
                }),
            })
            .collect())
    }

    async fn enumerate_files(&self, kind: SyncKind) -> Result<Vec<LocalArtifact>> {
        let dir = self.kind_dir(kind);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("No {} directory at {}", kind, dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        let mut seen = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping non UTF-8 file name in {}", dir.display());
                continue;
            };
            if file_name.starts_with('.') || file_name.contains(".tmp.") {
                continue;
            }

            let id = file_stem(&file_name);
            if !seen.insert(id.clone()) {
                warn!("Skipping {}: another {} already uses id {}", file_name, kind, id);
                continue;
            }

            let bytes = fs::read(entry.path()).await?;
            let last_modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            artifacts.push(LocalArtifact {
                payload: Some(payload_for(kind, &id, &file_name)),
                id,
                kind,
                file_name: Some(file_name),
                bytes,
                last_modified,
            });
        }
        artifacts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(artifacts)
    }
}

#[async_trait]
impl ArtifactProvider for FsArtifactProvider {
    async fn enumerate(&self, kind: SyncKind) -> Result<Vec<LocalArtifact>> {
        let artifacts = match kind {
            SyncKind::Database => self.enumerate_records().await?,
            kind => self.enumerate_files(kind).await?,
        };
        debug!("Found {} local {} artifacts", artifacts.len(), kind);
        Ok(artifacts)
    }

    async fn read(&self, item: &SyncItem) -> Result<Option<Vec<u8>>> {
        if item.kind == SyncKind::Database {
            return self.repository.get(&item.id).await;
        }
        match fs::read(self.artifact_path(item)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, item: &SyncItem, bytes: &[u8]) -> Result<()> {
        if item.kind == SyncKind::Database {
            self.repository.upsert(&item.id, bytes).await?;
            return Ok(());
        }
        let path = self.artifact_path(item)?;
        write_atomic(&path, bytes).await?;
        debug!("Wrote {} ({} bytes) to {}", item.key(), bytes.len(), path.display());
        Ok(())
    }
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}

fn payload_for(kind: SyncKind, id: &str, file_name: &str) -> ItemPayload {
    match kind {
        SyncKind::Template => ItemPayload::Template {
            name: id.to_string(),
        },
        SyncKind::Setting => ItemPayload::Setting {
            key: id.to_string(),
        },
        SyncKind::Database => ItemPayload::Database {
            table: String::new(),
        },
        SyncKind::Asset => ItemPayload::Asset {
            media_type: media_type_for(file_name).to_string(),
        },
    }
}

fn media_type_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        _ => "application/octet-stream",
    }
}
