//! Sync configuration and persisted application settings

use booth_manifest::{BoothId, SyncItem, SyncKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::conflict::ConflictPolicy;
use crate::errors::{Result, SyncError};

const APP_DIR: &str = "boothsync";
const SETTINGS_FILE: &str = "settings.toml";
const LOCAL_MANIFEST_FILE: &str = "sync-manifest.json";

/// Process-wide sync behaviour.
///
/// Only changed through explicit configuration updates, never by a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfiguration {
    pub enabled: bool,
    /// Minimum seconds between automatic syncs
    #[serde(rename = "interval")]
    pub interval_secs: u64,
    pub sync_templates: bool,
    pub sync_settings: bool,
    pub sync_events: bool,
    pub sync_database: bool,
    pub sync_assets: bool,
    pub conflict_resolution: ConflictPolicy,
    pub auto_sync_on_start: bool,
    pub max_concurrent_transfers: usize,
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            sync_templates: true,
            sync_settings: true,
            sync_events: true,
            sync_database: true,
            sync_assets: true,
            conflict_resolution: ConflictPolicy::NewestWins,
            auto_sync_on_start: true,
            max_concurrent_transfers: 4,
        }
    }
}

impl SyncConfiguration {
    /// Time between automatic runs; saturates for intervals chrono cannot represent
    pub fn interval(&self) -> chrono::Duration {
        i64::try_from(self.interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Whether any item of `kind` can be synced.
    ///
    /// Event definitions are database records, so the database kind is
    /// enabled by either the events or the database flag.
    pub fn is_kind_enabled(&self, kind: SyncKind) -> bool {
        match kind {
            SyncKind::Template => self.sync_templates,
            SyncKind::Setting => self.sync_settings,
            SyncKind::Database => self.sync_events || self.sync_database,
            SyncKind::Asset => self.sync_assets,
        }
    }

    pub fn is_item_enabled(&self, item: &SyncItem) -> bool {
        match item.kind {
            SyncKind::Database if item.is_event_record() => self.sync_events,
            SyncKind::Database => self.sync_database,
            kind => self.is_kind_enabled(kind),
        }
    }

    pub fn enabled_kinds(&self) -> Vec<SyncKind> {
        SyncKind::ALL
            .into_iter()
            .filter(|kind| self.is_kind_enabled(*kind))
            .collect()
    }

    /// Set one option by its settings-file name
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "enabled" => self.enabled = parse_bool(key, value)?,
            "interval" => self.interval_secs = parse_number(key, value)?,
            "sync_templates" | "templates" => self.sync_templates = parse_bool(key, value)?,
            "sync_settings" | "settings" => self.sync_settings = parse_bool(key, value)?,
            "sync_events" | "events" => self.sync_events = parse_bool(key, value)?,
            "sync_database" | "database" => self.sync_database = parse_bool(key, value)?,
            "sync_assets" | "assets" => self.sync_assets = parse_bool(key, value)?,
            "conflict_resolution" => {
                self.conflict_resolution = value.parse().map_err(SyncError::Config)?
            }
            "auto_sync_on_start" => self.auto_sync_on_start = parse_bool(key, value)?,
            "max_concurrent_transfers" => {
                let n: usize = parse_number(key, value)?;
                if n == 0 {
                    return Err(SyncError::Config(
                        "max_concurrent_transfers must be at least 1".to_string(),
                    ));
                }
                self.max_concurrent_transfers = n;
            }
            other => return Err(SyncError::Config(format!("unknown option: {other}"))),
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(SyncError::Config(format!("{key} expects a boolean, got {value}"))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| SyncError::Config(format!("{key} expects a number, got {value}")))
}

/// Persisted application settings of one booth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub booth_id: BoothId,
    /// Root of the shared object store (mounted bucket or shared folder)
    pub sync_root: PathBuf,
    /// Root of this booth's local artifacts
    pub data_root: PathBuf,
    #[serde(default)]
    pub sync: SyncConfiguration,
}

impl Settings {
    /// Per-user application directory
    pub fn default_dir() -> Result<PathBuf> {
        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| SyncError::Config("no application data directory found".to_string()))?;
        Ok(base.join(APP_DIR))
    }

    pub fn settings_path(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE)
    }

    /// Fixed location of the local manifest inside the application directory
    pub fn local_manifest_path(dir: &Path) -> PathBuf {
        dir.join(LOCAL_MANIFEST_FILE)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::settings_path(dir);
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("failed to serialize settings: {e}")))?;
        std::fs::write(Self::settings_path(dir), content)?;
        Ok(())
    }

    /// Load settings, generating and persisting a booth id on first run
    pub fn load_or_init(dir: &Path) -> Result<Self> {
        if Self::settings_path(dir).exists() {
            return Self::load(dir);
        }

        let settings = Self {
            booth_id: BoothId::generate(),
            sync_root: dir.join("bucket"),
            data_root: dir.join("data"),
            sync: SyncConfiguration::default(),
        };
        settings.save(dir)?;
        info!("Initialized booth {} in {}", settings.booth_id, dir.display());
        Ok(settings)
    }
}
