use anyhow::{Context, Result};
use booth_manifest::{SyncKind, SyncManifest};
use booth_store::{FsObjectStore, ManifestStore};
use booth_sync::{FsArtifactProvider, JsonRecordRepository, Settings, SyncOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A configured booth: settings plus the orchestrator wired over them
pub struct App {
    pub dir: PathBuf,
    pub settings: Settings,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl App {
    /// Open the booth configured in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let settings = load_settings(dir)?;
        let orchestrator = Arc::new(build_orchestrator(dir, &settings));
        Ok(Self {
            dir: dir.to_path_buf(),
            settings,
            orchestrator,
        })
    }

    /// The last persisted local manifest, if any sync has run
    pub fn local_manifest(&self) -> Result<Option<SyncManifest>> {
        let path = Settings::local_manifest_path(&self.dir);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read local manifest: {}", path.display()))?;
        let manifest = SyncManifest::from_json(&bytes)
            .with_context(|| format!("Failed to parse local manifest: {}", path.display()))?;
        Ok(Some(manifest))
    }
}

pub fn load_settings(dir: &Path) -> Result<Settings> {
    if !Settings::settings_path(dir).exists() {
        anyhow::bail!(
            "No booth configured in {}; run `boothsync init` first",
            dir.display()
        );
    }
    Settings::load(dir).with_context(|| format!("Failed to load settings from {}", dir.display()))
}

/// Wire the filesystem store, repository and provider into an orchestrator
pub fn build_orchestrator(dir: &Path, settings: &Settings) -> SyncOrchestrator {
    let store = Arc::new(FsObjectStore::new(&settings.sync_root));
    let repository = Arc::new(JsonRecordRepository::new(
        settings.data_root.join(SyncKind::Database.dir_name()),
    ));
    let provider = Arc::new(FsArtifactProvider::new(&settings.data_root, repository));
    let manifests = ManifestStore::new(
        Settings::local_manifest_path(dir),
        settings.booth_id.clone(),
        store,
    );
    SyncOrchestrator::new(settings.sync.clone(), manifests, provider)
}
