use std::path::{Path, PathBuf};
use std::sync::Arc;

use boothsync::manifest::{BoothId, SyncKind, SyncManifest};
use boothsync::store::{FsObjectStore, ManifestStore, MANIFEST_KEY};
use boothsync::sync::{
    FsArtifactProvider, JsonRecordRepository, RecordRepository, SyncConfiguration, SyncOrchestrator,
};
use tempfile::TempDir;

/// A shared folder standing in for the cloud bucket
pub struct Bucket {
    pub dir: TempDir,
}

impl Bucket {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        FsObjectStore::create(dir.path()).await.unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn manifest(&self) -> SyncManifest {
        let bytes = std::fs::read(self.path().join(MANIFEST_KEY)).unwrap();
        SyncManifest::from_json(&bytes).unwrap()
    }
}

/// One booth with its own application and data directories
pub struct TestBooth {
    pub id: BoothId,
    pub home: TempDir,
    pub repository: Arc<JsonRecordRepository>,
    pub orchestrator: SyncOrchestrator,
}

impl TestBooth {
    pub fn new(name: &str, bucket: &Bucket, config: SyncConfiguration) -> Self {
        let home = TempDir::new().unwrap();
        let id = BoothId::generate_for(name);
        let data = home.path().join("data");
        let repository = Arc::new(JsonRecordRepository::new(data.join("database")));
        let provider = Arc::new(FsArtifactProvider::new(&data, repository.clone()));
        let manifests = ManifestStore::new(
            home.path().join("sync-manifest.json"),
            id.clone(),
            Arc::new(FsObjectStore::new(bucket.path())),
        );
        let orchestrator = SyncOrchestrator::new(config, manifests, provider);
        Self {
            id,
            home,
            repository,
            orchestrator,
        }
    }

    pub fn artifact_path(&self, kind: SyncKind, file_name: &str) -> PathBuf {
        self.home.path().join("data").join(kind.dir_name()).join(file_name)
    }

    pub fn write(&self, kind: SyncKind, file_name: &str, bytes: &[u8]) {
        let path = self.artifact_path(kind, file_name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    pub fn read(&self, kind: SyncKind, file_name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.artifact_path(kind, file_name)).ok()
    }

    pub async fn record_names(&self) -> Vec<String> {
        self.repository
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.record.data["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

/// Give file modification times a clear gap from earlier writes
pub async fn tick() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
