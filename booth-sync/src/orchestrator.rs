//! Sync orchestrator
//!
//! Owns the one-run-at-a-time guard and sequences a run: refresh the local
//! manifest, fetch the shared one, reconcile, transfer per enabled kind, then
//! persist and publish. Lifecycle events go out on a broadcast channel.

use booth_manifest::{BoothId, ItemKey, SyncItem, SyncKind, SyncManifest};
use booth_store::{ManifestStore, RemoteOrigin};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfiguration;
use crate::conflict::ConflictResolver;
use crate::errors::{Result, SyncError};
use crate::events::{SyncEvent, SyncResult};
use crate::executor::TransferExecutor;
use crate::local::refresh_local_manifest;
use crate::provider::ArtifactProvider;
use crate::reconcile::{Conflict, Reconciler, SyncPlan};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Operator decision for a pending conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    KeepLocal,
    KeepRemote,
}

impl FromStr for ConflictChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "keep_local" | "keep-local" => Ok(ConflictChoice::KeepLocal),
            "remote" | "keep_remote" | "keep-remote" => Ok(ConflictChoice::KeepRemote),
            other => Err(format!("expected local or remote, got {other}")),
        }
    }
}

impl fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictChoice::KeepLocal => write!(f, "local"),
            ConflictChoice::KeepRemote => write!(f, "remote"),
        }
    }
}

/// Snapshot of orchestrator state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub booth_id: String,
    pub running: bool,
    /// End of the last run that returned a result, even one with item errors
    pub last_completed_sync: Option<DateTime<Utc>>,
    /// End of the last run that finished without any errors
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub pending_conflicts: usize,
    pub last_result: Option<SyncResult>,
}

/// Whether an automatic sync is due at `now`.
///
/// Measured from the last completed run, so a round with item errors is
/// retried after the interval rather than immediately.
pub fn auto_sync_due(
    config: &SyncConfiguration,
    last_completed_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if !config.enabled || !config.auto_sync_on_start {
        return false;
    }
    match last_completed_sync {
        None => true,
        Some(last) => now - last >= config.interval(),
    }
}

struct OrchestratorState {
    config: SyncConfiguration,
    last_completed_sync: Option<DateTime<Utc>>,
    last_successful_sync: Option<DateTime<Utc>>,
    last_result: Option<SyncResult>,
    pending_conflicts: BTreeMap<ItemKey, Conflict>,
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinates sync runs for one booth.
///
/// Constructed once by the composition root and shared by handle.
pub struct SyncOrchestrator {
    booth_id: BoothId,
    manifests: ManifestStore,
    provider: Arc<dyn ArtifactProvider>,
    running: AtomicBool,
    state: RwLock<OrchestratorState>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfiguration,
        manifests: ManifestStore,
        provider: Arc<dyn ArtifactProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            booth_id: manifests.booth_id().clone(),
            manifests,
            provider,
            running: AtomicBool::new(false),
            state: RwLock::new(OrchestratorState {
                config,
                last_completed_sync: None,
                last_successful_sync: None,
                last_result: None,
                pending_conflicts: BTreeMap::new(),
            }),
            events,
        }
    }

    pub fn booth_id(&self) -> &BoothId {
        &self.booth_id
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn configuration(&self) -> SyncConfiguration {
        self.state.read().await.config.clone()
    }

    /// Replace the configuration; applies from the next run
    pub async fn update_configuration(&self, config: SyncConfiguration) -> Result<()> {
        if config.max_concurrent_transfers == 0 {
            return Err(SyncError::Config(
                "max_concurrent_transfers must be at least 1".to_string(),
            ));
        }
        info!(
            "Sync configuration updated (policy {}, interval {}s)",
            config.conflict_resolution, config.interval_secs
        );
        self.state.write().await.config = config;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> SyncStatus {
        let state = self.state.read().await;
        SyncStatus {
            booth_id: self.booth_id.to_string(),
            running: self.is_running(),
            last_completed_sync: state.last_completed_sync,
            last_successful_sync: state.last_successful_sync,
            pending_conflicts: state.pending_conflicts.len(),
            last_result: state.last_result.clone(),
        }
    }

    pub async fn pending_conflicts(&self) -> Vec<Conflict> {
        self.state
            .read()
            .await
            .pending_conflicts
            .values()
            .cloned()
            .collect()
    }

    /// Whether the external scheduler should trigger a run now
    pub async fn should_auto_sync(&self) -> bool {
        self.should_auto_sync_at(Utc::now()).await
    }

    pub async fn should_auto_sync_at(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read().await;
        auto_sync_due(&state.config, state.last_completed_sync, now)
    }

    /// Run one sync to completion
    pub async fn run_sync(&self) -> Result<SyncResult> {
        self.run_sync_with_cancel(CancellationToken::new()).await
    }

    /// Run one sync, aborting between transfers once `cancel` fires.
    ///
    /// A request made while another run is active returns immediately with
    /// a non-success result. Only cancellation and failing to persist or
    /// publish the manifests surface as `Err`; per-item failures land in
    /// [`SyncResult::errors`].
    pub async fn run_sync_with_cancel(&self, cancel: CancellationToken) -> Result<SyncResult> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            info!("Sync already in progress, ignoring request");
            return Ok(SyncResult::already_syncing());
        };

        let config = self.configuration().await;
        if !config.enabled {
            info!("Sync is disabled, skipping run");
            return Ok(SyncResult::disabled());
        }

        info!("Starting sync for booth {}", self.booth_id);
        self.emit(SyncEvent::Started {
            booth_id: self.booth_id.to_string(),
        });

        let mut conflicts = Vec::new();
        let outcome = self.execute_run(&config, &cancel, &mut conflicts).await;

        for conflict in &conflicts {
            self.emit(SyncEvent::ConflictDetected {
                item_id: conflict.local.id.clone(),
                local: conflict.local.clone(),
                remote: conflict.remote.clone(),
            });
        }

        match outcome {
            Ok(result) => {
                {
                    let mut state = self.state.write().await;
                    let finished = Utc::now();
                    state.last_completed_sync = Some(finished);
                    if result.success {
                        state.last_successful_sync = Some(finished);
                    }
                    state.last_result = Some(result.clone());
                }
                info!("Sync finished: {}", result.message);
                self.emit(SyncEvent::Completed(result.clone()));
                Ok(result)
            }
            Err(e) => {
                match &e {
                    SyncError::Cancelled => warn!("Sync cancelled"),
                    other => error!("Sync failed: {}", other),
                }
                self.emit(SyncEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute_run(
        &self,
        config: &SyncConfiguration,
        cancel: &CancellationToken,
        conflicts: &mut Vec<Conflict>,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::default();

        self.emit(SyncEvent::progress("Scanning local artifacts", 0));
        let previous = self.manifests.load_local().await;
        let refresh = refresh_local_manifest(&previous, self.provider.as_ref(), &self.booth_id).await;
        result.errors.extend(refresh.errors);

        self.emit(SyncEvent::progress("Fetching remote manifest", 5));
        let fetched = self.manifests.fetch_remote().await;
        if fetched.origin == RemoteOrigin::Unreachable {
            result
                .errors
                .push(format!("remote manifest unreachable at {}", self.manifests.object_store().describe()));
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let plan = self.plan(config, &refresh.manifest, &fetched.manifest).await;
        *conflicts = plan.conflicts.clone();

        self.emit(SyncEvent::progress(
            format!(
                "Planned {} uploads, {} downloads, {} conflicts",
                plan.to_upload.len(),
                plan.to_download.len(),
                plan.conflicts.len()
            ),
            10,
        ));

        let executor = TransferExecutor::new(
            self.manifests.object_store().clone(),
            self.provider.clone(),
            self.booth_id.clone(),
            config.max_concurrent_transfers,
        );

        let mut local = refresh.manifest;
        let mut remote = fetched.manifest.clone();
        let kinds = config.enabled_kinds();
        for (index, kind) in kinds.iter().copied().enumerate() {
            let uploads = plan.uploads_of(kind);
            let downloads = plan.downloads_of(kind);
            if !uploads.is_empty() || !downloads.is_empty() {
                let outcome = executor.execute(kind, &uploads, &downloads, cancel).await?;
                debug!(
                    "{}: {} uploaded, {} downloaded, {} failed",
                    kind,
                    outcome.uploaded.len(),
                    outcome.downloaded.len(),
                    outcome.failures.len()
                );
                for item in &outcome.downloaded {
                    local.upsert(item.clone());
                }
                for item in &outcome.uploaded {
                    local.upsert(item.clone());
                    remote.upsert(item.clone());
                }
                result.record(&outcome);
            }
            let percent = 10 + 80 * (index + 1) / kinds.len();
            self.emit(SyncEvent::progress(format!("Synced {}", kind.dir_name()), percent as u8));
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let now = Utc::now();
        if local.content_fingerprint() != previous.content_fingerprint() {
            local.mark_modified(self.booth_id.as_str(), now);
        }
        self.manifests.persist_local(&local).await?;

        let remote_changed = remote.content_fingerprint() != fetched.manifest.content_fingerprint();
        match fetched.origin {
            RemoteOrigin::Unreachable => {
                warn!("Remote manifest was unreachable, not publishing this round");
            }
            RemoteOrigin::Published if !remote_changed => {
                debug!("Remote manifest unchanged, nothing to publish");
            }
            _ => {
                self.emit(SyncEvent::progress("Publishing manifest", 95));
                if remote_changed {
                    remote.mark_modified(self.booth_id.as_str(), now);
                }
                self.manifests.publish_remote(&remote).await?;
            }
        }

        result.conflicts = plan.conflicts.len();
        result.success = result.errors.is_empty();
        result.message = summarize(&result);
        self.emit(SyncEvent::progress("Sync complete", 100));
        Ok(result)
    }

    /// Compute the plan a run would execute without transferring anything.
    ///
    /// Refreshes the pending conflict list as a side effect; nothing is
    /// persisted or published.
    pub async fn preview(&self) -> Result<SyncPlan> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            return Err(SyncError::AlreadySyncing);
        };
        let config = self.configuration().await;
        let previous = self.manifests.load_local().await;
        let refresh = refresh_local_manifest(&previous, self.provider.as_ref(), &self.booth_id).await;
        let fetched = self.manifests.fetch_remote().await;
        Ok(self.plan(&config, &refresh.manifest, &fetched.manifest).await)
    }

    async fn plan(
        &self,
        config: &SyncConfiguration,
        local: &SyncManifest,
        remote: &SyncManifest,
    ) -> SyncPlan {
        let reconciler = Reconciler::new(ConflictResolver::new(config.conflict_resolution));
        let mut plan = reconciler.compare(local, remote);
        retain_enabled(&mut plan, config);
        self.state.write().await.pending_conflicts = plan
            .conflicts
            .iter()
            .map(|conflict| (conflict.key(), conflict.clone()))
            .collect();
        plan
    }

    /// Settle one pending conflict with the operator's choice.
    ///
    /// Keeping the local version uploads it and republishes the shared
    /// manifest; keeping the remote one downloads and applies it.
    pub async fn resolve_conflict(
        &self,
        kind: SyncKind,
        id: &str,
        choice: ConflictChoice,
    ) -> Result<SyncResult> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            return Err(SyncError::AlreadySyncing);
        };

        let key = ItemKey::new(kind, id);
        let (conflict, config) = {
            let state = self.state.read().await;
            let conflict = state
                .pending_conflicts
                .get(&key)
                .cloned()
                .ok_or_else(|| SyncError::ConflictNotFound(key.to_string()))?;
            (conflict, state.config.clone())
        };

        info!("Resolving conflict on {} by keeping the {} version", key, choice);
        self.emit(SyncEvent::Started {
            booth_id: self.booth_id.to_string(),
        });

        match self.apply_resolution(&conflict, choice, &config).await {
            Ok(result) => {
                {
                    let mut state = self.state.write().await;
                    state.pending_conflicts.remove(&key);
                    state.last_result = Some(result.clone());
                }
                self.emit(SyncEvent::Completed(result.clone()));
                Ok(result)
            }
            Err(e) => {
                error!("Failed to resolve conflict on {}: {}", key, e);
                self.emit(SyncEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn apply_resolution(
        &self,
        conflict: &Conflict,
        choice: ConflictChoice,
        config: &SyncConfiguration,
    ) -> Result<SyncResult> {
        let executor = TransferExecutor::new(
            self.manifests.object_store().clone(),
            self.provider.clone(),
            self.booth_id.clone(),
            config.max_concurrent_transfers,
        );
        let mut local = self.manifests.load_local().await;
        let mut result = SyncResult::default();
        let now = Utc::now();

        let item: SyncItem = match choice {
            ConflictChoice::KeepLocal => {
                let fetched = self.manifests.fetch_remote().await;
                if fetched.origin == RemoteOrigin::Unreachable {
                    return Err(SyncError::TransferFailed {
                        item: conflict.key().to_string(),
                        reason: "remote manifest unreachable".to_string(),
                    });
                }
                let uploaded = executor.upload(&conflict.local).await?;
                let mut remote = fetched.manifest;
                remote.upsert(uploaded.clone());
                remote.mark_modified(self.booth_id.as_str(), now);
                local.upsert(uploaded.clone());
                local.mark_modified(self.booth_id.as_str(), now);
                self.manifests.persist_local(&local).await?;
                self.manifests.publish_remote(&remote).await?;
                result.uploaded = 1;
                uploaded
            }
            ConflictChoice::KeepRemote => {
                let downloaded = executor.download(&conflict.remote).await?;
                local.upsert(downloaded.clone());
                local.mark_modified(self.booth_id.as_str(), now);
                self.manifests.persist_local(&local).await?;
                result.downloaded = 1;
                downloaded
            }
        };

        match item.kind {
            SyncKind::Template => result.templates_synced = 1,
            SyncKind::Setting => result.settings_synced = 1,
            SyncKind::Database if item.is_event_record() => result.events_synced = 1,
            SyncKind::Database => result.database_items_synced = 1,
            SyncKind::Asset => result.assets_synced = 1,
        }
        result.success = true;
        result.message = format!("Resolved {} with the {} version", item.key(), choice);
        Ok(result)
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Drop plan entries for kinds (or event records) that are switched off
fn retain_enabled(plan: &mut SyncPlan, config: &SyncConfiguration) {
    plan.to_upload.retain(|item| config.is_item_enabled(item));
    plan.to_download.retain(|item| config.is_item_enabled(item));
    plan.conflicts
        .retain(|conflict| config.is_item_enabled(&conflict.local) || config.is_item_enabled(&conflict.remote));
}

fn summarize(result: &SyncResult) -> String {
    let mut message = format!(
        "{} uploaded, {} downloaded, {} conflicts",
        result.uploaded, result.downloaded, result.conflicts
    );
    if !result.errors.is_empty() {
        message.push_str(&format!(", {} errors", result.errors.len()));
    }
    message
}
