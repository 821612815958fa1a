//! Synchronization engine for booth configuration artifacts
//!
//! This crate reconciles a booth's local manifest with the shared one:
//! - Local state refresh from the artifact provider
//! - Manifest reconciliation into a sync plan
//! - Policy-driven conflict resolution
//! - Concurrent, per-item fault tolerant transfers
//! - Orchestration with single-run exclusion and lifecycle events

pub mod config;
pub mod conflict;
pub mod errors;
pub mod events;
pub mod executor;
pub mod local;
pub mod orchestrator;
pub mod provider;
pub mod reconcile;
pub mod repository;

pub use config::{Settings, SyncConfiguration};
pub use conflict::{ConflictPolicy, ConflictResolver, Resolution};
pub use errors::{Result, SyncError};
pub use events::{SyncEvent, SyncResult};
pub use executor::{KindOutcome, TransferDirection, TransferExecutor, TransferFailure};
pub use local::{refresh_local_manifest, LocalRefresh};
pub use orchestrator::{auto_sync_due, ConflictChoice, SyncOrchestrator, SyncStatus};
pub use provider::{ArtifactProvider, FsArtifactProvider, LocalArtifact};
pub use reconcile::{Conflict, Reconciler, SyncPlan};
pub use repository::{DatabaseRecord, JsonRecordRepository, RecordEntry, RecordRepository};
