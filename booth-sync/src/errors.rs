//! Error types for sync operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] booth_store::StoreError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] booth_manifest::ManifestError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync already in progress")]
    AlreadySyncing,

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Transfer failed for {item}: {reason}")]
    TransferFailed { item: String, reason: String },

    #[error("Content hash mismatch for {item}: expected {expected}, got {actual}")]
    HashMismatch {
        item: String,
        expected: String,
        actual: String,
    },

    #[error("Local artifact missing: {0}")]
    ArtifactMissing(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("No pending conflict for {0}")]
    ConflictNotFound(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
