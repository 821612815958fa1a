use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    Manifest(#[from] booth_manifest::ManifestError),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("Upload failed for {key}: {reason}")]
    UploadFailed { key: String, reason: String },

    #[error("Download failed for {key}: {reason}")]
    DownloadFailed { key: String, reason: String },

    #[error("Atomic write failed: {0}")]
    AtomicWriteFailed(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
