use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    #[error("Unsupported manifest version: expected at most {supported}, got {actual}")]
    UnsupportedVersion { supported: u32, actual: u32 },

    #[error("Invalid booth id: {0}")]
    InvalidBoothId(String),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
