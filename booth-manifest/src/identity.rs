//! Booth identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{ManifestError, Result};

const PREFIX: &str = "BOOTH-";

/// Stable identifier of one booth, formatted `BOOTH-<machine>-<random>`.
///
/// Generated once on first run and persisted by the settings layer; used as
/// `modifiedBy` on everything this booth writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoothId(String);

impl BoothId {
    /// Generate a new id for this machine
    pub fn generate() -> Self {
        Self::generate_for(&whoami::devicename())
    }

    /// Generate a new id for the named machine
    pub fn generate_for(machine: &str) -> Self {
        let machine: String = machine
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        let machine = if machine.is_empty() {
            "UNKNOWN".to_string()
        } else {
            machine
        };
        let random = uuid::Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase();
        Self(format!("{PREFIX}{machine}-{random}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoothId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BoothId {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| ManifestError::InvalidBoothId(s.to_string()))?;
        match rest.rsplit_once('-') {
            Some((machine, random)) if !machine.is_empty() && !random.is_empty() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(ManifestError::InvalidBoothId(s.to_string())),
        }
    }
}

impl TryFrom<String> for BoothId {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BoothId> for String {
    fn from(id: BoothId) -> Self {
        id.0
    }
}

impl AsRef<str> for BoothId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
