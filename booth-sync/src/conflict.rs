//! Conflict resolution between divergent versions of one item

use booth_manifest::SyncItem;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy applied when local and remote hashes differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Larger `lastModified` wins; an exact tie is left to the operator
    NewestWins,
    /// This booth is authoritative
    LocalWins,
    /// The shared copy is authoritative
    RemoteWins,
    /// Every divergence is surfaced as a conflict
    Manual,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictPolicy::NewestWins => "newest_wins",
            ConflictPolicy::LocalWins => "local_wins",
            ConflictPolicy::RemoteWins => "remote_wins",
            ConflictPolicy::Manual => "manual",
        })
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "newest_wins" | "newest" => Ok(ConflictPolicy::NewestWins),
            "local_wins" | "local" => Ok(ConflictPolicy::LocalWins),
            "remote_wins" | "remote" => Ok(ConflictPolicy::RemoteWins),
            "manual" => Ok(ConflictPolicy::Manual),
            other => Err(format!("unknown conflict resolution mode: {other}")),
        }
    }
}

/// Verdict for one divergent item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    UseLocal,
    UseRemote,
    Manual,
}

/// Decide which version of an item wins.
///
/// Looks only at `lastModified` and the policy, never at content.
pub fn decide(local: &SyncItem, remote: &SyncItem, policy: ConflictPolicy) -> Resolution {
    match policy {
        ConflictPolicy::LocalWins => Resolution::UseLocal,
        ConflictPolicy::RemoteWins => Resolution::UseRemote,
        ConflictPolicy::Manual => Resolution::Manual,
        ConflictPolicy::NewestWins => match local.last_modified.cmp(&remote.last_modified) {
            std::cmp::Ordering::Greater => Resolution::UseLocal,
            std::cmp::Ordering::Less => Resolution::UseRemote,
            std::cmp::Ordering::Equal => Resolution::Manual,
        },
    }
}

/// Conflict resolver bound to one policy
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn decide(&self, local: &SyncItem, remote: &SyncItem) -> Resolution {
        decide(local, remote, self.policy)
    }
}
