//! Sync lifecycle events and run results

use booth_manifest::{SyncItem, SyncKind};
use serde::Serialize;

use crate::executor::KindOutcome;

/// Summary of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub templates_synced: usize,
    pub settings_synced: usize,
    /// Event definitions, carried as database records of the events table
    pub events_synced: usize,
    pub database_items_synced: usize,
    pub assets_synced: usize,
    pub uploaded: usize,
    pub downloaded: usize,
    pub conflicts: usize,
    pub success: bool,
    pub message: String,
    pub errors: Vec<String>,
}

impl SyncResult {
    /// Result of a request rejected because a run is already active
    pub fn already_syncing() -> Self {
        Self {
            success: false,
            message: "already syncing".to_string(),
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            success: false,
            message: "sync is disabled".to_string(),
            ..Default::default()
        }
    }

    /// Fold the settled transfers of one kind into the counters
    pub fn record(&mut self, outcome: &KindOutcome) {
        self.uploaded += outcome.uploaded.len();
        self.downloaded += outcome.downloaded.len();
        for item in outcome.uploaded.iter().chain(&outcome.downloaded) {
            self.count_item(item);
        }
        self.errors
            .extend(outcome.failures.iter().map(|failure| failure.to_string()));
    }

    fn count_item(&mut self, item: &SyncItem) {
        match item.kind {
            SyncKind::Template => self.templates_synced += 1,
            SyncKind::Setting => self.settings_synced += 1,
            SyncKind::Database if item.is_event_record() => self.events_synced += 1,
            SyncKind::Database => self.database_items_synced += 1,
            SyncKind::Asset => self.assets_synced += 1,
        }
    }

    pub fn total_synced(&self) -> usize {
        self.uploaded + self.downloaded
    }
}

/// Lifecycle notifications of the orchestrator.
///
/// Per run: `Started`, any number of `Progress`, one `ConflictDetected`
/// per conflicting item, then exactly one of `Completed` or `Error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SyncEvent {
    Started {
        booth_id: String,
    },
    Progress {
        message: String,
        percent: u8,
    },
    ConflictDetected {
        item_id: String,
        local: SyncItem,
        remote: SyncItem,
    },
    Completed(SyncResult),
    Error {
        message: String,
    },
}

impl SyncEvent {
    pub fn progress(message: impl Into<String>, percent: u8) -> Self {
        SyncEvent::Progress {
            message: message.into(),
            percent: percent.min(100),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncEvent::Completed(_) | SyncEvent::Error { .. })
    }
}
