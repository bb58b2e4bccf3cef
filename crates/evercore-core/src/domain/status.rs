//! Per-run outcome types: progress counters, failure lists, and the
//! top-level `SyncResult`.
//!
//! Shapes are grounded directly in the original `ISyncStats`,
//! `IDownloadNotesStatus`, `IDownloadResourcesStatus`, `ISyncResult` and
//! `Errors` interfaces, translated from virtual-interface + builder to plain
//! records.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ids::{Guid, Usn};
use super::sync_state::SyncState;

/// Mutually exclusive reason the outer loop must pause or re-authenticate.
/// Never an exception: a domain enum the caller matches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StopSynchronizationError {
    RateLimitReached { seconds_to_wait: Option<i32> },
    AuthenticationExpired,
}

impl StopSynchronizationError {
    #[must_use]
    pub fn rate_limit(seconds_to_wait: Option<i32>) -> Self {
        Self::RateLimitReached { seconds_to_wait }
    }

    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitReached { .. })
    }

    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthenticationExpired)
    }

    #[must_use]
    pub fn seconds_to_wait(&self) -> Option<i32> {
        match self {
            Self::RateLimitReached { seconds_to_wait } => *seconds_to_wait,
            Self::AuthenticationExpired => None,
        }
    }
}

/// A single item that failed, paired with a human-readable reason (the
/// carrier-error-kind replacement for "raise and re-throw from clone()").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem<T> {
    pub item: T,
    pub reason: String,
}

/// Observable progress per category for one chunk-application run.
/// Monotonic across a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncChunksDataCounters {
    pub total_notebooks: u64,
    pub added_notebooks: u64,
    pub updated_notebooks: u64,
    pub expunged_notebooks: u64,

    pub total_tags: u64,
    pub added_tags: u64,
    pub updated_tags: u64,
    pub expunged_tags: u64,

    pub total_saved_searches: u64,
    pub added_saved_searches: u64,
    pub updated_saved_searches: u64,
    pub expunged_saved_searches: u64,

    pub total_notes: u64,
    pub added_notes: u64,
    pub updated_notes: u64,
    pub expunged_notes: u64,

    pub total_resources: u64,
    pub added_resources: u64,
    pub updated_resources: u64,
    pub expunged_resources: u64,

    pub total_linked_notebooks: u64,
    pub added_linked_notebooks: u64,
    pub updated_linked_notebooks: u64,
    pub expunged_linked_notebooks: u64,
}

/// Outcome of the note-download half of a download round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadNotesStatus {
    pub total_new_notes: u64,
    pub total_updated_notes: u64,
    pub total_expunged_notes: u64,
    pub notes_which_failed_to_download: Vec<FailedItem<Guid>>,
    pub notes_which_failed_to_process: Vec<FailedItem<Guid>>,
    pub note_guids_which_failed_to_expunge: Vec<FailedItem<Guid>>,
    pub processed_note_guids_and_usns: HashMap<Guid, Usn>,
    pub cancelled_note_guids_and_usns: HashMap<Guid, Usn>,
    pub expunged_note_guids: Vec<Guid>,
    pub stop_synchronization_error: Option<StopSynchronizationError>,
}

/// Outcome of the resource-download half of a download round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadResourcesStatus {
    pub total_new_resources: u64,
    pub total_updated_resources: u64,
    pub resources_which_failed_to_download: Vec<FailedItem<Guid>>,
    pub resources_which_failed_to_process: Vec<FailedItem<Guid>>,
    pub processed_resource_guids_and_usns: HashMap<Guid, Usn>,
    pub cancelled_resource_guids_and_usns: HashMap<Guid, Usn>,
    pub stop_synchronization_error: Option<StopSynchronizationError>,
}

/// Outcome of one send round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendStatus {
    pub total_attempted_to_send_notebooks: u64,
    pub total_attempted_to_send_tags: u64,
    pub total_attempted_to_send_saved_searches: u64,
    pub total_attempted_to_send_notes: u64,
    pub total_successfully_sent_notebooks: u64,
    pub total_successfully_sent_tags: u64,
    pub total_successfully_sent_saved_searches: u64,
    pub total_successfully_sent_notes: u64,
    pub failed_to_send_notebooks: Vec<FailedItem<Guid>>,
    pub failed_to_send_tags: Vec<FailedItem<Guid>>,
    pub failed_to_send_saved_searches: Vec<FailedItem<Guid>>,
    pub failed_to_send_notes: Vec<FailedItem<Guid>>,
    /// Highest USN any item was assigned by the server during this round;
    /// used by the account synchronizer to decide whether another download
    /// half-round is needed to catch up.
    pub highest_assigned_usn: Option<Usn>,
    pub stop_synchronization_error: Option<StopSynchronizationError>,
}

impl SendStatus {
    #[must_use]
    pub fn record_sent_usn(&mut self, usn: Usn) {
        self.highest_assigned_usn = Some(match self.highest_assigned_usn {
            Some(current) if current >= usn => current,
            _ => usn,
        });
    }
}

/// Cumulative per-run counters across every category, mirroring the
/// original `ISyncStats` shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub sync_chunks_downloaded: u64,
    pub linked_notebooks_downloaded: u64,
    pub notebooks_downloaded: u64,
    pub saved_searches_downloaded: u64,
    pub tags_downloaded: u64,
    pub notes_downloaded: u64,
    pub resources_downloaded: u64,
    pub linked_notebooks_expunged: u64,
    pub notebooks_expunged: u64,
    pub saved_searches_expunged: u64,
    pub tags_expunged: u64,
    pub notes_expunged: u64,
    pub resources_expunged: u64,
    pub notebooks_sent: u64,
    pub saved_searches_sent: u64,
    pub tags_sent: u64,
    pub notes_sent: u64,
}

/// Per-run tunables (mirrors `ISyncOptions`); request context and retry
/// policy live in `evercore-sync` since they are transport concerns.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub download_note_thumbnails: bool,
    pub ink_note_images_storage_dir: Option<PathBuf>,
    pub max_in_flight_downloads: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            download_note_thumbnails: true,
            ink_note_images_storage_dir: None,
            max_in_flight_downloads: 100,
        }
    }
}

/// Top-level outcome of `synchronize()`: one user-account scope plus zero or
/// more linked-notebook scopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub sync_state: SyncState,
    pub user_account_sync_chunks_data_counters: SyncChunksDataCounters,
    pub linked_notebook_sync_chunks_data_counters: HashMap<Guid, SyncChunksDataCounters>,
    pub user_account_download_notes_status: DownloadNotesStatus,
    pub linked_notebook_download_notes_statuses: HashMap<Guid, DownloadNotesStatus>,
    pub user_account_download_resources_status: DownloadResourcesStatus,
    pub linked_notebook_download_resources_statuses: HashMap<Guid, DownloadResourcesStatus>,
    pub user_account_send_status: SendStatus,
    pub linked_notebook_send_statuses: HashMap<Guid, SendStatus>,
    pub stop_synchronization_error: Option<StopSynchronizationError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_error_variants_mutually_exclusive() {
        let rate = StopSynchronizationError::rate_limit(Some(7));
        assert!(rate.is_rate_limit());
        assert!(!rate.is_auth_expired());
        assert_eq!(rate.seconds_to_wait(), Some(7));

        let auth = StopSynchronizationError::AuthenticationExpired;
        assert!(auth.is_auth_expired());
        assert_eq!(auth.seconds_to_wait(), None);
    }

    #[test]
    fn send_status_tracks_highest_usn() {
        let mut status = SendStatus::default();
        status.record_sent_usn(Usn::new(5));
        status.record_sent_usn(Usn::new(12));
        status.record_sent_usn(Usn::new(3));
        assert_eq!(status.highest_assigned_usn, Some(Usn::new(12)));
    }

    #[test]
    fn sync_result_serde_roundtrip() {
        let result = SyncResult::default();
        let json = serde_json::to_string(&result).unwrap();
        let back: SyncResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }
}
