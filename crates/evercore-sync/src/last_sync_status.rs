//! Persists the most recent `SyncResult` per account (§6.3:
//! `last_sync_status.json`), so `status`-style callers can report on the
//! last completed round without having to keep one running in memory.
//!
//! Mirrors `SyncStateStore`'s write-then-rename discipline: a reader never
//! observes a partial write, and the absence of a file just means "never
//! synced" rather than an error.

use std::path::PathBuf;

use evercore_core::domain::{SyncResult as SyncRunResult, UserId};

use crate::error::{SyncError, SyncResult};
use crate::sync_state_store::write_then_rename;

/// Owns the `last_sync_status/` subdirectory of the data directory.
pub struct LastSyncStatusStore {
    dir: PathBuf,
}

impl LastSyncStatusStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { dir: data_dir.into().join("last_sync_status") }
    }

    fn path_for(&self, user_id: UserId) -> PathBuf {
        self.dir.join(format!("{}.json", user_id.value()))
    }

    /// Returns `None` if the account has never completed a sync round.
    #[tracing::instrument(skip(self))]
    pub async fn read(&self, user_id: UserId) -> SyncResult<Option<SyncRunResult>> {
        let path = self.path_for(user_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|err| SyncError::SyncStateIo(format!("parsing {}: {err}", path.display()))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SyncError::SyncStateIo(format!("reading {}: {err}", path.display()))),
        }
    }

    #[tracing::instrument(skip(self, result))]
    pub async fn write(&self, user_id: UserId, result: &SyncRunResult) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| SyncError::SyncStateIo(format!("creating {}: {err}", self.dir.display())))?;

        let json = serde_json::to_vec_pretty(result)
            .map_err(|err| SyncError::SyncStateIo(format!("serializing sync result: {err}")))?;

        write_then_rename(&self.dir, &self.path_for(user_id), &json)
            .await
            .map_err(|err| SyncError::SyncStateIo(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastSyncStatusStore::new(dir.path());
        assert!(store.read(UserId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastSyncStatusStore::new(dir.path());
        let mut result = SyncRunResult::default();
        result.user_account_download_notes_status.total_new_notes = 3;

        store.write(UserId::new(1), &result).await.unwrap();
        let reloaded = store.read(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(reloaded.user_account_download_notes_status.total_new_notes, 3);
    }

    #[tokio::test]
    async fn different_accounts_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastSyncStatusStore::new(dir.path());
        store.write(UserId::new(1), &SyncRunResult::default()).await.unwrap();
        assert!(store.read(UserId::new(2)).await.unwrap().is_none());
    }
}
