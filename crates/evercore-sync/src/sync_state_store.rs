//! File-backed per-account `SyncState` persistence (§4.2).
//!
//! One JSON file per account under `<data_dir>/sync_state/<user_id>.json`.
//! Writes go through a temp file in the same directory followed by an atomic
//! rename, so a reader never observes a partial write and a crash mid-write
//! leaves the previous good file in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use evercore_core::domain::{SyncState, UserId};

use crate::error::{SyncError, SyncResult};

/// Emitted whenever a `SyncState` is successfully persisted.
#[derive(Debug, Clone)]
pub struct SyncStateUpdated {
    pub user_id: UserId,
    pub state: SyncState,
}

/// Owns the `sync_state/` subdirectory of the data directory.
pub struct SyncStateStore {
    dir: PathBuf,
    events: broadcast::Sender<SyncStateUpdated>,
}

impl SyncStateStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            dir: data_dir.into().join("sync_state"),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncStateUpdated> {
        self.events.subscribe()
    }

    fn path_for(&self, user_id: UserId) -> PathBuf {
        self.dir.join(format!("{}.json", user_id.value()))
    }

    /// Reads the persisted state for `user_id`. A missing file or a corrupt
    /// one both yield `SyncState::zero()` rather than failing the caller;
    /// corruption is logged so an operator notices.
    #[tracing::instrument(skip(self))]
    pub async fn get_sync_state(&self, user_id: UserId) -> SyncResult<SyncState> {
        let path = self.path_for(user_id);
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(%user_id, "no persisted sync state, starting from zero");
                return Ok(SyncState::zero());
            }
            Err(err) => {
                return Err(SyncError::SyncStateIo(format!(
                    "reading {}: {err}",
                    path.display()
                )))
            }
        };

        match serde_json::from_slice::<SyncState>(&contents) {
            Ok(state) => Ok(state),
            Err(err) => {
                warn!(%user_id, %err, path = %path.display(), "sync state file is corrupt, resetting to zero");
                Ok(SyncState::zero())
            }
        }
    }

    /// Atomically persists `state` for `user_id` and notifies subscribers.
    #[tracing::instrument(skip(self, state))]
    pub async fn set_sync_state(&self, user_id: UserId, state: SyncState) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| SyncError::SyncStateIo(format!("creating {}: {err}", self.dir.display())))?;

        let json = serde_json::to_vec_pretty(&state)
            .map_err(|err| SyncError::SyncStateIo(format!("serializing sync state: {err}")))?;

        let final_path = self.path_for(user_id);
        write_then_rename(&self.dir, &final_path, &json)
            .await
            .map_err(|err| SyncError::SyncStateIo(err.to_string()))?;

        debug!(%user_id, update_count = state.user_data_update_count.value(), "persisted sync state");
        let _ = self.events.send(SyncStateUpdated { user_id, state });
        Ok(())
    }
}

/// Writes `contents` to a temp file inside `dir` then renames it to `final_path`.
pub(crate) async fn write_then_rename(
    dir: &Path,
    final_path: &Path,
    contents: &[u8],
) -> std::io::Result<()> {
    let dir = dir.to_path_buf();
    let final_path = final_path.to_path_buf();
    let contents = contents.to_vec();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        use std::io::Write;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&final_path)
            .map_err(|persist_err| persist_err.error)?;
        Ok(())
    })
    .await
    .map_err(|join_err| std::io::Error::other(join_err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use evercore_core::domain::{Timestamp, Usn};

    #[tokio::test]
    async fn missing_file_yields_zero_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path());
        let state = store.get_sync_state(UserId::new(1)).await.unwrap();
        assert_eq!(state, SyncState::zero());
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path());

        let mut state = SyncState::zero();
        state.advance_user_data(Usn::new(42), Timestamp::from_millis(1000));
        store.set_sync_state(UserId::new(7), state.clone()).await.unwrap();

        let reloaded = store.get_sync_state(UserId::new(7)).await.unwrap();
        assert_eq!(reloaded, state);
    }

    #[tokio::test]
    async fn corrupt_file_resets_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path());
        tokio::fs::create_dir_all(&store.dir).await.unwrap();
        tokio::fs::write(store.path_for(UserId::new(3)), b"not json")
            .await
            .unwrap();

        let state = store.get_sync_state(UserId::new(3)).await.unwrap();
        assert_eq!(state, SyncState::zero());
    }

    #[tokio::test]
    async fn set_sync_state_notifies_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path());
        let mut rx = store.subscribe();

        let mut state = SyncState::zero();
        state.advance_user_data(Usn::new(1), Timestamp::from_millis(1));
        store.set_sync_state(UserId::new(9), state).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id, UserId::new(9));
    }

    #[tokio::test]
    async fn different_accounts_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path());

        let mut a = SyncState::zero();
        a.advance_user_data(Usn::new(10), Timestamp::from_millis(1));
        store.set_sync_state(UserId::new(1), a.clone()).await.unwrap();

        let b = store.get_sync_state(UserId::new(2)).await.unwrap();
        assert_eq!(b, SyncState::zero());
        assert_ne!(store.get_sync_state(UserId::new(1)).await.unwrap(), b);
    }
}
