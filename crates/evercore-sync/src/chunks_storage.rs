//! On-disk sync-chunks cache (§4.3).
//!
//! Chunks are write-once cache artifacts, not user-facing status, so they are
//! stored with a compact `bincode` encoding rather than JSON. Layout:
//!
//! - `<data_dir>/sync_chunks/<low>-<high>.bin` — user-own chunks.
//! - `<data_dir>/sync_chunks/linked_notebook/<guid>/<low>-<high>.bin` — linked-notebook chunks.

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use evercore_core::domain::{Guid, SyncChunk};

use crate::error::{SyncError, SyncResult};
use crate::sync_state_store::write_then_rename;

/// Which chunk series a call addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkScope {
    UserOwn,
    LinkedNotebook(Guid),
}

impl ChunkScope {
    fn subdir(&self, root: &std::path::Path) -> PathBuf {
        match self {
            ChunkScope::UserOwn => root.to_path_buf(),
            ChunkScope::LinkedNotebook(guid) => {
                root.join("linked_notebook").join(guid.as_str())
            }
        }
    }
}

/// Per-account sync-chunks cache. A single `Mutex` serializes writes for the
/// whole account so `put` never races with itself; reads take a snapshot
/// under the same lock to avoid observing a half-finished `put`.
pub struct SyncChunksStorage {
    root: PathBuf,
    lock: Mutex<()>,
}

impl SyncChunksStorage {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into().join("sync_chunks"),
            lock: Mutex::new(()),
        }
    }

    /// All stored `(lowUsn, highUsn)` ranges for the given scope, in USN order.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_ranges(&self, scope: &ChunkScope) -> SyncResult<Vec<(u32, u32)>> {
        let _guard = self.lock.lock().await;
        let mut ranges = list_chunk_files(&scope.subdir(&self.root)).await?;
        ranges.sort_unstable();
        Ok(ranges)
    }

    /// All stored chunks with `highUsn > after_usn`, in USN order.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_relevant(&self, scope: &ChunkScope, after_usn: u32) -> SyncResult<Vec<SyncChunk>> {
        let _guard = self.lock.lock().await;
        let dir = scope.subdir(&self.root);
        let mut ranges = list_chunk_files(&dir).await?;
        ranges.sort_unstable();

        let mut chunks = Vec::new();
        for (low, high) in ranges {
            if high <= after_usn {
                continue;
            }
            let path = chunk_path(&dir, low, high);
            match tokio::fs::read(&path).await {
                Ok(bytes) => match bincode::deserialize::<SyncChunk>(&bytes) {
                    Ok(chunk) => chunks.push(chunk),
                    Err(err) => {
                        warn!(path = %path.display(), %err, "dropping corrupt sync chunk");
                    }
                },
                Err(err) => {
                    return Err(SyncError::ChunksStorage(format!(
                        "reading {}: {err}",
                        path.display()
                    )))
                }
            }
        }
        Ok(chunks)
    }

    /// Writes `chunks`, replacing any existing chunk whose range overlaps.
    #[tracing::instrument(skip(self, chunks))]
    pub async fn put(&self, scope: &ChunkScope, chunks: &[SyncChunk]) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        let dir = scope.subdir(&self.root);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| SyncError::ChunksStorage(format!("creating {}: {err}", dir.display())))?;

        let existing = list_chunk_files(&dir).await?;

        for chunk in chunks {
            let low = chunk.low_usn.value();
            let high = chunk.high_usn.value();

            for (existing_low, existing_high) in &existing {
                if ranges_overlap((low, high), (*existing_low, *existing_high))
                    && (*existing_low, *existing_high) != (low, high)
                {
                    let stale = chunk_path(&dir, *existing_low, *existing_high);
                    if let Err(err) = tokio::fs::remove_file(&stale).await {
                        if err.kind() != std::io::ErrorKind::NotFound {
                            warn!(path = %stale.display(), %err, "failed to remove overlapping chunk");
                        }
                    }
                }
            }

            let encoded = bincode::serialize(chunk)
                .map_err(|err| SyncError::ChunksStorage(format!("encoding chunk: {err}")))?;
            let path = chunk_path(&dir, low, high);
            write_then_rename(&dir, &path, &encoded)
                .await
                .map_err(|err| SyncError::ChunksStorage(err.to_string()))?;
            debug!(low, high, path = %path.display(), "wrote sync chunk to cache");
        }

        Ok(())
    }

    /// Deletes all cached chunks for one linked notebook.
    pub async fn clear_linked_notebook(&self, guid: &Guid) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        let dir = ChunkScope::LinkedNotebook(guid.clone()).subdir(&self.root);
        remove_dir_if_present(&dir).await
    }

    /// Deletes all cached user-own chunks.
    pub async fn clear_user_own(&self) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        for (low, high) in list_chunk_files(&self.root).await? {
            let path = chunk_path(&self.root, low, high);
            tokio::fs::remove_file(&path).await.ok();
        }
        Ok(())
    }

    /// Deletes everything cached for the account (user-own and every linked notebook).
    pub async fn clear_all(&self) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        remove_dir_if_present(&self.root).await
    }

    /// Sync barrier; the cache is already durable after each `put`, so this
    /// just fences on the internal lock to ensure no write is in flight.
    pub async fn flush(&self) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        Ok(())
    }
}

fn ranges_overlap(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

fn chunk_path(dir: &std::path::Path, low: u32, high: u32) -> PathBuf {
    dir.join(format!("{low}-{high}.bin"))
}

async fn list_chunk_files(dir: &std::path::Path) -> SyncResult<Vec<(u32, u32)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(SyncError::ChunksStorage(format!(
                "listing {}: {err}",
                dir.display()
            )))
        }
    };

    let mut ranges = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| SyncError::ChunksStorage(err.to_string()))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(".bin") else { continue };
        let Some((low_str, high_str)) = stem.split_once('-') else { continue };
        if let (Ok(low), Ok(high)) = (low_str.parse::<u32>(), high_str.parse::<u32>()) {
            ranges.push((low, high));
        }
    }
    Ok(ranges)
}

async fn remove_dir_if_present(dir: &std::path::Path) -> SyncResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SyncError::ChunksStorage(format!(
            "removing {}: {err}",
            dir.display()
        ))),
    }
}
