//! Download orchestration (§4.8): for one scope (the account's own data, or
//! one linked notebook), pulls sync chunks and applies them to local
//! storage in a fixed processor order, updating an in-memory `SyncState`
//! candidate as it goes and persisting it once the scope is caught up.

use std::sync::Arc;

use evercore_core::canceler::Canceler;
use evercore_core::domain::{
    DownloadNotesStatus, DownloadResourcesStatus, Guid, StopSynchronizationError, SyncChunksDataCounters,
    SyncOptions, SyncState, Timestamp, UserId,
};
use evercore_core::ports::remote::RequestContext;
use evercore_core::ports::{IConflictResolver, ILocalStorage, INoteStore};
use tracing::{info, warn};

use crate::chunks_downloader::ChunksProvider;
use crate::chunks_storage::ChunkScope;
use crate::error::SyncResult;
use crate::full_data::FullDataDownloader;
use crate::processors::{
    process_linked_notebooks, process_notebooks, process_notes, process_resources,
    process_saved_searches, process_tags,
};
use crate::sync_state_store::SyncStateStore;

/// Fetches a note's thumbnail or ink-note image in the background. No
/// implementation ships in this reference build — wiring a real one needs
/// the wire-protocol client `store_factory::HttpNoteStore` does not yet
/// implement.
#[async_trait::async_trait]
pub trait IThumbnailFetcher: Send + Sync {
    async fn fetch(&self, note_guid: &Guid) -> evercore_core::error::CoreResult<Vec<u8>>;
}

/// Outcome of downloading one scope to completion (every available chunk
/// applied).
#[derive(Debug, Clone, Default)]
pub struct DownloadOutcome {
    pub sync_state: SyncState,
    pub counters: SyncChunksDataCounters,
    pub notes_status: DownloadNotesStatus,
    pub resources_status: DownloadResourcesStatus,
    /// Set when chunk pagination itself (as opposed to a per-note/resource
    /// full-body fetch) stopped early on a rate limit or expired auth token.
    pub stop_synchronization_error: Option<StopSynchronizationError>,
}

pub struct Downloader {
    chunks: Arc<ChunksProvider>,
    full_data: Arc<FullDataDownloader>,
    resolver: Arc<dyn IConflictResolver>,
    thumbnails: Option<Arc<dyn IThumbnailFetcher>>,
}

impl Downloader {
    #[must_use]
    pub fn new(
        chunks: Arc<ChunksProvider>,
        full_data: Arc<FullDataDownloader>,
        resolver: Arc<dyn IConflictResolver>,
    ) -> Self {
        Self { chunks, full_data, resolver, thumbnails: None }
    }

    #[must_use]
    pub fn with_thumbnail_fetcher(mut self, fetcher: Arc<dyn IThumbnailFetcher>) -> Self {
        self.thumbnails = Some(fetcher);
        self
    }

    /// Downloads and applies every available chunk for `scope`, then
    /// persists the resulting `SyncState`.
    #[tracing::instrument(skip(self, note_store, storage, sync_state_store, options, ctx, canceler))]
    #[allow(clippy::too_many_arguments)]
    pub async fn download_scope(
        &self,
        scope: &ChunkScope,
        user_id: UserId,
        linked_notebook_guid: Option<&Guid>,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        sync_state_store: &SyncStateStore,
        options: &SyncOptions,
        ctx: &RequestContext,
        canceler: &Canceler,
    ) -> SyncResult<DownloadOutcome> {
        let mut sync_state = sync_state_store.get_sync_state(user_id).await?;
        let after_usn = match linked_notebook_guid {
            Some(guid) => sync_state
                .linked_notebook_update_counts
                .get(guid)
                .copied()
                .unwrap_or(evercore_core::domain::Usn::ZERO)
                .value(),
            None => sync_state.user_data_update_count.value(),
        };

        let fetch_result = self.chunks.fetch(scope, note_store, after_usn, ctx, canceler).await?;
        let chunks = fetch_result.chunks;
        info!(scope = ?scope, chunk_count = chunks.len(), "applying downloaded chunks");

        let mut counters = SyncChunksDataCounters::default();
        let mut notes_status = DownloadNotesStatus::default();
        let mut resources_status = DownloadResourcesStatus::default();

        for chunk in &chunks {
            if canceler.is_canceled() {
                return Err(crate::error::SyncError::Cancelled);
            }

            for failed in process_linked_notebooks(chunk, storage, &mut counters).await? {
                warn!(guid = %failed.item, reason = %failed.reason, "linked notebook processing failed");
            }
            for failed in process_notebooks(chunk, storage, self.resolver.as_ref(), &mut counters).await? {
                warn!(guid = %failed.item, reason = %failed.reason, "notebook processing failed");
            }
            for failed in process_tags(chunk, storage, self.resolver.as_ref(), &mut counters).await? {
                warn!(guid = %failed.item, reason = %failed.reason, "tag processing failed");
            }
            for failed in process_saved_searches(chunk, storage, self.resolver.as_ref(), &mut counters).await? {
                warn!(guid = %failed.item, reason = %failed.reason, "saved search processing failed");
            }

            let (touched_notes, failed_notes) =
                process_notes(chunk, storage, self.resolver.as_ref(), &mut counters).await?;
            notes_status.notes_which_failed_to_process.extend(failed_notes);

            let (touched_resources, failed_resources) =
                process_resources(chunk, storage, self.resolver.as_ref(), &mut counters).await?;
            resources_status.resources_which_failed_to_process.extend(failed_resources);

            if !touched_notes.is_empty() {
                let fetched = self
                    .full_data
                    .download_notes(&touched_notes, note_store, storage, ctx, canceler)
                    .await?;
                merge_notes_status(&mut notes_status, fetched);
                if notes_status.stop_synchronization_error.is_some() {
                    sync_state_store.set_sync_state(user_id, sync_state.clone()).await?;
                    return Ok(DownloadOutcome { sync_state, counters, notes_status, resources_status, stop_synchronization_error: None });
                }
                if options.download_note_thumbnails {
                    self.spawn_thumbnail_fetches(&touched_notes);
                }
            }

            if !touched_resources.is_empty() {
                let fetched = self
                    .full_data
                    .download_resources(&touched_resources, note_store, storage, ctx, canceler)
                    .await?;
                merge_resources_status(&mut resources_status, fetched);
                if resources_status.stop_synchronization_error.is_some() {
                    sync_state_store.set_sync_state(user_id, sync_state.clone()).await?;
                    return Ok(DownloadOutcome { sync_state, counters, notes_status, resources_status, stop_synchronization_error: None });
                }
            }

            let now = Timestamp::now();
            match linked_notebook_guid {
                Some(guid) => sync_state.advance_linked_notebook(guid.clone(), chunk.high_usn, now),
                None => sync_state.advance_user_data(chunk.high_usn, now),
            }
        }

        sync_state_store.set_sync_state(user_id, sync_state.clone()).await?;

        if let Some(stop) = fetch_result.stop {
            // Chunk pagination itself stopped early; whatever chunks were
            // obtained are already applied and persisted above, and already
            // cached on disk by `download_from` as they arrived.
            return Ok(DownloadOutcome { sync_state, counters, notes_status, resources_status, stop_synchronization_error: Some(stop) });
        }

        clean_linked_notebook_tags(storage, linked_notebook_guid).await?;
        Ok(DownloadOutcome { sync_state, counters, notes_status, resources_status, stop_synchronization_error: None })
    }

    fn spawn_thumbnail_fetches(&self, guids: &[Guid]) {
        let Some(fetcher) = self.thumbnails.clone() else { return };
        for guid in guids.iter().cloned() {
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
                if let Err(err) = fetcher.fetch(&guid).await {
                    warn!(%guid, %err, "background thumbnail fetch failed");
                }
            });
        }
    }
}

fn merge_notes_status(into: &mut DownloadNotesStatus, mut from: DownloadNotesStatus) {
    into.total_new_notes += from.total_new_notes;
    into.total_updated_notes += from.total_updated_notes;
    into.total_expunged_notes += from.total_expunged_notes;
    into.notes_which_failed_to_download.append(&mut from.notes_which_failed_to_download);
    into.notes_which_failed_to_process.append(&mut from.notes_which_failed_to_process);
    into.note_guids_which_failed_to_expunge.append(&mut from.note_guids_which_failed_to_expunge);
    into.processed_note_guids_and_usns.extend(from.processed_note_guids_and_usns);
    into.cancelled_note_guids_and_usns.extend(from.cancelled_note_guids_and_usns);
    into.expunged_note_guids.append(&mut from.expunged_note_guids);
    if from.stop_synchronization_error.is_some() {
        into.stop_synchronization_error = from.stop_synchronization_error;
    }
}

fn merge_resources_status(into: &mut DownloadResourcesStatus, mut from: DownloadResourcesStatus) {
    into.total_new_resources += from.total_new_resources;
    into.total_updated_resources += from.total_updated_resources;
    into.resources_which_failed_to_download.append(&mut from.resources_which_failed_to_download);
    into.resources_which_failed_to_process.append(&mut from.resources_which_failed_to_process);
    into.processed_resource_guids_and_usns.extend(from.processed_resource_guids_and_usns);
    into.cancelled_resource_guids_and_usns.extend(from.cancelled_resource_guids_and_usns);
    if from.stop_synchronization_error.is_some() {
        into.stop_synchronization_error = from.stop_synchronization_error;
    }
}

/// Drops locally-cached tags whose linked notebook no longer exists and
/// which reference no note — mirrors the server dropping orphaned shared
/// tags once the sharing link itself is gone.
async fn clean_linked_notebook_tags(
    storage: &dyn ILocalStorage,
    linked_notebook_guid: Option<&Guid>,
) -> SyncResult<()> {
    if linked_notebook_guid.is_some() {
        return Ok(());
    }
    use evercore_core::ports::{Affiliation, TagNotesRelation};
    let orphaned = storage
        .list_tags(Affiliation::AnyLinkedNotebook, TagNotesRelation::WithoutNotes)
        .await?;
    for tag in orphaned {
        let Some(guid) = tag.guid else { continue };
        let still_linked = match &tag.linked_notebook_guid {
            Some(ln_guid) => storage.find_linked_notebook_by_guid(ln_guid).await?.is_some(),
            None => true,
        };
        if !still_linked {
            storage.expunge_tag(&guid).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks_storage::SyncChunksStorage;
    use crate::store_factory::tests::FakeNoteStoreFactory;
    use crate::store_factory::INoteStoreFactory as _;
    use evercore_conflict::DefaultConflictResolver;
    use evercore_core::canceler::ManualCanceler;
    use evercore_core::domain::{AuthenticationInfo};
    use evercore_core::memory_storage::InMemoryLocalStorage;

    fn auth() -> AuthenticationInfo {
        AuthenticationInfo {
            user_id: UserId::new(1),
            auth_token: "tok".into(),
            auth_token_expiration_time: Timestamp::from_millis(i64::MAX),
            authentication_time: Timestamp::from_millis(0),
            shard_id: "s1".into(),
            note_store_url: "https://example.com".into(),
            web_api_url_prefix: "https://example.com/".into(),
            user_store_cookies: vec![],
        }
    }

    #[tokio::test]
    async fn empty_remote_account_produces_zero_counters() {
        let data_dir = tempfile::tempdir().unwrap();
        let chunks_storage = Arc::new(SyncChunksStorage::new(data_dir.path()));
        let sync_state_store = SyncStateStore::new(data_dir.path());
        let storage = InMemoryLocalStorage::new();
        let factory = FakeNoteStoreFactory::default();
        let note_store = factory.note_store_for_user(&auth());
        let canceler = ManualCanceler::new();
        let ctx = RequestContext::new("tok");
        let options = SyncOptions::default();

        let downloader = Downloader::new(
            Arc::new(ChunksProvider::new(chunks_storage)),
            Arc::new(FullDataDownloader::new(options.max_in_flight_downloads)),
            Arc::new(DefaultConflictResolver::default()),
        );

        let outcome = downloader
            .download_scope(
                &ChunkScope::UserOwn,
                UserId::new(1),
                None,
                note_store.as_ref(),
                &storage,
                &sync_state_store,
                &options,
                &ctx,
                &canceler,
            )
            .await
            .unwrap();

        assert_eq!(outcome.counters.total_notebooks, 0);
        assert_eq!(outcome.sync_state, SyncState::zero());
    }
}
