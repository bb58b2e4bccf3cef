//! Full-content note/resource downloader (§4.8.3).
//!
//! Sync chunks carry metadata only; this fetches each note/resource's full
//! body, bounded by a counting semaphore so a run never has more than
//! `maxInFlightDownloads` requests in flight at once. `IncludeNoteLimits` is
//! claimed by at most one caller per downloader instance — the first note
//! of the run — everyone else gets `No`.

use std::sync::atomic::{AtomicBool, Ordering};

use evercore_core::canceler::Canceler;
use evercore_core::domain::{
    DownloadNotesStatus, DownloadResourcesStatus, FailedItem, Guid, StopSynchronizationError, Usn,
};
use evercore_core::ports::remote::{IncludeNoteLimits, NoteResultSpec, RequestContext, ResourceOptions};
use evercore_core::ports::{ILocalStorage, INoteStore};
use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::remote_error::{classify_remote_error, RemoteErrorClass};

pub struct FullDataDownloader {
    max_in_flight: usize,
    note_limits_claimed: AtomicBool,
}

impl FullDataDownloader {
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            note_limits_claimed: AtomicBool::new(false),
        }
    }

    fn claim_note_limits(&self) -> IncludeNoteLimits {
        if self.note_limits_claimed.swap(true, Ordering::SeqCst) {
            IncludeNoteLimits::No
        } else {
            IncludeNoteLimits::Yes
        }
    }

    /// Fetches full content for every guid, writing each successfully
    /// fetched note into local storage as it arrives. Stops submitting new
    /// work the moment a rate-limit or auth-expired response is seen;
    /// requests already in flight are still drained.
    #[tracing::instrument(skip(self, guids, note_store, storage, ctx, canceler))]
    pub async fn download_notes(
        &self,
        guids: &[Guid],
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
        canceler: &Canceler,
    ) -> crate::error::SyncResult<DownloadNotesStatus> {
        let mut status = DownloadNotesStatus::default();
        if guids.is_empty() {
            return Ok(status);
        }

        let mut in_flight = stream::iter(guids.iter().cloned())
            .map(|guid| {
                let spec = NoteResultSpec {
                    include_content: true,
                    include_resources_data: true,
                    include_resources_recognition: false,
                    include_note_limits: matches!(self.claim_note_limits(), IncludeNoteLimits::Yes),
                };
                let call_ctx = ctx.cloned_for_new_call();
                async move {
                    let outcome = note_store.get_note_with_result_spec(&guid, &spec, &call_ctx).await;
                    (guid, outcome)
                }
            })
            .buffer_unordered(self.max_in_flight);

        while let Some((guid, outcome)) = in_flight.next().await {
            if canceler.is_canceled() {
                status.cancelled_note_guids_and_usns.insert(guid, Usn::ZERO);
                continue;
            }
            match outcome {
                Ok(note) => {
                    let usn = note.update_sequence_num.unwrap_or(Usn::ZERO);
                    match storage.put_note(note).await {
                        Ok(()) => {
                            status.processed_note_guids_and_usns.insert(guid, usn);
                            status.total_updated_notes += 1;
                        }
                        Err(err) => status
                            .notes_which_failed_to_process
                            .push(FailedItem { item: guid, reason: err.to_string() }),
                    }
                }
                Err(err) => match classify_remote_error(&err) {
                    RemoteErrorClass::RateLimit(seconds) => {
                        status.stop_synchronization_error = Some(StopSynchronizationError::rate_limit(seconds));
                        break;
                    }
                    RemoteErrorClass::AuthExpired => {
                        status.stop_synchronization_error = Some(StopSynchronizationError::AuthenticationExpired);
                        break;
                    }
                    RemoteErrorClass::Other => {
                        warn!(%guid, %err, "note download failed");
                        status
                            .notes_which_failed_to_download
                            .push(FailedItem { item: guid, reason: err.to_string() });
                    }
                },
            }
        }

        Ok(status)
    }

    /// Fetches full binary data for every resource guid.
    #[tracing::instrument(skip(self, guids, note_store, storage, ctx, canceler))]
    pub async fn download_resources(
        &self,
        guids: &[Guid],
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
        canceler: &Canceler,
    ) -> crate::error::SyncResult<DownloadResourcesStatus> {
        let mut status = DownloadResourcesStatus::default();
        if guids.is_empty() {
            return Ok(status);
        }

        let mut in_flight = stream::iter(guids.iter().cloned())
            .map(|guid| {
                let options = ResourceOptions {
                    include_data: true,
                    include_recognition: false,
                    include_alternate_data: false,
                };
                let call_ctx = ctx.cloned_for_new_call();
                async move {
                    let outcome = note_store.get_resource(&guid, &options, &call_ctx).await;
                    (guid, outcome)
                }
            })
            .buffer_unordered(self.max_in_flight);

        while let Some((guid, outcome)) = in_flight.next().await {
            if canceler.is_canceled() {
                status.cancelled_resource_guids_and_usns.insert(guid, Usn::ZERO);
                continue;
            }
            match outcome {
                Ok(resource) => {
                    let usn = resource.update_sequence_num.unwrap_or(Usn::ZERO);
                    match storage.put_resource(resource).await {
                        Ok(()) => {
                            status.processed_resource_guids_and_usns.insert(guid, usn);
                            status.total_updated_resources += 1;
                        }
                        Err(err) => status
                            .resources_which_failed_to_process
                            .push(FailedItem { item: guid, reason: err.to_string() }),
                    }
                }
                Err(err) => match classify_remote_error(&err) {
                    RemoteErrorClass::RateLimit(seconds) => {
                        status.stop_synchronization_error = Some(StopSynchronizationError::rate_limit(seconds));
                        break;
                    }
                    RemoteErrorClass::AuthExpired => {
                        status.stop_synchronization_error = Some(StopSynchronizationError::AuthenticationExpired);
                        break;
                    }
                    RemoteErrorClass::Other => {
                        warn!(%guid, %err, "resource download failed");
                        status
                            .resources_which_failed_to_download
                            .push(FailedItem { item: guid, reason: err.to_string() });
                    }
                },
            }
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_factory::tests::FakeNoteStoreFactory;
    use crate::store_factory::INoteStoreFactory as _;
    use evercore_core::canceler::ManualCanceler;
    use evercore_core::domain::{AuthenticationInfo, Timestamp, UserId};
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

    fn guid(n: u8) -> Guid {
        Guid::new(format!("2222222{n}-2222-2222-2222-222222222222")).unwrap()
    }

    #[tokio::test]
    async fn claims_note_limits_once() {
        let downloader = FullDataDownloader::new(4);
        assert_eq!(downloader.claim_note_limits(), IncludeNoteLimits::Yes);
        assert_eq!(downloader.claim_note_limits(), IncludeNoteLimits::No);
        assert_eq!(downloader.claim_note_limits(), IncludeNoteLimits::No);
    }

    #[tokio::test]
    async fn download_notes_empty_guid_list_is_noop() {
        let factory = FakeNoteStoreFactory::default();
        let note_store = factory.note_store_for_user(&auth());
        let storage = InMemoryLocalStorage::new();
        let canceler = ManualCanceler::new();
        let ctx = RequestContext::new("tok");
        let downloader = FullDataDownloader::new(8);

        let status = downloader
            .download_notes(&[], note_store.as_ref(), &storage, &ctx, &canceler)
            .await
            .unwrap();
        assert_eq!(status.total_updated_notes, 0);
    }

    #[tokio::test]
    async fn cancellation_marks_notes_cancelled_not_failed() {
        let factory = FakeNoteStoreFactory::default();
        let note_store = factory.note_store_for_user(&auth());
        let storage = InMemoryLocalStorage::new();
        let canceler = ManualCanceler::new();
        canceler.cancel();
        let ctx = RequestContext::new("tok");
        let downloader = FullDataDownloader::new(8);

        let status = downloader
            .download_notes(&[guid(1)], note_store.as_ref(), &storage, &ctx, &canceler)
            .await
            .unwrap();
        assert!(status.notes_which_failed_to_download.is_empty());
        assert_eq!(status.cancelled_note_guids_and_usns.len(), 1);
    }

    #[tokio::test]
    async fn remote_get_note_failure_is_recorded() {
        let factory = FakeNoteStoreFactory::default();
        let note_store = factory.note_store_for_user(&auth());
        let storage = InMemoryLocalStorage::new();
        let canceler = ManualCanceler::new();
        let ctx = RequestContext::new("tok");
        let downloader = FullDataDownloader::new(8);

        let status = downloader
            .download_notes(&[guid(1)], note_store.as_ref(), &storage, &ctx, &canceler)
            .await
            .unwrap();
        assert_eq!(status.notes_which_failed_to_download.len(), 1);
    }
}
