//! Account synchronizer (§4.10): the top-level Downloading/Sending state
//! machine for one account. Drives the Downloader over the user's own data
//! and every linked notebook, then the Sender over local dirty items,
//! looping back to Downloading whenever the send phase pushed the server's
//! USN past where the round started.

use std::sync::Arc;
use std::time::Duration;

use evercore_core::canceler::Canceler;
use evercore_core::domain::{
    DownloadNotesStatus, DownloadResourcesStatus, Guid, StopSynchronizationError, SyncChunksDataCounters,
    SyncOptions, SyncResult as SyncRunResult, UserId,
};
use evercore_core::ports::remote::RequestContext;
use evercore_core::ports::ILocalStorage;
use tracing::{info, warn};

use crate::auth_provider::{AuthOptions, AuthenticationInfoProvider};
use crate::chunks_downloader::ChunksProvider;
use crate::chunks_storage::ChunkScope;
use crate::downloader::Downloader;
use crate::error::{SyncError, SyncResult};
use crate::sender::Sender;
use crate::store_factory::INoteStoreFactory;
use crate::sync_state_store::SyncStateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Downloading,
    Sending,
    Done,
}

pub struct AccountSynchronizer {
    auth_provider: Arc<AuthenticationInfoProvider>,
    note_store_factory: Arc<dyn INoteStoreFactory>,
    storage: Arc<dyn ILocalStorage>,
    sync_state_store: Arc<SyncStateStore>,
    downloader: Arc<Downloader>,
    sender: Arc<Sender>,
    options: SyncOptions,
}

impl AccountSynchronizer {
    #[must_use]
    pub fn new(
        auth_provider: Arc<AuthenticationInfoProvider>,
        note_store_factory: Arc<dyn INoteStoreFactory>,
        storage: Arc<dyn ILocalStorage>,
        sync_state_store: Arc<SyncStateStore>,
        downloader: Arc<Downloader>,
        sender: Arc<Sender>,
        options: SyncOptions,
    ) -> Self {
        Self { auth_provider, note_store_factory, storage, sync_state_store, downloader, sender, options }
    }

    /// Runs Downloading/Sending to completion for `user_id`, looping back to
    /// Downloading whenever the send phase raised the server's USN past
    /// where this round started. Returns the aggregate outcome.
    #[tracing::instrument(skip(self, canceler))]
    pub async fn run(&self, user_id: UserId, canceler: &Canceler) -> SyncResult<SyncRunResult> {
        let start_usn = self.sync_state_store.get_sync_state(user_id).await?.user_data_update_count;

        let mut state = State::Downloading;
        let mut result = SyncRunResult::default();

        loop {
            if canceler.is_canceled() {
                return Err(SyncError::Cancelled);
            }

            match state {
                State::Downloading => {
                    info!(%user_id, "entering download half-round");
                    let stop = self.run_downloader(user_id, &mut result, canceler).await?;
                    match stop {
                        Some(StopSynchronizationError::RateLimitReached { seconds_to_wait }) => {
                            result.stop_synchronization_error =
                                Some(StopSynchronizationError::RateLimitReached { seconds_to_wait });
                            self.sleep_cancelable(seconds_to_wait, canceler).await?;
                            result.stop_synchronization_error = None;
                            continue;
                        }
                        Some(StopSynchronizationError::AuthenticationExpired) => {
                            self.auth_provider.authenticate_account(user_id, AuthOptions::Refresh).await?;
                            continue;
                        }
                        None => state = State::Sending,
                    }
                }
                State::Sending => {
                    info!(%user_id, "entering send half-round");
                    let stop = self.run_sender(user_id, &mut result, canceler).await?;
                    match stop {
                        Some(StopSynchronizationError::RateLimitReached { seconds_to_wait }) => {
                            result.stop_synchronization_error =
                                Some(StopSynchronizationError::RateLimitReached { seconds_to_wait });
                            self.sleep_cancelable(seconds_to_wait, canceler).await?;
                            result.stop_synchronization_error = None;
                            continue;
                        }
                        Some(StopSynchronizationError::AuthenticationExpired) => {
                            self.auth_provider.authenticate_account(user_id, AuthOptions::Refresh).await?;
                            continue;
                        }
                        None => {
                            let caught_up = result
                                .user_account_send_status
                                .highest_assigned_usn
                                .is_some_and(|usn| usn > start_usn);
                            state = if caught_up { State::Downloading } else { State::Done };
                        }
                    }
                }
                State::Done => {
                    info!(%user_id, "sync round complete");
                    return Ok(result);
                }
            }
        }
    }

    async fn run_downloader(
        &self,
        user_id: UserId,
        result: &mut SyncRunResult,
        canceler: &Canceler,
    ) -> SyncResult<Option<StopSynchronizationError>> {
        let account_info = self.auth_provider.authenticate_account(user_id, AuthOptions::UseCachedOrRefresh).await?;
        let note_store = self.note_store_factory.note_store_for_user(&account_info);
        let ctx = RequestContext::new(account_info.auth_token.clone());

        let own_outcome = self
            .downloader
            .download_scope(
                &ChunkScope::UserOwn,
                user_id,
                None,
                note_store.as_ref(),
                self.storage.as_ref(),
                &self.sync_state_store,
                &self.options,
                &ctx,
                canceler,
            )
            .await?;
        result.sync_state = own_outcome.sync_state.clone();
        merge_counters(&mut result.user_account_sync_chunks_data_counters, own_outcome.counters);
        merge_notes_status(&mut result.user_account_download_notes_status, own_outcome.notes_status);
        merge_resources_status(&mut result.user_account_download_resources_status, own_outcome.resources_status);
        if let Some(stop) = own_outcome.stop_synchronization_error {
            return Ok(Some(stop));
        }
        if let Some(stop) = result.user_account_download_notes_status.stop_synchronization_error.clone() {
            return Ok(Some(stop));
        }
        if let Some(stop) = result.user_account_download_resources_status.stop_synchronization_error.clone() {
            return Ok(Some(stop));
        }

        let mut linked_notebooks = self.storage.list_linked_notebooks().await?;
        linked_notebooks.sort_by(|a, b| a.guid.cmp(&b.guid));

        for linked_notebook in linked_notebooks {
            if canceler.is_canceled() {
                return Err(SyncError::Cancelled);
            }
            let guid = linked_notebook.guid.clone();
            let ln_auth = match self
                .auth_provider
                .authenticate_to_linked_notebook(user_id, &linked_notebook, AuthOptions::UseCachedOrRefresh)
                .await
            {
                Ok(info) => info,
                Err(err) => {
                    warn!(%guid, %err, "skipping linked notebook: could not authenticate");
                    continue;
                }
            };
            let ln_note_store = match &linked_notebook.note_store_url {
                Some(url) => self.note_store_factory.note_store_for_linked_notebook(url),
                None => {
                    warn!(%guid, "skipping linked notebook: no note store url on record");
                    continue;
                }
            };
            let ln_ctx = RequestContext::new(ln_auth.auth_token.clone());

            let outcome = self
                .downloader
                .download_scope(
                    &ChunkScope::LinkedNotebook(guid.clone()),
                    user_id,
                    Some(&guid),
                    ln_note_store.as_ref(),
                    self.storage.as_ref(),
                    &self.sync_state_store,
                    &self.options,
                    &ln_ctx,
                    canceler,
                )
                .await?;

            result.sync_state = outcome.sync_state.clone();
            let stop_synchronization_error = outcome.stop_synchronization_error.clone();

            let counters = result
                .linked_notebook_sync_chunks_data_counters
                .entry(guid.clone())
                .or_insert_with(SyncChunksDataCounters::default);
            merge_counters(counters, outcome.counters);

            let notes_status = result
                .linked_notebook_download_notes_statuses
                .entry(guid.clone())
                .or_insert_with(DownloadNotesStatus::default);
            merge_notes_status(notes_status, outcome.notes_status);

            let resources_status = result
                .linked_notebook_download_resources_statuses
                .entry(guid.clone())
                .or_insert_with(DownloadResourcesStatus::default);
            merge_resources_status(resources_status, outcome.resources_status);

            if let Some(stop) = stop_synchronization_error {
                return Ok(Some(stop));
            }
            if let Some(stop) = notes_status.stop_synchronization_error.clone() {
                return Ok(Some(stop));
            }
            if let Some(stop) = resources_status.stop_synchronization_error.clone() {
                return Ok(Some(stop));
            }
        }

        Ok(None)
    }

    async fn run_sender(
        &self,
        user_id: UserId,
        result: &mut SyncRunResult,
        canceler: &Canceler,
    ) -> SyncResult<Option<StopSynchronizationError>> {
        let account_info = self.auth_provider.authenticate_account(user_id, AuthOptions::UseCachedOrRefresh).await?;
        let note_store = self.note_store_factory.note_store_for_user(&account_info);
        let ctx = RequestContext::new(account_info.auth_token.clone());

        let status = self.sender.send_scope(note_store.as_ref(), self.storage.as_ref(), &ctx, canceler).await?;
        let stop = status.stop_synchronization_error.clone();
        merge_send_status(&mut result.user_account_send_status, status);
        Ok(stop)
    }

    async fn sleep_cancelable(&self, seconds_to_wait: Option<i32>, canceler: &Canceler) -> SyncResult<()> {
        let total = Duration::from_secs(seconds_to_wait.filter(|s| *s > 0).unwrap_or(1) as u64);
        let step = Duration::from_millis(200).min(total);
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            if canceler.is_canceled() {
                return Err(SyncError::Cancelled);
            }
            let remaining = total - elapsed;
            tokio::time::sleep(step.min(remaining)).await;
            elapsed += step;
        }
        Ok(())
    }
}

fn merge_counters(into: &mut SyncChunksDataCounters, from: SyncChunksDataCounters) {
    into.total_notebooks += from.total_notebooks;
    into.added_notebooks += from.added_notebooks;
    into.updated_notebooks += from.updated_notebooks;
    into.expunged_notebooks += from.expunged_notebooks;
    into.total_tags += from.total_tags;
    into.added_tags += from.added_tags;
    into.updated_tags += from.updated_tags;
    into.expunged_tags += from.expunged_tags;
    into.total_saved_searches += from.total_saved_searches;
    into.added_saved_searches += from.added_saved_searches;
    into.updated_saved_searches += from.updated_saved_searches;
    into.expunged_saved_searches += from.expunged_saved_searches;
    into.total_linked_notebooks += from.total_linked_notebooks;
    into.added_linked_notebooks += from.added_linked_notebooks;
    into.updated_linked_notebooks += from.updated_linked_notebooks;
    into.expunged_linked_notebooks += from.expunged_linked_notebooks;
    into.total_notes += from.total_notes;
    into.added_notes += from.added_notes;
    into.updated_notes += from.updated_notes;
    into.expunged_notes += from.expunged_notes;
    into.total_resources += from.total_resources;
    into.added_resources += from.added_resources;
    into.updated_resources += from.updated_resources;
    into.expunged_resources += from.expunged_resources;
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

fn merge_send_status(into: &mut evercore_core::domain::SendStatus, mut from: evercore_core::domain::SendStatus) {
    into.total_attempted_to_send_notebooks += from.total_attempted_to_send_notebooks;
    into.total_attempted_to_send_tags += from.total_attempted_to_send_tags;
    into.total_attempted_to_send_saved_searches += from.total_attempted_to_send_saved_searches;
    into.total_attempted_to_send_notes += from.total_attempted_to_send_notes;
    into.total_successfully_sent_notebooks += from.total_successfully_sent_notebooks;
    into.total_successfully_sent_tags += from.total_successfully_sent_tags;
    into.total_successfully_sent_saved_searches += from.total_successfully_sent_saved_searches;
    into.total_successfully_sent_notes += from.total_successfully_sent_notes;
    into.failed_to_send_notebooks.append(&mut from.failed_to_send_notebooks);
    into.failed_to_send_tags.append(&mut from.failed_to_send_tags);
    into.failed_to_send_saved_searches.append(&mut from.failed_to_send_saved_searches);
    into.failed_to_send_notes.append(&mut from.failed_to_send_notes);
    if let Some(usn) = from.highest_assigned_usn {
        into.record_sent_usn(usn);
    }
    if from.stop_synchronization_error.is_some() {
        into.stop_synchronization_error = from.stop_synchronization_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks_storage::SyncChunksStorage;
    use crate::full_data::FullDataDownloader;
    use crate::keychain::InMemoryKeychain;
    use crate::store_factory::tests::FakeNoteStoreFactory;
    use evercore_conflict::DefaultConflictResolver;
    use evercore_core::canceler::ManualCanceler;
    use evercore_core::domain::AuthenticationInfo;
    use evercore_core::memory_storage::InMemoryLocalStorage;

    struct ImmediateAuthenticator;

    #[async_trait::async_trait]
    impl crate::auth_provider::IInteractiveAuthenticator for ImmediateAuthenticator {
        async fn authenticate_new_account(&self) -> SyncResult<AuthenticationInfo> {
            Ok(sample_auth())
        }
        async fn refresh(&self, user_id: UserId) -> SyncResult<AuthenticationInfo> {
            let mut info = sample_auth();
            info.user_id = user_id;
            Ok(info)
        }
    }

    fn sample_auth() -> AuthenticationInfo {
        AuthenticationInfo {
            user_id: UserId::new(1),
            auth_token: "tok".into(),
            auth_token_expiration_time: evercore_core::domain::Timestamp::from_millis(i64::MAX),
            authentication_time: evercore_core::domain::Timestamp::from_millis(0),
            shard_id: "s1".into(),
            note_store_url: "https://example.com".into(),
            web_api_url_prefix: "https://example.com/".into(),
            user_store_cookies: vec![],
        }
    }

    #[tokio::test]
    async fn empty_account_converges_to_done_with_no_stop_error() {
        let data_dir = tempfile::tempdir().unwrap();
        let chunks_storage = Arc::new(SyncChunksStorage::new(data_dir.path()));
        let sync_state_store = SyncStateStore::new(data_dir.path());
        let storage: Arc<dyn ILocalStorage> = Arc::new(InMemoryLocalStorage::new());
        let note_store_factory: Arc<dyn INoteStoreFactory> = Arc::new(FakeNoteStoreFactory::default());
        let auth_provider = Arc::new(AuthenticationInfoProvider::new(
            "evercore",
            "evercore-sync",
            Arc::new(InMemoryKeychain::new()),
            Arc::new(ImmediateAuthenticator),
            note_store_factory.clone(),
        ));
        let options = SyncOptions::default();
        let downloader = Arc::new(Downloader::new(
            Arc::new(ChunksProvider::new(chunks_storage)),
            Arc::new(FullDataDownloader::new(options.max_in_flight_downloads)),
            Arc::new(DefaultConflictResolver::default()),
        ));
        let sender = Arc::new(Sender::new());

        let synchronizer = AccountSynchronizer::new(
            auth_provider,
            note_store_factory,
            storage,
            sync_state_store,
            downloader,
            sender,
            options,
        );

        let canceler = ManualCanceler::new();
        let result = synchronizer.run(UserId::new(1), &canceler).await.unwrap();
        assert!(result.stop_synchronization_error.is_none());
        assert_eq!(result.user_account_sync_chunks_data_counters.total_notebooks, 0);
    }
}
