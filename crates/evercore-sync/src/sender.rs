//! Sender (§4.9): enumerates dirty local items in a fixed order and pushes
//! them to the server, dispatching create-vs-update by guid presence and
//! handling per-item validation failures, conflicts, rate-limit, and
//! auth-expiry the same way the downloader's processors do.

use std::collections::HashSet;

use evercore_core::canceler::Canceler;
use evercore_core::domain::{
    ConflictResolution, FailedItem, Note, Notebook, SavedSearch, SendStatus, StopSynchronizationError, Tag,
};
use evercore_core::ports::remote::RequestContext;
use evercore_core::ports::{IConflictResolver, ILocalStorage, INoteStore};
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::processors::topologically_sort_tags;
use crate::remote_error::{classify_remote_error, RemoteErrorClass};

enum Outcome {
    Sent(evercore_core::domain::Usn),
    Deferred,
}

enum Failure {
    Stop(StopSynchronizationError),
    Item(String),
}

/// The wire port used here has no structured "conflict" signal on
/// create/update (no comparable remote version is returned alongside a
/// rejection), so a send-time conflict cannot be resolved inline the way a
/// download-time one can. Instead, an item the server rejected for being
/// stale stays dirty; the account synchronizer's next download half-round
/// (triggered whenever a send raises the server's USN past what was read at
/// send-start) re-fetches it and lets the §4.6 processors apply the usual
/// resolution. `resolve_note_send_conflict` below is kept as the seam a
/// richer wire client could call if it ever does surface that signal.
pub struct Sender;

impl Sender {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Sends every dirty local item for one scope, in the fixed order
    /// saved-searches → tags → notebooks → notes → expunges.
    #[tracing::instrument(skip(self, note_store, storage, ctx, canceler))]
    pub async fn send_scope(
        &self,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
        canceler: &Canceler,
    ) -> SyncResult<SendStatus> {
        let mut status = SendStatus::default();

        if self
            .send_saved_searches(note_store, storage, ctx, canceler, &mut status)
            .await?
        {
            return Ok(status);
        }
        if self.send_tags(note_store, storage, ctx, canceler, &mut status).await? {
            return Ok(status);
        }
        let unsent_notebooks = self
            .send_notebooks(note_store, storage, ctx, canceler, &mut status)
            .await?;
        if status.stop_synchronization_error.is_some() {
            return Ok(status);
        }
        if self
            .send_notes(note_store, storage, ctx, canceler, &mut status, &unsent_notebooks)
            .await?
        {
            return Ok(status);
        }
        self.send_expunges(note_store, storage, ctx, canceler, &mut status).await?;

        Ok(status)
    }

    async fn send_saved_searches(
        &self,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
        canceler: &Canceler,
        status: &mut SendStatus,
    ) -> SyncResult<bool> {
        for search in storage.list_dirty_saved_searches().await? {
            if search.is_locally_deleted {
                continue;
            }
            if canceler.is_canceled() {
                return Err(crate::error::SyncError::Cancelled);
            }
            status.total_attempted_to_send_saved_searches += 1;
            let guid_for_failure = search.guid.clone().unwrap_or_else(placeholder_guid);

            match self.upsert_saved_search(search, note_store, storage, ctx).await {
                Ok(Outcome::Sent(usn)) => {
                    status.total_successfully_sent_saved_searches += 1;
                    status.record_sent_usn(usn);
                }
                Ok(Outcome::Deferred) => {}
                Err(Failure::Stop(stop)) => {
                    status.stop_synchronization_error = Some(stop);
                    return Ok(true);
                }
                Err(Failure::Item(reason)) => status
                    .failed_to_send_saved_searches
                    .push(FailedItem { item: guid_for_failure, reason }),
            }
        }
        Ok(false)
    }

    async fn upsert_saved_search(
        &self,
        search: SavedSearch,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
    ) -> Result<Outcome, Failure> {
        let call_ctx = ctx.cloned_for_new_call();
        let result = match &search.guid {
            None => note_store
                .create_saved_search(search.clone(), &call_ctx)
                .await
                .map(|created| created.update_sequence_num.unwrap_or(evercore_core::domain::Usn::ZERO)),
            Some(_) => note_store.update_saved_search(search.clone(), &call_ctx).await,
        };

        match result {
            Ok(usn) => {
                let mut clean = search;
                clean.is_dirty = false;
                clean.update_sequence_num = Some(usn);
                storage.put_saved_search(clean).await.map_err(|err| Failure::Item(err.to_string()))?;
                Ok(Outcome::Sent(usn))
            }
            Err(err) => classify_send_failure(err),
        }
    }

    async fn send_tags(
        &self,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
        canceler: &Canceler,
        status: &mut SendStatus,
    ) -> SyncResult<bool> {
        let dirty: Vec<Tag> = storage
            .list_dirty_tags()
            .await?
            .into_iter()
            .filter(|tag| !tag.is_locally_deleted)
            .collect();
        let ordered = topologically_sort_tags(&dirty)?;

        for tag in ordered {
            if canceler.is_canceled() {
                return Err(crate::error::SyncError::Cancelled);
            }
            status.total_attempted_to_send_tags += 1;
            let guid_for_failure = tag.guid.clone().unwrap_or_else(placeholder_guid);

            match self.upsert_tag(tag, note_store, storage, ctx).await {
                Ok(Outcome::Sent(usn)) => {
                    status.total_successfully_sent_tags += 1;
                    status.record_sent_usn(usn);
                }
                Ok(Outcome::Deferred) => {}
                Err(Failure::Stop(stop)) => {
                    status.stop_synchronization_error = Some(stop);
                    return Ok(true);
                }
                Err(Failure::Item(reason)) => {
                    status.failed_to_send_tags.push(FailedItem { item: guid_for_failure, reason })
                }
            }
        }
        Ok(false)
    }

    async fn upsert_tag(
        &self,
        tag: Tag,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
    ) -> Result<Outcome, Failure> {
        let call_ctx = ctx.cloned_for_new_call();
        let result = match &tag.guid {
            None => note_store
                .create_tag(tag.clone(), &call_ctx)
                .await
                .map(|created| created.update_sequence_num.unwrap_or(evercore_core::domain::Usn::ZERO)),
            Some(_) => note_store.update_tag(tag.clone(), &call_ctx).await,
        };

        match result {
            Ok(usn) => {
                let mut clean = tag;
                clean.is_dirty = false;
                clean.update_sequence_num = Some(usn);
                storage.put_tag(clean).await.map_err(|err| Failure::Item(err.to_string()))?;
                Ok(Outcome::Sent(usn))
            }
            Err(err) => classify_send_failure(err),
        }
    }

    async fn send_notebooks(
        &self,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
        canceler: &Canceler,
        status: &mut SendStatus,
    ) -> SyncResult<HashSet<evercore_core::domain::Guid>> {
        let mut unsent = HashSet::new();

        for notebook in storage.list_dirty_notebooks().await? {
            if notebook.is_locally_deleted {
                continue;
            }
            if canceler.is_canceled() {
                return Err(crate::error::SyncError::Cancelled);
            }
            status.total_attempted_to_send_notebooks += 1;
            let guid_for_failure = notebook.guid.clone().unwrap_or_else(placeholder_guid);

            match self.upsert_notebook(notebook, note_store, storage, ctx).await {
                Ok(Outcome::Sent(usn)) => {
                    status.total_successfully_sent_notebooks += 1;
                    status.record_sent_usn(usn);
                }
                Ok(Outcome::Deferred) => {
                    unsent.insert(guid_for_failure);
                }
                Err(Failure::Stop(stop)) => {
                    status.stop_synchronization_error = Some(stop);
                    return Ok(unsent);
                }
                Err(Failure::Item(reason)) => {
                    unsent.insert(guid_for_failure.clone());
                    status.failed_to_send_notebooks.push(FailedItem { item: guid_for_failure, reason });
                }
            }
        }
        Ok(unsent)
    }

    async fn upsert_notebook(
        &self,
        notebook: Notebook,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
    ) -> Result<Outcome, Failure> {
        let call_ctx = ctx.cloned_for_new_call();
        let result = match &notebook.guid {
            None => note_store
                .create_notebook(notebook.clone(), &call_ctx)
                .await
                .map(|created| created.update_sequence_num.unwrap_or(evercore_core::domain::Usn::ZERO)),
            Some(_) => note_store.update_notebook(notebook.clone(), &call_ctx).await,
        };

        match result {
            Ok(usn) => {
                let mut clean = notebook;
                clean.is_dirty = false;
                clean.update_sequence_num = Some(usn);
                storage.put_notebook(clean).await.map_err(|err| Failure::Item(err.to_string()))?;
                Ok(Outcome::Sent(usn))
            }
            Err(err) => classify_send_failure(err),
        }
    }

    async fn send_notes(
        &self,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
        canceler: &Canceler,
        status: &mut SendStatus,
        unsent_notebooks: &HashSet<evercore_core::domain::Guid>,
    ) -> SyncResult<bool> {
        for note in storage.list_dirty_notes().await? {
            if note.is_locally_deleted {
                continue;
            }
            if let Some(notebook_guid) = &note.notebook_guid {
                if unsent_notebooks.contains(notebook_guid) {
                    debug!(?note.guid, "deferring note: owning notebook not yet sent");
                    continue;
                }
            }
            if canceler.is_canceled() {
                return Err(crate::error::SyncError::Cancelled);
            }
            status.total_attempted_to_send_notes += 1;
            let guid_for_failure = note.guid.clone().unwrap_or_else(placeholder_guid);

            match self.upsert_note(note, note_store, storage, ctx).await {
                Ok(Outcome::Sent(usn)) => {
                    status.total_successfully_sent_notes += 1;
                    status.record_sent_usn(usn);
                }
                Ok(Outcome::Deferred) => {}
                Err(Failure::Stop(stop)) => {
                    status.stop_synchronization_error = Some(stop);
                    return Ok(true);
                }
                Err(Failure::Item(reason)) => {
                    status.failed_to_send_notes.push(FailedItem { item: guid_for_failure, reason })
                }
            }
        }
        Ok(false)
    }

    async fn upsert_note(
        &self,
        note: Note,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
    ) -> Result<Outcome, Failure> {
        let call_ctx = ctx.cloned_for_new_call();
        let result = match &note.guid {
            None => note_store
                .create_note(note.clone(), &call_ctx)
                .await
                .map(|created| created.update_sequence_num.unwrap_or(evercore_core::domain::Usn::ZERO)),
            Some(_) => note_store.update_note(note.clone(), &call_ctx).await,
        };

        match result {
            Ok(usn) => {
                let mut clean = note;
                clean.is_dirty = false;
                clean.update_sequence_num = Some(usn);
                storage.put_note(clean).await.map_err(|err| Failure::Item(err.to_string()))?;
                Ok(Outcome::Sent(usn))
            }
            Err(err) => classify_send_failure(err),
        }
    }

    /// Sends local deletions. The wire contract only exposes expunge
    /// operations for notebooks and tags; saved searches and notes have no
    /// remote-expunge endpoint at this port, so a locally-deleted item in
    /// those categories is dropped from local storage without a remote
    /// round trip.
    async fn send_expunges(
        &self,
        note_store: &dyn INoteStore,
        storage: &dyn ILocalStorage,
        ctx: &RequestContext,
        canceler: &Canceler,
        status: &mut SendStatus,
    ) -> SyncResult<()> {
        for notebook in storage.list_dirty_notebooks().await? {
            if !notebook.is_locally_deleted {
                continue;
            }
            let Some(guid) = notebook.guid.clone() else { continue };
            if canceler.is_canceled() {
                return Err(crate::error::SyncError::Cancelled);
            }
            let call_ctx = ctx.cloned_for_new_call();
            match note_store.expunge_notebook(&guid, &call_ctx).await {
                Ok(usn) => {
                    storage.expunge_notebook(&guid).await?;
                    status.record_sent_usn(usn);
                }
                Err(err) => match classify_send_failure(err) {
                    Ok(_) => unreachable!(),
                    Err(Failure::Stop(stop)) => {
                        status.stop_synchronization_error = Some(stop);
                        return Ok(());
                    }
                    Err(Failure::Item(reason)) => {
                        status.failed_to_send_notebooks.push(FailedItem { item: guid, reason })
                    }
                },
            }
        }

        for tag in storage.list_dirty_tags().await? {
            if !tag.is_locally_deleted {
                continue;
            }
            let Some(guid) = tag.guid.clone() else { continue };
            if canceler.is_canceled() {
                return Err(crate::error::SyncError::Cancelled);
            }
            let call_ctx = ctx.cloned_for_new_call();
            match note_store.expunge_tag(&guid, &call_ctx).await {
                Ok(usn) => {
                    storage.expunge_tag(&guid).await?;
                    status.record_sent_usn(usn);
                }
                Err(err) => match classify_send_failure(err) {
                    Ok(_) => unreachable!(),
                    Err(Failure::Stop(stop)) => {
                        status.stop_synchronization_error = Some(stop);
                        return Ok(());
                    }
                    Err(Failure::Item(reason)) => {
                        status.failed_to_send_tags.push(FailedItem { item: guid, reason })
                    }
                },
            }
        }

        for search in storage.list_dirty_saved_searches().await? {
            if search.is_locally_deleted {
                if let Some(guid) = &search.guid {
                    warn!(%guid, "saved search expunge has no remote endpoint; dropping locally only");
                }
                storage.expunge_saved_search(&search.guid.unwrap_or_else(placeholder_guid)).await.ok();
            }
        }

        Ok(())
    }
}

fn classify_send_failure(err: evercore_core::error::CoreError) -> Result<Outcome, Failure> {
    match classify_remote_error(&err) {
        RemoteErrorClass::RateLimit(seconds) => Err(Failure::Stop(StopSynchronizationError::rate_limit(seconds))),
        RemoteErrorClass::AuthExpired => Err(Failure::Stop(StopSynchronizationError::AuthenticationExpired)),
        RemoteErrorClass::Other => Err(Failure::Item(err.to_string())),
    }
}

fn placeholder_guid() -> evercore_core::domain::Guid {
    evercore_core::domain::Guid::new("00000000-0000-0000-0000-000000000000").expect("placeholder guid is 36 chars")
}

/// Applies the conflict resolver's outcome for a note the server reported as
/// conflicting during send, mirroring §4.6's rules for a newer remote copy.
pub async fn resolve_note_send_conflict(
    resolver: &dyn IConflictResolver,
    theirs: Note,
    mine: Note,
    storage: &dyn ILocalStorage,
) -> SyncResult<()> {
    match resolver.resolve_note_conflict(theirs.clone(), mine).await? {
        ConflictResolution::UseTheirs | ConflictResolution::IgnoreMine => {
            storage.put_note(theirs).await?;
        }
        ConflictResolution::UseMine => {}
        ConflictResolution::MoveMine(moved) => {
            storage.put_note(moved).await?;
            storage.put_note(theirs).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_factory::tests::FakeNoteStoreFactory;
    use crate::store_factory::INoteStoreFactory as _;
    use evercore_core::canceler::ManualCanceler;
    use evercore_core::domain::{AuthenticationInfo, LocalId, Timestamp, UserId};
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
    async fn sends_new_saved_search_and_marks_it_clean() {
        let storage = InMemoryLocalStorage::new();
        let search = SavedSearch {
            guid: None,
            local_id: LocalId::new(),
            update_sequence_num: None,
            is_dirty: true,
            is_locally_deleted: false,
            name: Some("query".into()),
            query: "tag:foo".into(),
        };
        storage.put_saved_search(search).await.unwrap();

        let factory = FakeNoteStoreFactory::default();
        let note_store = factory.note_store_for_user(&auth());
        let sender = Sender::new();
        let canceler = ManualCanceler::new();
        let ctx = RequestContext::new("tok");

        let status = sender.send_scope(note_store.as_ref(), &storage, &ctx, &canceler).await.unwrap();
        assert_eq!(status.total_successfully_sent_saved_searches, 1);
        assert!(status.failed_to_send_saved_searches.is_empty());

        let dirty = storage.list_dirty_saved_searches().await.unwrap();
        assert!(dirty.is_empty());
    }

    #[tokio::test]
    async fn sends_new_notebook_then_the_note_that_references_it() {
        let storage = InMemoryLocalStorage::new();
        let notebook = Notebook {
            guid: None,
            local_id: LocalId::new(),
            update_sequence_num: None,
            is_dirty: true,
            is_locally_deleted: false,
            name: Some("Personal".into()),
            linked_notebook_guid: None,
        };
        storage.put_notebook(notebook).await.unwrap();
        let note = Note {
            guid: None,
            local_id: LocalId::new(),
            update_sequence_num: None,
            is_dirty: true,
            is_locally_deleted: false,
            title: Some("Grocery list".into()),
            content: Some("milk, eggs".into()),
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        };
        storage.put_note(note).await.unwrap();

        let factory = FakeNoteStoreFactory::default();
        let note_store = factory.note_store_for_user(&auth());
        let sender = Sender::new();
        let canceler = ManualCanceler::new();
        let ctx = RequestContext::new("tok");

        let status = sender.send_scope(note_store.as_ref(), &storage, &ctx, &canceler).await.unwrap();
        assert_eq!(status.total_successfully_sent_notebooks, 1);
        assert_eq!(status.total_successfully_sent_notes, 1);
        assert!(storage.list_dirty_notes().await.unwrap().is_empty());
    }
}
