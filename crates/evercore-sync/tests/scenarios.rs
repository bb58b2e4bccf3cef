//! End-to-end account-synchronizer scenarios driven against a scriptable
//! remote, exercising the Downloading/Sending loop the way `evercore-cli`'s
//! `sync` command drives it, rather than unit-testing one collaborator at a
//! time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use evercore_conflict::DefaultConflictResolver;
use evercore_core::canceler::{Canceler, ManualCanceler};
use evercore_core::domain::{
    AuthenticationInfo, Guid, LinkedNotebook, LocalId, Note, Notebook, Resource, SavedSearch, StopSynchronizationError,
    SyncChunk, SyncOptions, Tag, Timestamp, Usn, UserId,
};
use evercore_core::error::{CoreError, CoreResult};
use evercore_core::memory_storage::InMemoryLocalStorage;
use evercore_core::ports::remote::{NoteResultSpec, RequestContext, ResourceOptions, SyncChunkFilter};
use evercore_core::ports::{Affiliation, ILocalStorage, INoteStore, IUserStore, RemoteUser, TagNotesRelation};
use evercore_sync::auth_provider::{AuthenticationInfoProvider, IInteractiveAuthenticator};
use evercore_sync::chunks_downloader::ChunksProvider;
use evercore_sync::chunks_storage::SyncChunksStorage;
use evercore_sync::full_data::FullDataDownloader;
use evercore_sync::keychain::InMemoryKeychain;
use evercore_sync::store_factory::INoteStoreFactory;
use evercore_sync::sync_state_store::SyncStateStore;
use evercore_sync::{AccountSynchronizer, Downloader, Sender, SyncResult};

fn sample_auth() -> AuthenticationInfo {
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

struct ImmediateAuthenticator;

#[async_trait]
impl IInteractiveAuthenticator for ImmediateAuthenticator {
    async fn authenticate_new_account(&self) -> SyncResult<AuthenticationInfo> {
        Ok(sample_auth())
    }
    async fn refresh(&self, user_id: UserId) -> SyncResult<AuthenticationInfo> {
        let mut info = sample_auth();
        info.user_id = user_id;
        Ok(info)
    }
}

/// One scripted reply to a single `get_sync_chunk` call.
enum ChunkReply {
    Chunk(SyncChunk),
    RateLimit(i32),
    AuthExpired,
}

/// A note-store double whose `get_sync_chunk` replies are scripted in call
/// order (not keyed by cursor), and whose create/update calls can be told to
/// fail with an auth-expired error a fixed number of times before succeeding
/// — enough to drive S2, S5 and S6 without a full wire protocol.
#[derive(Default)]
struct ScriptedNoteStore {
    chunk_replies: Mutex<VecDeque<ChunkReply>>,
    auth_expired_budget: AtomicU32,
    /// Number of remaining `get_note_with_result_spec` calls that should
    /// fail with a rate-limit error before the full note body is served.
    note_rate_limit_budget: AtomicU32,
    next_usn: AtomicU32,
    created_notes: Mutex<Vec<Note>>,
}

impl ScriptedNoteStore {
    fn next_usn(&self) -> Usn {
        Usn::new(self.next_usn.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl INoteStore for ScriptedNoteStore {
    async fn get_sync_chunk(
        &self,
        after_usn: Usn,
        _max_entries: u32,
        _filter: &SyncChunkFilter,
        _ctx: &RequestContext,
    ) -> CoreResult<SyncChunk> {
        let reply = self.chunk_replies.lock().unwrap().pop_front();
        match reply {
            Some(ChunkReply::Chunk(chunk)) => Ok(chunk),
            Some(ChunkReply::RateLimit(seconds)) => {
                Err(CoreError::RemoteTransport(format!("rate_limit:{seconds}")))
            }
            Some(ChunkReply::AuthExpired) => Err(CoreError::RemoteTransport("auth_expired".into())),
            None => Ok(SyncChunk {
                low_usn: after_usn,
                high_usn: after_usn,
                server_usn: after_usn,
                ..Default::default()
            }),
        }
    }

    /// Fails with a rate-limit error while the budget is non-zero, then
    /// serves a minimal body for the requested guid — the full-body download
    /// path, distinct from the chunk metadata already carried on the note.
    async fn get_note_with_result_spec(
        &self,
        guid: &Guid,
        _spec: &NoteResultSpec,
        _ctx: &RequestContext,
    ) -> CoreResult<Note> {
        if self.note_rate_limit_budget.load(Ordering::SeqCst) > 0 {
            self.note_rate_limit_budget.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::RemoteTransport("rate_limit:1".into()));
        }
        Ok(Note {
            guid: Some(guid.clone()),
            local_id: LocalId::new(),
            update_sequence_num: Some(self.next_usn()),
            is_dirty: false,
            is_locally_deleted: false,
            title: Some("nA".into()),
            content: Some("body".into()),
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        })
    }

    async fn get_resource(
        &self,
        _guid: &Guid,
        _options: &ResourceOptions,
        _ctx: &RequestContext,
    ) -> CoreResult<Resource> {
        Err(CoreError::RemoteTransport("resource bodies not scripted in this scenario".into()))
    }

    async fn create_notebook(&self, mut notebook: Notebook, _ctx: &RequestContext) -> CoreResult<Notebook> {
        notebook.update_sequence_num = Some(self.next_usn());
        Ok(notebook)
    }

    async fn update_notebook(&self, _notebook: Notebook, _ctx: &RequestContext) -> CoreResult<Usn> {
        Ok(self.next_usn())
    }

    async fn expunge_notebook(&self, _guid: &Guid, _ctx: &RequestContext) -> CoreResult<Usn> {
        Ok(self.next_usn())
    }

    async fn create_tag(&self, mut tag: Tag, _ctx: &RequestContext) -> CoreResult<Tag> {
        tag.update_sequence_num = Some(self.next_usn());
        Ok(tag)
    }

    async fn update_tag(&self, _tag: Tag, _ctx: &RequestContext) -> CoreResult<Usn> {
        Ok(self.next_usn())
    }

    async fn expunge_tag(&self, _guid: &Guid, _ctx: &RequestContext) -> CoreResult<Usn> {
        Ok(self.next_usn())
    }

    async fn create_saved_search(&self, mut search: SavedSearch, _ctx: &RequestContext) -> CoreResult<SavedSearch> {
        search.update_sequence_num = Some(self.next_usn());
        Ok(search)
    }

    async fn update_saved_search(&self, _search: SavedSearch, _ctx: &RequestContext) -> CoreResult<Usn> {
        Ok(self.next_usn())
    }

    /// Fails with `auth_expired` while the budget is non-zero, then succeeds
    /// and idempotently returns the same client-provided identity (matched
    /// by `local_id`, standing in for a client-token match) rather than a
    /// second distinct item, the way a real create-with-client-token retry
    /// would never duplicate the note server-side.
    async fn create_note(&self, mut note: Note, _ctx: &RequestContext) -> CoreResult<Note> {
        if self.auth_expired_budget.load(Ordering::SeqCst) > 0 {
            self.auth_expired_budget.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::RemoteTransport("auth_expired".into()));
        }
        let mut created = self.created_notes.lock().unwrap();
        if let Some(existing) = created.iter().find(|n: &&Note| n.local_id == note.local_id) {
            return Ok(existing.clone());
        }
        note.update_sequence_num = Some(self.next_usn());
        created.push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, _note: Note, _ctx: &RequestContext) -> CoreResult<Usn> {
        Ok(self.next_usn())
    }

    async fn authenticate_to_shared_notebook(
        &self,
        _linked_notebook: &LinkedNotebook,
        _ctx: &RequestContext,
    ) -> CoreResult<AuthenticationInfo> {
        Err(CoreError::RemoteTransport("no linked notebooks scripted in this scenario".into()))
    }
}

struct ScriptedUserStore;

#[async_trait]
impl IUserStore for ScriptedUserStore {
    async fn get_user(&self, _ctx: &RequestContext) -> CoreResult<RemoteUser> {
        Ok(RemoteUser { id: UserId::new(1), username: Some("demo".into()), email: None, shard_id: Some("s1".into()) })
    }
}

struct ScriptedNoteStoreFactory {
    store: Arc<ScriptedNoteStore>,
}

impl INoteStoreFactory for ScriptedNoteStoreFactory {
    fn note_store_for_user(&self, _account: &AuthenticationInfo) -> Arc<dyn INoteStore> {
        self.store.clone()
    }
    fn note_store_for_linked_notebook(&self, _linked_notebook_url: &str) -> Arc<dyn INoteStore> {
        self.store.clone()
    }
    fn user_store(&self, _account: &AuthenticationInfo) -> Arc<dyn IUserStore> {
        Arc::new(ScriptedUserStore)
    }
}

struct Harness {
    synchronizer: AccountSynchronizer,
    storage: Arc<dyn ILocalStorage>,
}

fn build_harness(store: Arc<ScriptedNoteStore>) -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let chunks_storage = Arc::new(SyncChunksStorage::new(data_dir.path()));
    let sync_state_store = SyncStateStore::new(data_dir.path());
    let storage: Arc<dyn ILocalStorage> = Arc::new(InMemoryLocalStorage::new());
    let note_store_factory: Arc<dyn INoteStoreFactory> = Arc::new(ScriptedNoteStoreFactory { store });
    let auth_provider = Arc::new(AuthenticationInfoProvider::new(
        "evercore",
        "evercore-sync-scenarios",
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

    let synchronizer =
        AccountSynchronizer::new(auth_provider, note_store_factory, storage.clone(), sync_state_store, downloader, sender, options);

    Harness { synchronizer, storage }
}

fn notebook(name: &str, usn: u32) -> Notebook {
    Notebook {
        guid: Some(Guid::new("11111111-1111-1111-1111-111111111111").unwrap()),
        local_id: LocalId::new(),
        update_sequence_num: Some(Usn::new(usn)),
        is_dirty: false,
        is_locally_deleted: false,
        name: Some(name.into()),
        linked_notebook_guid: None,
    }
}

fn tag(guid: &str, parent: Option<&str>, name: &str, usn: u32) -> Tag {
    Tag {
        guid: Some(Guid::new(guid).unwrap()),
        local_id: LocalId::new(),
        update_sequence_num: Some(Usn::new(usn)),
        is_dirty: false,
        is_locally_deleted: false,
        name: Some(name.into()),
        parent_guid: parent.map(|g| Guid::new(g).unwrap()),
        linked_notebook_guid: None,
    }
}

fn note(notebook_guid: &str, tag_guids: Vec<Guid>, usn: u32) -> Note {
    Note {
        guid: Some(Guid::new("33333333-3333-3333-3333-333333333333").unwrap()),
        local_id: LocalId::new(),
        update_sequence_num: Some(Usn::new(usn)),
        is_dirty: false,
        is_locally_deleted: false,
        title: Some("nA".into()),
        content: Some("body".into()),
        notebook_guid: Some(Guid::new(notebook_guid).unwrap()),
        tag_guids,
        resource_guids: vec![],
    }
}

/// S2 — first sync, small remote: one notebook, a parent+child tag pair, one
/// note, all in a single chunk.
#[tokio::test]
async fn s2_first_sync_small_remote_populates_local_storage() {
    let nb = notebook("nbA", 4);
    let t1 = tag("22222222-0000-0000-0000-000000000001", None, "t1", 1);
    let t2 = tag("22222222-0000-0000-0000-000000000002", Some("22222222-0000-0000-0000-000000000001"), "t2", 2);
    let n = note("11111111-1111-1111-1111-111111111111", vec![t2.guid.clone().unwrap()], 5);

    let chunk = SyncChunk {
        low_usn: Usn::new(0),
        high_usn: Usn::new(5),
        server_usn: Usn::new(5),
        notebooks: vec![nb],
        tags: vec![t1, t2],
        notes: vec![n],
        ..Default::default()
    };

    let store = Arc::new(ScriptedNoteStore::default());
    store.chunk_replies.lock().unwrap().push_back(ChunkReply::Chunk(chunk));
    let harness = build_harness(store);

    let canceler: Canceler = ManualCanceler::new();
    let result = harness.synchronizer.run(UserId::new(1), &canceler).await.unwrap();

    assert!(result.stop_synchronization_error.is_none());
    assert_eq!(result.user_account_sync_chunks_data_counters.added_notebooks, 1);
    assert_eq!(result.user_account_sync_chunks_data_counters.added_tags, 2);
    assert_eq!(result.user_account_sync_chunks_data_counters.added_notes, 1);
    assert_eq!(result.sync_state.user_data_update_count, Usn::new(5));

    let notebooks = harness.storage.list_notebooks(Affiliation::UserOwn).await.unwrap();
    assert_eq!(notebooks.len(), 1);
    let tags = harness.storage.list_tags(Affiliation::UserOwn, TagNotesRelation::Any).await.unwrap();
    assert_eq!(tags.len(), 2);
    let found_note = harness
        .storage
        .find_note_by_guid(&Guid::new("33333333-3333-3333-3333-333333333333").unwrap())
        .await
        .unwrap();
    assert!(found_note.is_some());
}

/// S5 — rate-limit mid-pagination: the server serves one chunk, then
/// returns a rate limit while the downloader asks for the next page of
/// chunk metadata (as opposed to a per-note full-body fetch). The run must
/// not propagate a hard error: it advances `SyncState` to the first chunk's
/// `highUsn`, sleeps inside `run`'s own retry loop, and on the next
/// `get_sync_chunk` call (the server now reporting nothing further) finishes
/// the round normally.
#[tokio::test]
async fn s5_rate_limit_during_chunk_pagination_reports_then_recovers() {
    let nb = notebook("nbA", 2);
    let first = SyncChunk {
        low_usn: Usn::new(0),
        high_usn: Usn::new(2),
        server_usn: Usn::new(4),
        notebooks: vec![nb],
        ..Default::default()
    };

    let store = Arc::new(ScriptedNoteStore::default());
    {
        let mut replies = store.chunk_replies.lock().unwrap();
        replies.push_back(ChunkReply::Chunk(first));
        replies.push_back(ChunkReply::RateLimit(1));
    }
    let harness = build_harness(store);

    let canceler: Canceler = ManualCanceler::new();
    let result = harness.synchronizer.run(UserId::new(1), &canceler).await.unwrap();

    assert!(result.stop_synchronization_error.is_none());
    assert_eq!(result.sync_state.user_data_update_count, Usn::new(2));
    assert_eq!(result.user_account_sync_chunks_data_counters.added_notebooks, 1);
    let notebooks = harness.storage.list_notebooks(Affiliation::UserOwn).await.unwrap();
    assert_eq!(notebooks.len(), 1);
}

/// A rate limit hit during a note's full-body download (a distinct stop
/// path from S5's chunk-pagination rate limit) is equally self-healing: the
/// chunk carrying the note is already cached, so the cache-replayed retry
/// finds it without re-fetching chunk metadata at all.
#[tokio::test]
async fn rate_limit_mid_full_body_download_reports_then_recovers() {
    let n = note("11111111-1111-1111-1111-111111111111", vec![], 2);
    let chunk = SyncChunk {
        low_usn: Usn::new(0),
        high_usn: Usn::new(2),
        server_usn: Usn::new(2),
        notes: vec![n],
        ..Default::default()
    };

    let store = Arc::new(ScriptedNoteStore::default());
    store.chunk_replies.lock().unwrap().push_back(ChunkReply::Chunk(chunk));
    // Fails the note's full-body download once; the retry (replayed from the
    // on-disk chunk cache) finds the budget exhausted and succeeds.
    store.note_rate_limit_budget.store(1, Ordering::SeqCst);
    let harness = build_harness(store);

    let canceler: Canceler = ManualCanceler::new();
    let result = harness.synchronizer.run(UserId::new(1), &canceler).await.unwrap();

    assert!(result.stop_synchronization_error.is_none());
    assert_eq!(result.sync_state.user_data_update_count, Usn::new(2));
    let found_note = harness
        .storage
        .find_note_by_guid(&Guid::new("33333333-3333-3333-3333-333333333333").unwrap())
        .await
        .unwrap();
    assert!(found_note.is_some());
}

/// S6 — auth expired mid-send: creating a note fails with `auth_expired`
/// once; the engine refreshes and retries, and the retry must not produce a
/// duplicate note (the create is keyed by the same local identity both
/// times).
#[tokio::test]
async fn s6_auth_expired_mid_send_recovers_without_duplicate_note() {
    let store = Arc::new(ScriptedNoteStore::default());
    store.auth_expired_budget.store(1, Ordering::SeqCst);
    let harness = build_harness(store.clone());

    let dirty_note = Note {
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
    harness.storage.put_note(dirty_note).await.unwrap();

    let canceler: Canceler = ManualCanceler::new();
    let result = harness.synchronizer.run(UserId::new(1), &canceler).await.unwrap();

    assert!(result.stop_synchronization_error.is_none());
    assert_eq!(result.user_account_send_status.total_successfully_sent_notes, 1);
    assert!(harness.storage.list_dirty_notes().await.unwrap().is_empty());
    assert_eq!(store.created_notes.lock().unwrap().len(), 1);
}
