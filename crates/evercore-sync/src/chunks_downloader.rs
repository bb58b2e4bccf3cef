//! Sync-chunks downloader & provider (§4.5).
//!
//! The downloader fetches chunks starting at `afterUsn` until the server
//! reports it is caught up, writing each one to the on-disk cache as it
//! arrives. The provider wraps it: already-cached chunks are served from
//! disk first, then the remainder is fetched remotely.

use evercore_core::canceler::Canceler;
use evercore_core::domain::{StopSynchronizationError, SyncChunk, Usn};
use evercore_core::ports::remote::{RequestContext, SyncChunkFilter};
use evercore_core::ports::INoteStore;
use tracing::debug;

use crate::chunks_storage::{ChunkScope, SyncChunksStorage};
use crate::error::{SyncError, SyncResult};
use crate::remote_error::{classify_remote_error, RemoteErrorClass};

/// Chunks are requested in batches no larger than this many entries per
/// category; the server may return fewer.
pub const DEFAULT_MAX_ENTRIES: u32 = 200;

/// Chunks fetched by one `download_from` pagination run, and — if
/// pagination stopped early because the server reported a rate limit or an
/// expired auth token rather than because it was caught up — the condition
/// that ended it. `chunks` always reflects everything fetched before the
/// stop, so the caller can apply it and resume from there.
#[derive(Debug, Default)]
pub struct DownloadedChunks {
    pub chunks: Vec<SyncChunk>,
    pub stop: Option<StopSynchronizationError>,
}

/// Fetches chunks from `after_usn` onward until the server is caught up,
/// caching each chunk in `chunk_cache` as soon as it arrives so partial
/// progress survives a mid-pagination failure of any kind. A rate-limit or
/// auth-expired response ends pagination without failing the call — the
/// caller is expected to retry later starting from the last cached chunk.
/// Any other remote failure is surfaced as a hard error; whatever chunks
/// were cached before it remain usable on the next attempt.
#[tracing::instrument(skip(chunk_cache, note_store, ctx, canceler))]
pub async fn download_from(
    scope: &ChunkScope,
    chunk_cache: &SyncChunksStorage,
    note_store: &dyn INoteStore,
    after_usn: u32,
    ctx: &RequestContext,
    canceler: &Canceler,
) -> SyncResult<DownloadedChunks> {
    let mut chunks = Vec::new();
    let mut cursor = after_usn;

    loop {
        if canceler.is_canceled() {
            return Err(SyncError::Cancelled);
        }

        let call_ctx = ctx.cloned_for_new_call();
        let result = note_store
            .get_sync_chunk(Usn::new(cursor), DEFAULT_MAX_ENTRIES, &SyncChunkFilter::everything(), &call_ctx)
            .await;

        let chunk = match result {
            Ok(chunk) => chunk,
            Err(err) => {
                let stop = match classify_remote_error(&err) {
                    RemoteErrorClass::RateLimit(seconds) => StopSynchronizationError::rate_limit(seconds),
                    RemoteErrorClass::AuthExpired => StopSynchronizationError::AuthenticationExpired,
                    RemoteErrorClass::Other => return Err(SyncError::Core(err)),
                };
                return Ok(DownloadedChunks { chunks, stop: Some(stop) });
            }
        };

        let finished_empty = chunk.high_usn.value() == cursor;
        let has_more = chunk.has_more();
        cursor = chunk.high_usn.value();
        debug!(low = chunk.low_usn.value(), high = chunk.high_usn.value(), server = chunk.server_usn.value(), "fetched sync chunk");

        if finished_empty {
            break;
        }
        chunk_cache.put(scope, std::slice::from_ref(&chunk)).await?;
        chunks.push(chunk);
        if !has_more {
            break;
        }
    }

    Ok(DownloadedChunks { chunks, stop: None })
}

/// Merges the on-disk cache with a live remote fetch for one scope.
pub struct ChunksProvider {
    storage: std::sync::Arc<SyncChunksStorage>,
}

impl ChunksProvider {
    #[must_use]
    pub fn new(storage: std::sync::Arc<SyncChunksStorage>) -> Self {
        Self { storage }
    }

    /// Returns every chunk with `highUsn > after_usn`, serving the cached
    /// prefix first and downloading the remainder. If the download stopped
    /// early on a rate limit or auth expiry, that is reported alongside the
    /// chunks actually obtained rather than failing the call.
    #[tracing::instrument(skip(self, note_store, ctx, canceler))]
    pub async fn fetch(
        &self,
        scope: &ChunkScope,
        note_store: &dyn INoteStore,
        after_usn: u32,
        ctx: &RequestContext,
        canceler: &Canceler,
    ) -> SyncResult<DownloadedChunks> {
        let mut cached = self.storage.fetch_relevant(scope, after_usn).await?;
        cached.sort_by_key(|chunk| chunk.low_usn);

        let resume_from = cached
            .last()
            .map(|chunk| chunk.high_usn.value())
            .unwrap_or(after_usn);

        let downloaded = download_from(scope, &self.storage, note_store, resume_from, ctx, canceler).await?;
        cached.extend(downloaded.chunks);
        Ok(DownloadedChunks { chunks: cached, stop: downloaded.stop })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_factory::tests::FakeNoteStoreFactory;
    use evercore_core::canceler::ManualCanceler;
    use crate::store_factory::INoteStoreFactory as _;
    use evercore_core::domain::AuthenticationInfo;

    fn auth() -> AuthenticationInfo {
        AuthenticationInfo {
            user_id: evercore_core::domain::UserId::new(1),
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
    async fn provider_serves_cache_then_downloads_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let storage = std::sync::Arc::new(SyncChunksStorage::new(dir.path()));
        storage
            .put(
                &ChunkScope::UserOwn,
                &[SyncChunk {
                    low_usn: Usn::new(0),
                    high_usn: Usn::new(10),
                    server_usn: Usn::new(10),
                    ..Default::default()
                }],
            )
            .await
            .unwrap();

        let factory = FakeNoteStoreFactory::default();
        let note_store = factory.note_store_for_user(&auth());
        let provider = ChunksProvider::new(storage);
        let canceler: Canceler = ManualCanceler::new();
        let ctx = RequestContext::new("tok");

        let fetched = provider
            .fetch(&ChunkScope::UserOwn, note_store.as_ref(), 0, &ctx, &canceler)
            .await
            .unwrap();

        assert!(fetched.stop.is_none());
        assert_eq!(fetched.chunks[0].low_usn, Usn::new(0));
    }

    #[tokio::test]
    async fn cancellation_before_first_chunk_yields_no_fetch() {
        let factory = FakeNoteStoreFactory::default();
        let note_store = factory.note_store_for_user(&auth());
        let canceler = ManualCanceler::new();
        canceler.cancel();
        let ctx = RequestContext::new("tok");
        let dir = tempfile::tempdir().unwrap();
        let chunk_cache = SyncChunksStorage::new(dir.path());

        let result = download_from(&ChunkScope::UserOwn, &chunk_cache, note_store.as_ref(), 0, &ctx, &canceler).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
