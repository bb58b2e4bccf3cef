//! Remote service port (driven/secondary port): the wire-protocol contract
//! consumed per §6.2. One note-store interface per endpoint (user-own plus
//! one per linked notebook), and a user-store interface.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{Guid, LinkedNotebook, Note, Notebook, Resource, SavedSearch, SyncChunk, Tag, Usn};
use crate::error::CoreResult;

/// Whether the full-data note fetch should include account-limit metadata.
/// `Yes` only for the first note of a run, to avoid redundant bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeNoteLimits {
    Yes,
    No,
}

/// What the note fetch result spec should include.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoteResultSpec {
    pub include_content: bool,
    pub include_resources_data: bool,
    pub include_resources_recognition: bool,
    pub include_note_limits: bool,
}

/// Options controlling resource fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceOptions {
    pub include_data: bool,
    pub include_recognition: bool,
    pub include_alternate_data: bool,
}

/// A filter narrowing `getSyncChunk`.
#[derive(Debug, Clone, Default)]
pub struct SyncChunkFilter {
    pub include_notebooks: bool,
    pub include_tags: bool,
    pub include_saved_searches: bool,
    pub include_notes: bool,
    pub include_resources: bool,
    pub include_linked_notebooks: bool,
    pub include_expunged: bool,
}

impl SyncChunkFilter {
    #[must_use]
    pub fn everything() -> Self {
        Self {
            include_notebooks: true,
            include_tags: true,
            include_saved_searches: true,
            include_notes: true,
            include_resources: true,
            include_linked_notebooks: true,
            include_expunged: true,
        }
    }
}

/// Bundles authentication token, cookies, connection timeout, max retry
/// count, and exponential-backoff flag for one remote call. Cloned per
/// call (new request id) and never mutated.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: uuid::Uuid,
    pub auth_token: String,
    pub cookies: Vec<crate::domain::auth::HttpCookie>,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub exponential_backoff: bool,
}

impl RequestContext {
    #[must_use]
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4(),
            auth_token: auth_token.into(),
            cookies: Vec::new(),
            connect_timeout: Duration::from_secs(30),
            max_retries: 3,
            exponential_backoff: true,
        }
    }

    /// Clone with a freshly-minted request id; the source request context is
    /// never mutated in place.
    #[must_use]
    pub fn cloned_for_new_call(&self) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4(),
            ..self.clone()
        }
    }
}

/// A note-store endpoint: either the user's own account or one linked
/// notebook.
#[async_trait]
pub trait INoteStore: Send + Sync {
    async fn get_sync_chunk(
        &self,
        after_usn: Usn,
        max_entries: u32,
        filter: &SyncChunkFilter,
        ctx: &RequestContext,
    ) -> CoreResult<SyncChunk>;

    async fn get_note_with_result_spec(
        &self,
        guid: &Guid,
        spec: &NoteResultSpec,
        ctx: &RequestContext,
    ) -> CoreResult<Note>;

    async fn get_resource(
        &self,
        guid: &Guid,
        options: &ResourceOptions,
        ctx: &RequestContext,
    ) -> CoreResult<Resource>;

    async fn create_notebook(&self, notebook: Notebook, ctx: &RequestContext) -> CoreResult<Notebook>;
    async fn update_notebook(&self, notebook: Notebook, ctx: &RequestContext) -> CoreResult<Usn>;
    async fn expunge_notebook(&self, guid: &Guid, ctx: &RequestContext) -> CoreResult<Usn>;

    async fn create_tag(&self, tag: Tag, ctx: &RequestContext) -> CoreResult<Tag>;
    async fn update_tag(&self, tag: Tag, ctx: &RequestContext) -> CoreResult<Usn>;
    async fn expunge_tag(&self, guid: &Guid, ctx: &RequestContext) -> CoreResult<Usn>;

    async fn create_saved_search(
        &self,
        search: SavedSearch,
        ctx: &RequestContext,
    ) -> CoreResult<SavedSearch>;
    async fn update_saved_search(&self, search: SavedSearch, ctx: &RequestContext) -> CoreResult<Usn>;

    async fn create_note(&self, note: Note, ctx: &RequestContext) -> CoreResult<Note>;
    async fn update_note(&self, note: Note, ctx: &RequestContext) -> CoreResult<Usn>;

    async fn authenticate_to_shared_notebook(
        &self,
        linked_notebook: &LinkedNotebook,
        ctx: &RequestContext,
    ) -> CoreResult<crate::domain::AuthenticationInfo>;
}

/// A minimal user profile returned by the user-store's `getUser`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteUser {
    pub id: crate::domain::UserId,
    pub username: Option<String>,
    pub email: Option<String>,
    pub shard_id: Option<String>,
}

/// The user-store endpoint.
#[async_trait]
pub trait IUserStore: Send + Sync {
    async fn get_user(&self, ctx: &RequestContext) -> CoreResult<RemoteUser>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_context_clone_gets_new_id() {
        let ctx = RequestContext::new("tok");
        let cloned = ctx.cloned_for_new_call();
        assert_ne!(ctx.request_id, cloned.request_id);
        assert_eq!(ctx.auth_token, cloned.auth_token);
    }

    #[test]
    fn filter_everything_enables_all_categories() {
        let filter = SyncChunkFilter::everything();
        assert!(filter.include_notes);
        assert!(filter.include_expunged);
    }
}
