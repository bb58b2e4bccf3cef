//! Conflict resolver port (§4.7): an external collaborator the core
//! consumes. `evercore-conflict` ships the standard policy-driven
//! implementation; callers may also inject an interactive/manual resolver.

use async_trait::async_trait;

use crate::domain::{ConflictResolution, Note, Notebook, Resource, SavedSearch, Tag};
use crate::error::CoreResult;

#[async_trait]
pub trait IConflictResolver: Send + Sync {
    async fn resolve_notebook_conflict(
        &self,
        theirs: Notebook,
        mine: Notebook,
    ) -> CoreResult<ConflictResolution<Notebook>>;

    async fn resolve_tag_conflict(
        &self,
        theirs: Tag,
        mine: Tag,
    ) -> CoreResult<ConflictResolution<Tag>>;

    async fn resolve_saved_search_conflict(
        &self,
        theirs: SavedSearch,
        mine: SavedSearch,
    ) -> CoreResult<ConflictResolution<SavedSearch>>;

    async fn resolve_note_conflict(
        &self,
        theirs: Note,
        mine: Note,
    ) -> CoreResult<ConflictResolution<Note>>;

    /// Resources have no add/update conflict of their own (they inherit
    /// their owning note's outcome), but an expunge can still race a local
    /// edit, so they get the same expunge-time arbitration as every other
    /// category.
    async fn resolve_resource_conflict(
        &self,
        theirs: Resource,
        mine: Resource,
    ) -> CoreResult<ConflictResolution<Resource>>;
}
