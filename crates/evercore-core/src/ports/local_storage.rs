//! Local storage port (driven/secondary port).
//!
//! This is the consumed contract of §6.1: the core depends on this trait
//! for CRUD, name/guid lookup, event notification, and versioned patching.
//! Implementations (a real relational/key-value store) live outside this
//! crate; `evercore-core` only ships an in-memory reference implementation
//! for tests and the demonstration CLI.

use async_trait::async_trait;

use crate::domain::{Guid, LinkedNotebook, LocalId, Note, Notebook, Resource, SavedSearch, Tag};
use crate::error::CoreResult;

/// Listing filter for notebooks/tags scoped to linked notebooks (used by
/// the linked-notebook tags cleaner, §4.8.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    AnyLinkedNotebook,
    UserOwn,
}

/// Listing filter selecting tags that have no notes referencing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagNotesRelation {
    WithoutNotes,
    Any,
}

/// A per-category event emitted after a local-storage write. The
/// subscribable event stream stands in for the source's signal/slot
/// notifier.
#[derive(Debug, Clone)]
pub enum StorageEvent {
    NotebookPut(Notebook),
    NotebookExpunged(Guid),
    TagPut(Tag),
    TagExpunged(Guid),
    SavedSearchPut(SavedSearch),
    SavedSearchExpunged(Guid),
    NotePut(Note),
    NoteExpunged(Guid),
    ResourcePut(Resource),
    ResourceExpunged(Guid),
    LinkedNotebookPut(LinkedNotebook),
    LinkedNotebookExpunged(Guid),
}

/// A versioned schema patch: `from_version` -> `to_version`.
#[async_trait]
pub trait StoragePatch: Send + Sync {
    fn from_version(&self) -> u32;
    fn to_version(&self) -> u32;
    async fn backup(&self) -> CoreResult<()>;
    async fn apply(&self) -> CoreResult<()>;
    async fn restore(&self) -> CoreResult<()>;
    async fn remove_backup(&self) -> CoreResult<()>;
}

/// The consumed local-storage contract. Every write is all-or-nothing.
#[async_trait]
pub trait ILocalStorage: Send + Sync {
    async fn put_notebook(&self, notebook: Notebook) -> CoreResult<()>;
    async fn find_notebook_by_guid(&self, guid: &Guid) -> CoreResult<Option<Notebook>>;
    async fn find_notebook_by_name(&self, name: &str) -> CoreResult<Option<Notebook>>;
    async fn expunge_notebook(&self, guid: &Guid) -> CoreResult<()>;
    async fn list_notebooks(&self, affiliation: Affiliation) -> CoreResult<Vec<Notebook>>;
    async fn list_dirty_notebooks(&self) -> CoreResult<Vec<Notebook>>;

    async fn put_tag(&self, tag: Tag) -> CoreResult<()>;
    async fn find_tag_by_guid(&self, guid: &Guid) -> CoreResult<Option<Tag>>;
    async fn find_tag_by_name(&self, name: &str) -> CoreResult<Option<Tag>>;
    async fn expunge_tag(&self, guid: &Guid) -> CoreResult<()>;
    async fn list_tags(
        &self,
        affiliation: Affiliation,
        relation: TagNotesRelation,
    ) -> CoreResult<Vec<Tag>>;
    async fn list_dirty_tags(&self) -> CoreResult<Vec<Tag>>;

    async fn put_saved_search(&self, search: SavedSearch) -> CoreResult<()>;
    async fn find_saved_search_by_guid(&self, guid: &Guid) -> CoreResult<Option<SavedSearch>>;
    async fn find_saved_search_by_name(&self, name: &str) -> CoreResult<Option<SavedSearch>>;
    async fn expunge_saved_search(&self, guid: &Guid) -> CoreResult<()>;
    async fn list_dirty_saved_searches(&self) -> CoreResult<Vec<SavedSearch>>;

    async fn put_note(&self, note: Note) -> CoreResult<()>;
    async fn find_note_by_guid(&self, guid: &Guid) -> CoreResult<Option<Note>>;
    async fn find_note_by_local_id(&self, local_id: &LocalId) -> CoreResult<Option<Note>>;
    async fn expunge_note(&self, guid: &Guid) -> CoreResult<()>;
    async fn list_dirty_notes(&self) -> CoreResult<Vec<Note>>;

    async fn put_resource(&self, resource: Resource) -> CoreResult<()>;
    async fn find_resource_by_guid(&self, guid: &Guid) -> CoreResult<Option<Resource>>;
    async fn expunge_resource(&self, guid: &Guid) -> CoreResult<()>;

    async fn put_linked_notebook(&self, linked_notebook: LinkedNotebook) -> CoreResult<()>;
    async fn find_linked_notebook_by_guid(
        &self,
        guid: &Guid,
    ) -> CoreResult<Option<LinkedNotebook>>;
    async fn expunge_linked_notebook(&self, guid: &Guid) -> CoreResult<()>;
    async fn list_linked_notebooks(&self) -> CoreResult<Vec<LinkedNotebook>>;

    /// Subscribe to the per-category put/expunge event stream.
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StorageEvent>;
}
