//! In-process reference implementation of `ILocalStorage` (§6.1).
//!
//! Backed by `tokio::sync::RwLock`-guarded maps rather than a real
//! relational/key-value engine. Used by the demonstration CLI and by
//! `evercore-sync`'s integration tests; a production deployment supplies its
//! own adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::domain::{
    Guid, LinkedNotebook, LocalId, Note, Notebook, Resource, SavedSearch, SyncItemMeta, Tag,
};
use crate::error::CoreResult;
use crate::ports::{Affiliation, ILocalStorage, StorageEvent, TagNotesRelation};

#[derive(Default)]
struct Tables {
    notebooks: HashMap<Guid, Notebook>,
    tags: HashMap<Guid, Tag>,
    saved_searches: HashMap<Guid, SavedSearch>,
    notes: HashMap<Guid, Note>,
    notes_by_local_id: HashMap<LocalId, Guid>,
    resources: HashMap<Guid, Resource>,
    linked_notebooks: HashMap<Guid, LinkedNotebook>,
}

/// An in-memory `ILocalStorage`. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct InMemoryLocalStorage {
    tables: Arc<RwLock<Tables>>,
    events: broadcast::Sender<StorageEvent>,
}

impl InMemoryLocalStorage {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            events,
        }
    }

    fn emit(&self, event: StorageEvent) {
        // No subscribers is not an error; the event is simply dropped.
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryLocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ILocalStorage for InMemoryLocalStorage {
    async fn put_notebook(&self, notebook: Notebook) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(guid) = notebook.guid.clone() {
            tables.notebooks.insert(guid, notebook.clone());
        }
        drop(tables);
        self.emit(StorageEvent::NotebookPut(notebook));
        Ok(())
    }

    async fn find_notebook_by_guid(&self, guid: &Guid) -> CoreResult<Option<Notebook>> {
        Ok(self.tables.read().await.notebooks.get(guid).cloned())
    }

    async fn find_notebook_by_name(&self, name: &str) -> CoreResult<Option<Notebook>> {
        Ok(self
            .tables
            .read()
            .await
            .notebooks
            .values()
            .find(|n| n.name.as_deref() == Some(name))
            .cloned())
    }

    async fn expunge_notebook(&self, guid: &Guid) -> CoreResult<()> {
        self.tables.write().await.notebooks.remove(guid);
        self.emit(StorageEvent::NotebookExpunged(guid.clone()));
        Ok(())
    }

    async fn list_notebooks(&self, affiliation: Affiliation) -> CoreResult<Vec<Notebook>> {
        let tables = self.tables.read().await;
        Ok(tables
            .notebooks
            .values()
            .filter(|n| matches_affiliation(n.linked_notebook_guid.as_ref(), affiliation))
            .cloned()
            .collect())
    }

    async fn list_dirty_notebooks(&self) -> CoreResult<Vec<Notebook>> {
        Ok(self
            .tables
            .read()
            .await
            .notebooks
            .values()
            .filter(|n| n.is_dirty())
            .cloned()
            .collect())
    }

    async fn put_tag(&self, tag: Tag) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(guid) = tag.guid.clone() {
            tables.tags.insert(guid, tag.clone());
        }
        drop(tables);
        self.emit(StorageEvent::TagPut(tag));
        Ok(())
    }

    async fn find_tag_by_guid(&self, guid: &Guid) -> CoreResult<Option<Tag>> {
        Ok(self.tables.read().await.tags.get(guid).cloned())
    }

    async fn find_tag_by_name(&self, name: &str) -> CoreResult<Option<Tag>> {
        Ok(self
            .tables
            .read()
            .await
            .tags
            .values()
            .find(|t| t.name.as_deref() == Some(name))
            .cloned())
    }

    async fn expunge_tag(&self, guid: &Guid) -> CoreResult<()> {
        self.tables.write().await.tags.remove(guid);
        self.emit(StorageEvent::TagExpunged(guid.clone()));
        Ok(())
    }

    async fn list_tags(
        &self,
        affiliation: Affiliation,
        relation: TagNotesRelation,
    ) -> CoreResult<Vec<Tag>> {
        let tables = self.tables.read().await;
        let referenced: std::collections::HashSet<&Guid> = tables
            .notes
            .values()
            .flat_map(|n| n.tag_guids.iter())
            .collect();
        Ok(tables
            .tags
            .values()
            .filter(|t| matches_affiliation(t.linked_notebook_guid.as_ref(), affiliation))
            .filter(|t| match relation {
                TagNotesRelation::Any => true,
                TagNotesRelation::WithoutNotes => {
                    t.guid.as_ref().map(|g| !referenced.contains(g)).unwrap_or(true)
                }
            })
            .cloned()
            .collect())
    }

    async fn list_dirty_tags(&self) -> CoreResult<Vec<Tag>> {
        Ok(self
            .tables
            .read()
            .await
            .tags
            .values()
            .filter(|t| t.is_dirty())
            .cloned()
            .collect())
    }

    async fn put_saved_search(&self, search: SavedSearch) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(guid) = search.guid.clone() {
            tables.saved_searches.insert(guid, search.clone());
        }
        drop(tables);
        self.emit(StorageEvent::SavedSearchPut(search));
        Ok(())
    }

    async fn find_saved_search_by_guid(&self, guid: &Guid) -> CoreResult<Option<SavedSearch>> {
        Ok(self.tables.read().await.saved_searches.get(guid).cloned())
    }

    async fn find_saved_search_by_name(&self, name: &str) -> CoreResult<Option<SavedSearch>> {
        Ok(self
            .tables
            .read()
            .await
            .saved_searches
            .values()
            .find(|s| s.name.as_deref() == Some(name))
            .cloned())
    }

    async fn expunge_saved_search(&self, guid: &Guid) -> CoreResult<()> {
        self.tables.write().await.saved_searches.remove(guid);
        self.emit(StorageEvent::SavedSearchExpunged(guid.clone()));
        Ok(())
    }

    async fn list_dirty_saved_searches(&self) -> CoreResult<Vec<SavedSearch>> {
        Ok(self
            .tables
            .read()
            .await
            .saved_searches
            .values()
            .filter(|s| s.is_dirty())
            .cloned()
            .collect())
    }

    async fn put_note(&self, note: Note) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(guid) = note.guid.clone() {
            tables.notes_by_local_id.insert(note.local_id.clone(), guid.clone());
            tables.notes.insert(guid, note.clone());
        }
        drop(tables);
        self.emit(StorageEvent::NotePut(note));
        Ok(())
    }

    async fn find_note_by_guid(&self, guid: &Guid) -> CoreResult<Option<Note>> {
        Ok(self.tables.read().await.notes.get(guid).cloned())
    }

    async fn find_note_by_local_id(&self, local_id: &LocalId) -> CoreResult<Option<Note>> {
        let tables = self.tables.read().await;
        Ok(tables
            .notes_by_local_id
            .get(local_id)
            .and_then(|guid| tables.notes.get(guid))
            .cloned())
    }

    async fn expunge_note(&self, guid: &Guid) -> CoreResult<()> {
        self.tables.write().await.notes.remove(guid);
        self.emit(StorageEvent::NoteExpunged(guid.clone()));
        Ok(())
    }

    async fn list_dirty_notes(&self) -> CoreResult<Vec<Note>> {
        Ok(self
            .tables
            .read()
            .await
            .notes
            .values()
            .filter(|n| n.is_dirty())
            .cloned()
            .collect())
    }

    async fn put_resource(&self, resource: Resource) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(guid) = resource.guid.clone() {
            tables.resources.insert(guid, resource.clone());
        }
        drop(tables);
        self.emit(StorageEvent::ResourcePut(resource));
        Ok(())
    }

    async fn find_resource_by_guid(&self, guid: &Guid) -> CoreResult<Option<Resource>> {
        Ok(self.tables.read().await.resources.get(guid).cloned())
    }

    async fn expunge_resource(&self, guid: &Guid) -> CoreResult<()> {
        self.tables.write().await.resources.remove(guid);
        self.emit(StorageEvent::ResourceExpunged(guid.clone()));
        Ok(())
    }

    async fn put_linked_notebook(&self, linked_notebook: LinkedNotebook) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .linked_notebooks
            .insert(linked_notebook.guid.clone(), linked_notebook.clone());
        drop(tables);
        self.emit(StorageEvent::LinkedNotebookPut(linked_notebook));
        Ok(())
    }

    async fn find_linked_notebook_by_guid(&self, guid: &Guid) -> CoreResult<Option<LinkedNotebook>> {
        Ok(self.tables.read().await.linked_notebooks.get(guid).cloned())
    }

    async fn expunge_linked_notebook(&self, guid: &Guid) -> CoreResult<()> {
        self.tables.write().await.linked_notebooks.remove(guid);
        self.emit(StorageEvent::LinkedNotebookExpunged(guid.clone()));
        Ok(())
    }

    async fn list_linked_notebooks(&self) -> CoreResult<Vec<LinkedNotebook>> {
        Ok(self
            .tables
            .read()
            .await
            .linked_notebooks
            .values()
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

fn matches_affiliation(linked_notebook_guid: Option<&Guid>, affiliation: Affiliation) -> bool {
    match affiliation {
        Affiliation::UserOwn => linked_notebook_guid.is_none(),
        Affiliation::AnyLinkedNotebook => linked_notebook_guid.is_some(),
    }
}
