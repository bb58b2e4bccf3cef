//! Per-item processors (§4.6): apply one sync chunk's add/update/expunge
//! records to local storage, category by category, dispatching to the
//! conflict resolver whenever the local copy is dirty or a same-name
//! collision is found.

use std::collections::{HashMap, VecDeque};

use evercore_core::domain::{
    FailedItem, Guid, Note, Notebook, SavedSearch, SyncChunk, SyncChunksDataCounters, SyncItemMeta,
    Tag,
};
use evercore_core::error::CoreError;
use evercore_core::ports::{IConflictResolver, ILocalStorage};

use crate::error::SyncResult;

/// Placeholder guid used to key a `FailedItem` when the server sent a
/// record with no guid at all — a protocol violation, not a normal failure.
fn missing_guid_placeholder() -> Guid {
    Guid::new("00000000-0000-0000-0000-000000000000").expect("placeholder guid is 36 chars")
}

enum Applied {
    Added,
    Updated,
    Deferred,
}

/// Applies one notebook: insert if new, overwrite if clean, otherwise ask
/// the resolver. Matching by name covers Evernote's name-uniqueness
/// guarantee for notebooks within scope.
async fn apply_notebook(
    incoming: Notebook,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<Applied> {
    let by_guid = match &incoming.guid {
        Some(guid) => storage.find_notebook_by_guid(guid).await?,
        None => None,
    };
    let existing = match by_guid {
        Some(found) => Some(found),
        None => match &incoming.name {
            Some(name) => storage.find_notebook_by_name(name).await?,
            None => None,
        },
    };

    match existing {
        None => {
            storage.put_notebook(incoming).await?;
            Ok(Applied::Added)
        }
        Some(local) if !local.is_dirty() => {
            storage.put_notebook(incoming).await?;
            Ok(Applied::Updated)
        }
        Some(local) => {
            let resolution = resolver.resolve_notebook_conflict(incoming.clone(), local).await?;
            apply_resolution_notebook(incoming, resolution, storage).await
        }
    }
}

async fn apply_resolution_notebook(
    theirs: Notebook,
    resolution: evercore_core::domain::ConflictResolution<Notebook>,
    storage: &dyn ILocalStorage,
) -> SyncResult<Applied> {
    use evercore_core::domain::ConflictResolution::*;
    match resolution {
        UseTheirs => {
            storage.put_notebook(theirs).await?;
            Ok(Applied::Updated)
        }
        UseMine => Ok(Applied::Deferred),
        IgnoreMine => {
            storage.put_notebook(theirs).await?;
            Ok(Applied::Updated)
        }
        MoveMine(moved) => {
            storage.put_notebook(moved).await?;
            storage.put_notebook(theirs).await?;
            Ok(Applied::Updated)
        }
    }
}

/// Deletes an expunged notebook, unless it has unsent local changes — then
/// the resolver decides whether the expunge still wins, the local copy
/// survives untouched, or it is preserved as a duplicate first (§4.6).
async fn expunge_notebook(
    guid: &Guid,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<bool> {
    let Some(local) = storage.find_notebook_by_guid(guid).await? else {
        return Ok(false);
    };
    if !local.is_dirty() {
        storage.expunge_notebook(guid).await?;
        return Ok(true);
    }

    let mut tombstone = local.clone();
    tombstone.is_dirty = false;
    tombstone.is_locally_deleted = true;
    let resolution = resolver.resolve_notebook_conflict(tombstone, local).await?;
    use evercore_core::domain::ConflictResolution::*;
    match resolution {
        UseMine => Ok(false),
        UseTheirs | IgnoreMine => {
            storage.expunge_notebook(guid).await?;
            Ok(true)
        }
        MoveMine(moved) => {
            storage.put_notebook(moved).await?;
            storage.expunge_notebook(guid).await?;
            Ok(true)
        }
    }
}

/// Processes one chunk's notebook add/update/expunge records.
#[tracing::instrument(skip(chunk, storage, resolver, counters))]
pub async fn process_notebooks(
    chunk: &SyncChunk,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
    counters: &mut SyncChunksDataCounters,
) -> SyncResult<Vec<FailedItem<Guid>>> {
    let mut failed = Vec::new();
    counters.total_notebooks += chunk.notebooks.len() as u64;

    for incoming in &chunk.notebooks {
        let guid = incoming.guid.clone().unwrap_or_else(missing_guid_placeholder);
        match apply_notebook(incoming.clone(), storage, resolver).await {
            Ok(Applied::Added) => counters.added_notebooks += 1,
            Ok(Applied::Updated) => counters.updated_notebooks += 1,
            Ok(Applied::Deferred) => {}
            Err(err) => failed.push(FailedItem { item: guid, reason: err.to_string() }),
        }
    }

    for guid in &chunk.expunged_notebooks {
        match expunge_notebook(guid, storage, resolver).await {
            Ok(true) => counters.expunged_notebooks += 1,
            Ok(false) => {}
            Err(err) => failed.push(FailedItem { item: guid.clone(), reason: err.to_string() }),
        }
    }

    Ok(failed)
}

async fn apply_saved_search(
    incoming: SavedSearch,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<Applied> {
    let by_guid = match &incoming.guid {
        Some(guid) => storage.find_saved_search_by_guid(guid).await?,
        None => None,
    };
    let existing = match by_guid {
        Some(found) => Some(found),
        None => match &incoming.name {
            Some(name) => storage.find_saved_search_by_name(name).await?,
            None => None,
        },
    };

    match existing {
        None => {
            storage.put_saved_search(incoming).await?;
            Ok(Applied::Added)
        }
        Some(local) if !local.is_dirty() => {
            storage.put_saved_search(incoming).await?;
            Ok(Applied::Updated)
        }
        Some(local) => {
            let resolution = resolver.resolve_saved_search_conflict(incoming.clone(), local).await?;
            use evercore_core::domain::ConflictResolution::*;
            match resolution {
                UseTheirs | IgnoreMine => {
                    storage.put_saved_search(incoming).await?;
                    Ok(Applied::Updated)
                }
                UseMine => Ok(Applied::Deferred),
                MoveMine(moved) => {
                    storage.put_saved_search(moved).await?;
                    storage.put_saved_search(incoming).await?;
                    Ok(Applied::Updated)
                }
            }
        }
    }
}

/// Deletes an expunged saved search, unless it has unsent local changes —
/// then the resolver decides (§4.6).
async fn expunge_saved_search(
    guid: &Guid,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<bool> {
    let Some(local) = storage.find_saved_search_by_guid(guid).await? else {
        return Ok(false);
    };
    if !local.is_dirty() {
        storage.expunge_saved_search(guid).await?;
        return Ok(true);
    }

    let mut tombstone = local.clone();
    tombstone.is_dirty = false;
    tombstone.is_locally_deleted = true;
    let resolution = resolver.resolve_saved_search_conflict(tombstone, local).await?;
    use evercore_core::domain::ConflictResolution::*;
    match resolution {
        UseMine => Ok(false),
        UseTheirs | IgnoreMine => {
            storage.expunge_saved_search(guid).await?;
            Ok(true)
        }
        MoveMine(moved) => {
            storage.put_saved_search(moved).await?;
            storage.expunge_saved_search(guid).await?;
            Ok(true)
        }
    }
}

/// Processes one chunk's saved-search add/update/expunge records.
#[tracing::instrument(skip(chunk, storage, resolver, counters))]
pub async fn process_saved_searches(
    chunk: &SyncChunk,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
    counters: &mut SyncChunksDataCounters,
) -> SyncResult<Vec<FailedItem<Guid>>> {
    let mut failed = Vec::new();
    counters.total_saved_searches += chunk.saved_searches.len() as u64;

    for incoming in &chunk.saved_searches {
        let guid = incoming.guid.clone().unwrap_or_else(missing_guid_placeholder);
        match apply_saved_search(incoming.clone(), storage, resolver).await {
            Ok(Applied::Added) => counters.added_saved_searches += 1,
            Ok(Applied::Updated) => counters.updated_saved_searches += 1,
            Ok(Applied::Deferred) => {}
            Err(err) => failed.push(FailedItem { item: guid, reason: err.to_string() }),
        }
    }

    for guid in &chunk.expunged_saved_searches {
        match expunge_saved_search(guid, storage, resolver).await {
            Ok(true) => counters.expunged_saved_searches += 1,
            Ok(false) => {}
            Err(err) => failed.push(FailedItem { item: guid.clone(), reason: err.to_string() }),
        }
    }

    Ok(failed)
}

/// Topologically sorts tags parent-before-child. A cycle is a protocol
/// violation the server must never produce; it is rejected as corruption.
pub fn topologically_sort_tags(tags: &[Tag]) -> SyncResult<Vec<Tag>> {
    let mut by_guid: HashMap<Guid, &Tag> = HashMap::new();
    for tag in tags {
        if let Some(guid) = &tag.guid {
            by_guid.insert(guid.clone(), tag);
        }
    }

    let mut in_degree: HashMap<Guid, usize> = HashMap::new();
    let mut children: HashMap<Guid, Vec<Guid>> = HashMap::new();
    let mut roots: VecDeque<Guid> = VecDeque::new();
    let mut no_guid = Vec::new();

    for tag in tags {
        let Some(guid) = &tag.guid else {
            no_guid.push(tag.clone());
            continue;
        };
        in_degree.entry(guid.clone()).or_insert(0);
        match &tag.parent_guid {
            Some(parent) if by_guid.contains_key(parent) => {
                *in_degree.entry(guid.clone()).or_insert(0) += 1;
                children.entry(parent.clone()).or_default().push(guid.clone());
            }
            _ => {}
        }
    }

    for (guid, degree) in &in_degree {
        if *degree == 0 {
            roots.push_back(guid.clone());
        }
    }

    let mut order = Vec::new();
    let mut visited: HashMap<Guid, usize> = in_degree.clone();
    while let Some(guid) = roots.pop_front() {
        if let Some(tag) = by_guid.get(&guid) {
            order.push((*tag).clone());
        }
        if let Some(kids) = children.get(&guid) {
            for child in kids {
                let degree = visited.entry(child.clone()).or_insert(0);
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    roots.push_back(child.clone());
                }
            }
        }
    }

    if order.len() != by_guid.len() {
        return Err(crate::error::SyncError::Core(CoreError::Internal(
            "tag hierarchy contains a cycle".to_string(),
        )));
    }

    order.extend(no_guid);
    Ok(order)
}

async fn apply_tag(
    incoming: Tag,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<Applied> {
    let by_guid = match &incoming.guid {
        Some(guid) => storage.find_tag_by_guid(guid).await?,
        None => None,
    };
    let existing = match by_guid {
        Some(found) => Some(found),
        None => match &incoming.name {
            Some(name) => storage.find_tag_by_name(name).await?,
            None => None,
        },
    };

    match existing {
        None => {
            storage.put_tag(incoming).await?;
            Ok(Applied::Added)
        }
        Some(local) if !local.is_dirty() => {
            storage.put_tag(incoming).await?;
            Ok(Applied::Updated)
        }
        Some(local) => {
            let resolution = resolver.resolve_tag_conflict(incoming.clone(), local).await?;
            use evercore_core::domain::ConflictResolution::*;
            match resolution {
                UseTheirs | IgnoreMine => {
                    storage.put_tag(incoming).await?;
                    Ok(Applied::Updated)
                }
                UseMine => Ok(Applied::Deferred),
                MoveMine(moved) => {
                    storage.put_tag(moved).await?;
                    storage.put_tag(incoming).await?;
                    Ok(Applied::Updated)
                }
            }
        }
    }
}

/// Deletes an expunged tag, unless it has unsent local changes — then the
/// resolver decides (§4.6).
async fn expunge_tag(
    guid: &Guid,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<bool> {
    let Some(local) = storage.find_tag_by_guid(guid).await? else {
        return Ok(false);
    };
    if !local.is_dirty() {
        storage.expunge_tag(guid).await?;
        return Ok(true);
    }

    let mut tombstone = local.clone();
    tombstone.is_dirty = false;
    tombstone.is_locally_deleted = true;
    let resolution = resolver.resolve_tag_conflict(tombstone, local).await?;
    use evercore_core::domain::ConflictResolution::*;
    match resolution {
        UseMine => Ok(false),
        UseTheirs | IgnoreMine => {
            storage.expunge_tag(guid).await?;
            Ok(true)
        }
        MoveMine(moved) => {
            storage.put_tag(moved).await?;
            storage.expunge_tag(guid).await?;
            Ok(true)
        }
    }
}

/// Processes one chunk's tag add/update/expunge records, applying adds and
/// updates in parent-before-child order.
#[tracing::instrument(skip(chunk, storage, resolver, counters))]
pub async fn process_tags(
    chunk: &SyncChunk,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
    counters: &mut SyncChunksDataCounters,
) -> SyncResult<Vec<FailedItem<Guid>>> {
    let mut failed = Vec::new();
    counters.total_tags += chunk.tags.len() as u64;

    let ordered = topologically_sort_tags(&chunk.tags)?;
    for incoming in ordered {
        let guid = incoming.guid.clone().unwrap_or_else(missing_guid_placeholder);
        match apply_tag(incoming, storage, resolver).await {
            Ok(Applied::Added) => counters.added_tags += 1,
            Ok(Applied::Updated) => counters.updated_tags += 1,
            Ok(Applied::Deferred) => {}
            Err(err) => failed.push(FailedItem { item: guid, reason: err.to_string() }),
        }
    }

    for guid in &chunk.expunged_tags {
        match expunge_tag(guid, storage, resolver).await {
            Ok(true) => counters.expunged_tags += 1,
            Ok(false) => {}
            Err(err) => failed.push(FailedItem { item: guid.clone(), reason: err.to_string() }),
        }
    }

    Ok(failed)
}

/// Applies one note's metadata record. Full content is fetched separately by
/// the full-data downloader (§4.8.3); this only reconciles the chunk's
/// metadata view against local state, by guid only (notes have no
/// name-uniqueness constraint).
async fn apply_note(
    incoming: Note,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<Applied> {
    let existing = match &incoming.guid {
        Some(guid) => storage.find_note_by_guid(guid).await?,
        None => None,
    };

    match existing {
        None => {
            storage.put_note(incoming).await?;
            Ok(Applied::Added)
        }
        Some(local) if !local.is_dirty() => {
            storage.put_note(incoming).await?;
            Ok(Applied::Updated)
        }
        Some(local) => {
            let resolution = resolver.resolve_note_conflict(incoming.clone(), local).await?;
            use evercore_core::domain::ConflictResolution::*;
            match resolution {
                UseTheirs | IgnoreMine => {
                    storage.put_note(incoming).await?;
                    Ok(Applied::Updated)
                }
                UseMine => Ok(Applied::Deferred),
                MoveMine(moved) => {
                    storage.put_note(moved).await?;
                    storage.put_note(incoming).await?;
                    Ok(Applied::Updated)
                }
            }
        }
    }
}

/// Deletes an expunged note, unless it has unsent local changes — then the
/// resolver decides (§4.6).
async fn expunge_note(
    guid: &Guid,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<bool> {
    let Some(local) = storage.find_note_by_guid(guid).await? else {
        return Ok(false);
    };
    if !local.is_dirty() {
        storage.expunge_note(guid).await?;
        return Ok(true);
    }

    let mut tombstone = local.clone();
    tombstone.is_dirty = false;
    tombstone.is_locally_deleted = true;
    let resolution = resolver.resolve_note_conflict(tombstone, local).await?;
    use evercore_core::domain::ConflictResolution::*;
    match resolution {
        UseMine => Ok(false),
        UseTheirs | IgnoreMine => {
            storage.expunge_note(guid).await?;
            Ok(true)
        }
        MoveMine(moved) => {
            storage.put_note(moved).await?;
            storage.expunge_note(guid).await?;
            Ok(true)
        }
    }
}

/// Processes one chunk's note add/update/expunge records. Returns the guids
/// of newly-added/updated notes so the caller can schedule full-content
/// fetches, plus a `DownloadNotesStatus`-shaped failure accumulation.
#[tracing::instrument(skip(chunk, storage, resolver, counters))]
pub async fn process_notes(
    chunk: &SyncChunk,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
    counters: &mut SyncChunksDataCounters,
) -> SyncResult<(Vec<Guid>, Vec<FailedItem<Guid>>)> {
    let mut failed = Vec::new();
    let mut touched = Vec::new();
    counters.total_notes += chunk.notes.len() as u64;

    for incoming in &chunk.notes {
        let guid = incoming.guid.clone().unwrap_or_else(missing_guid_placeholder);
        match apply_note(incoming.clone(), storage, resolver).await {
            Ok(Applied::Added) => {
                counters.added_notes += 1;
                touched.push(guid);
            }
            Ok(Applied::Updated) => {
                counters.updated_notes += 1;
                touched.push(guid);
            }
            Ok(Applied::Deferred) => {}
            Err(err) => failed.push(FailedItem { item: guid, reason: err.to_string() }),
        }
    }

    for guid in &chunk.expunged_notes {
        match expunge_note(guid, storage, resolver).await {
            Ok(true) => counters.expunged_notes += 1,
            Ok(false) => {}
            Err(err) => failed.push(FailedItem { item: guid.clone(), reason: err.to_string() }),
        }
    }

    Ok((touched, failed))
}

/// Deletes an expunged resource, unless it has unsent local changes — then
/// the resolver decides (§4.6). Resources have no add/update conflict of
/// their own (they inherit their owning note's outcome), but an expunge
/// racing a local edit still needs arbitration.
async fn expunge_resource(
    guid: &Guid,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
) -> SyncResult<bool> {
    let Some(local) = storage.find_resource_by_guid(guid).await? else {
        return Ok(false);
    };
    if !local.is_dirty() {
        storage.expunge_resource(guid).await?;
        return Ok(true);
    }

    let mut tombstone = local.clone();
    tombstone.is_dirty = false;
    tombstone.is_locally_deleted = true;
    let resolution = resolver.resolve_resource_conflict(tombstone, local).await?;
    use evercore_core::domain::ConflictResolution::*;
    match resolution {
        UseMine => Ok(false),
        UseTheirs | IgnoreMine => {
            storage.expunge_resource(guid).await?;
            Ok(true)
        }
        MoveMine(moved) => {
            storage.put_resource(moved).await?;
            storage.expunge_resource(guid).await?;
            Ok(true)
        }
    }
}

/// Processes one chunk's resource add/update/expunge records. Resources have
/// no conflict resolution of their own (they inherit their owning note's
/// conflict outcome) — always overwritten by guid; expunges still defer to
/// the resolver when the local copy is dirty.
#[tracing::instrument(skip(chunk, storage, resolver, counters))]
pub async fn process_resources(
    chunk: &SyncChunk,
    storage: &dyn ILocalStorage,
    resolver: &dyn IConflictResolver,
    counters: &mut SyncChunksDataCounters,
) -> SyncResult<(Vec<Guid>, Vec<FailedItem<Guid>>)> {
    let mut failed = Vec::new();
    let mut touched = Vec::new();
    counters.total_resources += chunk.resources.len() as u64;

    for incoming in &chunk.resources {
        let guid = incoming.guid.clone().unwrap_or_else(missing_guid_placeholder);
        let is_new = storage.find_resource_by_guid(&guid).await?.is_none();
        match storage.put_resource(incoming.clone()).await {
            Ok(()) => {
                if is_new {
                    counters.added_resources += 1;
                } else {
                    counters.updated_resources += 1;
                }
                touched.push(guid);
            }
            Err(err) => failed.push(FailedItem { item: guid, reason: err.to_string() }),
        }
    }

    for guid in &chunk.expunged_resources {
        match expunge_resource(guid, storage, resolver).await {
            Ok(true) => counters.expunged_resources += 1,
            Ok(false) => {}
            Err(err) => failed.push(FailedItem { item: guid.clone(), reason: err.to_string() }),
        }
    }

    Ok((touched, failed))
}

/// Processes one chunk's linked-notebook add/update/expunge records.
#[tracing::instrument(skip(chunk, storage, counters))]
pub async fn process_linked_notebooks(
    chunk: &SyncChunk,
    storage: &dyn ILocalStorage,
    counters: &mut SyncChunksDataCounters,
) -> SyncResult<Vec<FailedItem<Guid>>> {
    let mut failed = Vec::new();
    counters.total_linked_notebooks += chunk.linked_notebooks.len() as u64;

    for incoming in &chunk.linked_notebooks {
        let guid = incoming.guid.clone();
        let is_new = storage.find_linked_notebook_by_guid(&guid).await?.is_none();
        match storage.put_linked_notebook(incoming.clone()).await {
            Ok(()) => {
                if is_new {
                    counters.added_linked_notebooks += 1;
                } else {
                    counters.updated_linked_notebooks += 1;
                }
            }
            Err(err) => failed.push(FailedItem { item: guid, reason: err.to_string() }),
        }
    }

    for guid in &chunk.expunged_linked_notebooks {
        if let Err(err) = storage.expunge_linked_notebook(guid).await {
            failed.push(FailedItem { item: guid.clone(), reason: err.to_string() });
            continue;
        }
        counters.expunged_linked_notebooks += 1;
    }

    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evercore_conflict::DefaultConflictResolver;
    use evercore_core::domain::{LocalId, Usn};
    use evercore_core::memory_storage::InMemoryLocalStorage;

    fn guid(n: u8) -> Guid {
        Guid::new(format!("1111111{n}-1111-1111-1111-111111111111")).unwrap()
    }

    fn tag(guid_val: Guid, parent: Option<Guid>, name: &str) -> Tag {
        Tag {
            guid: Some(guid_val),
            local_id: LocalId::new(),
            update_sequence_num: Some(Usn::new(1)),
            is_dirty: false,
            is_locally_deleted: false,
            name: Some(name.to_string()),
            parent_guid: parent,
            linked_notebook_guid: None,
        }
    }

    #[test]
    fn topo_sort_orders_parent_before_child() {
        let a = tag(guid(1), None, "a");
        let b = tag(guid(2), Some(guid(1)), "b");
        let sorted = topologically_sort_tags(&[b, a]).unwrap();
        assert_eq!(sorted[0].name.as_deref(), Some("a"));
        assert_eq!(sorted[1].name.as_deref(), Some("b"));
    }

    #[test]
    fn topo_sort_rejects_cycle() {
        let a = tag(guid(1), Some(guid(2)), "a");
        let b = tag(guid(2), Some(guid(1)), "b");
        let result = topologically_sort_tags(&[a, b]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn process_notebooks_inserts_new_notebook() {
        let storage = InMemoryLocalStorage::new();
        let resolver = DefaultConflictResolver::default();
        let chunk = SyncChunk {
            notebooks: vec![Notebook {
                guid: Some(guid(1)),
                local_id: LocalId::new(),
                update_sequence_num: Some(Usn::new(1)),
                is_dirty: false,
                is_locally_deleted: false,
                name: Some("Personal".to_string()),
                linked_notebook_guid: None,
            }],
            ..Default::default()
        };
        let mut counters = SyncChunksDataCounters::default();
        let failed = process_notebooks(&chunk, &storage, &resolver, &mut counters).await.unwrap();
        assert!(failed.is_empty());
        assert_eq!(counters.added_notebooks, 1);
        assert!(storage.find_notebook_by_guid(&guid(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn process_notes_defers_use_mine() {
        let storage = InMemoryLocalStorage::new();
        let resolver = evercore_conflict::DefaultConflictResolver::new(
            evercore_conflict::ConflictPolicy::uniform(evercore_core::config::DefaultConflictStrategy::UseMine),
        );
        let dirty_note = Note {
            guid: Some(guid(3)),
            local_id: LocalId::new(),
            update_sequence_num: Some(Usn::new(1)),
            is_dirty: true,
            is_locally_deleted: false,
            title: Some("Draft".into()),
            content: None,
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        };
        storage.put_note(dirty_note.clone()).await.unwrap();

        let incoming = Note { title: Some("Final".into()), is_dirty: false, ..dirty_note };
        let chunk = SyncChunk { notes: vec![incoming], ..Default::default() };
        let mut counters = SyncChunksDataCounters::default();
        let (touched, failed) = process_notes(&chunk, &storage, &resolver, &mut counters).await.unwrap();
        assert!(failed.is_empty());
        assert!(touched.is_empty());
        let local = storage.find_note_by_guid(&guid(3)).await.unwrap().unwrap();
        assert_eq!(local.title.as_deref(), Some("Draft"));
    }

    #[tokio::test]
    async fn process_notes_move_mine_keeps_both_copies() {
        let storage = InMemoryLocalStorage::new();
        let resolver = evercore_conflict::DefaultConflictResolver::default();
        let dirty_note = Note {
            guid: Some(guid(4)),
            local_id: LocalId::new(),
            update_sequence_num: Some(Usn::new(1)),
            is_dirty: true,
            is_locally_deleted: false,
            title: Some("Draft".into()),
            content: None,
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        };
        storage.put_note(dirty_note.clone()).await.unwrap();

        let incoming = Note { title: Some("Final".into()), is_dirty: false, ..dirty_note };
        let chunk = SyncChunk { notes: vec![incoming], ..Default::default() };
        let mut counters = SyncChunksDataCounters::default();
        process_notes(&chunk, &storage, &resolver, &mut counters).await.unwrap();

        let theirs = storage.find_note_by_guid(&guid(4)).await.unwrap().unwrap();
        assert_eq!(theirs.title.as_deref(), Some("Final"));
    }

    #[tokio::test]
    async fn expunge_removes_saved_search() {
        let storage = InMemoryLocalStorage::new();
        let resolver = DefaultConflictResolver::default();
        let search = SavedSearch {
            guid: Some(guid(5)),
            local_id: LocalId::new(),
            update_sequence_num: Some(Usn::new(1)),
            is_dirty: false,
            is_locally_deleted: false,
            name: Some("query".into()),
            query: "tag:foo".into(),
        };
        storage.put_saved_search(search).await.unwrap();

        let chunk = SyncChunk { expunged_saved_searches: vec![guid(5)], ..Default::default() };
        let mut counters = SyncChunksDataCounters::default();
        process_saved_searches(&chunk, &storage, &resolver, &mut counters).await.unwrap();
        assert_eq!(counters.expunged_saved_searches, 1);
        assert!(storage.find_saved_search_by_guid(&guid(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expunge_of_dirty_note_with_use_mine_policy_keeps_it() {
        let storage = InMemoryLocalStorage::new();
        let resolver = evercore_conflict::DefaultConflictResolver::new(
            evercore_conflict::ConflictPolicy::uniform(evercore_core::config::DefaultConflictStrategy::UseMine),
        );
        let dirty_note = Note {
            guid: Some(guid(6)),
            local_id: LocalId::new(),
            update_sequence_num: Some(Usn::new(1)),
            is_dirty: true,
            is_locally_deleted: false,
            title: Some("Unsent edit".into()),
            content: None,
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        };
        storage.put_note(dirty_note).await.unwrap();

        let chunk = SyncChunk { expunged_notes: vec![guid(6)], ..Default::default() };
        let mut counters = SyncChunksDataCounters::default();
        let (_, failed) = process_notes(&chunk, &storage, &resolver, &mut counters).await.unwrap();
        assert!(failed.is_empty());
        assert_eq!(counters.expunged_notes, 0);
        assert!(storage.find_note_by_guid(&guid(6)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expunge_of_dirty_notebook_with_move_mine_policy_preserves_a_copy() {
        let storage = InMemoryLocalStorage::new();
        let resolver = DefaultConflictResolver::default();
        let dirty_notebook = Notebook {
            guid: Some(guid(7)),
            local_id: LocalId::new(),
            update_sequence_num: Some(Usn::new(1)),
            is_dirty: true,
            is_locally_deleted: false,
            name: Some("Work".to_string()),
            linked_notebook_guid: None,
        };
        storage.put_notebook(dirty_notebook).await.unwrap();

        let chunk = SyncChunk { expunged_notebooks: vec![guid(7)], ..Default::default() };
        let mut counters = SyncChunksDataCounters::default();
        let failed = process_notebooks(&chunk, &storage, &resolver, &mut counters).await.unwrap();
        assert!(failed.is_empty());
        assert_eq!(counters.expunged_notebooks, 1);
        assert!(storage.find_notebook_by_guid(&guid(7)).await.unwrap().is_none());
        let survivor = storage.find_notebook_by_name("Work").await.unwrap();
        assert!(survivor.is_some());
        assert!(survivor.unwrap().guid.is_none());
    }

    #[tokio::test]
    async fn expunge_of_clean_resource_deletes_unconditionally() {
        let storage = InMemoryLocalStorage::new();
        let resolver = DefaultConflictResolver::default();
        let resource = evercore_core::domain::Resource {
            guid: Some(guid(8)),
            local_id: LocalId::new(),
            update_sequence_num: Some(Usn::new(1)),
            is_dirty: false,
            is_locally_deleted: false,
            note_guid: Some(guid(9)),
            mime: Some("image/png".into()),
            data_size: Some(10),
            data_hash: None,
        };
        storage.put_resource(resource).await.unwrap();

        let chunk = SyncChunk { expunged_resources: vec![guid(8)], ..Default::default() };
        let mut counters = SyncChunksDataCounters::default();
        let (_, failed) = process_resources(&chunk, &storage, &resolver, &mut counters).await.unwrap();
        assert!(failed.is_empty());
        assert_eq!(counters.expunged_resources, 1);
        assert!(storage.find_resource_by_guid(&guid(8)).await.unwrap().is_none());
    }
}
