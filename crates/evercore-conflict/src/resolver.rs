//! Default, policy-driven `IConflictResolver` (§4.7).
//!
//! Dispatches per category to the configured `ConflictPolicy`. `MoveMine`
//! duplicates the local item with a fresh `LocalId` and no `Guid`; for notes
//! the duplicate's title follows the `namer` rule.

use async_trait::async_trait;
use tracing::debug;

use evercore_core::domain::{ConflictResolution, LocalId, Note, Notebook, Resource, SavedSearch, Tag};
use evercore_core::error::CoreResult;
use evercore_core::ports::IConflictResolver;

use crate::namer::conflicting_title;
use crate::policy::{resolution_for, ConflictPolicy};

/// The standard resolver: no user interaction, a fixed policy per category.
pub struct DefaultConflictResolver {
    policy: ConflictPolicy,
}

impl DefaultConflictResolver {
    #[must_use]
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }
}

impl Default for DefaultConflictResolver {
    fn default() -> Self {
        Self::new(ConflictPolicy::default())
    }
}

#[async_trait]
impl IConflictResolver for DefaultConflictResolver {
    async fn resolve_notebook_conflict(
        &self,
        theirs: Notebook,
        mine: Notebook,
    ) -> CoreResult<ConflictResolution<Notebook>> {
        debug!(guid = ?theirs.guid, "resolving notebook conflict");
        let mut moved = mine;
        moved.local_id = LocalId::new();
        moved.guid = None;
        moved.update_sequence_num = None;
        moved.is_dirty = true;
        Ok(resolution_for(self.policy.notebooks, moved))
    }

    async fn resolve_tag_conflict(
        &self,
        theirs: Tag,
        mine: Tag,
    ) -> CoreResult<ConflictResolution<Tag>> {
        debug!(guid = ?theirs.guid, "resolving tag conflict");
        let mut moved = mine;
        moved.local_id = LocalId::new();
        moved.guid = None;
        moved.update_sequence_num = None;
        moved.is_dirty = true;
        Ok(resolution_for(self.policy.tags, moved))
    }

    async fn resolve_saved_search_conflict(
        &self,
        theirs: SavedSearch,
        mine: SavedSearch,
    ) -> CoreResult<ConflictResolution<SavedSearch>> {
        debug!(guid = ?theirs.guid, "resolving saved search conflict");
        let mut moved = mine;
        moved.local_id = LocalId::new();
        moved.guid = None;
        moved.update_sequence_num = None;
        moved.is_dirty = true;
        Ok(resolution_for(self.policy.saved_searches, moved))
    }

    async fn resolve_note_conflict(
        &self,
        theirs: Note,
        mine: Note,
    ) -> CoreResult<ConflictResolution<Note>> {
        debug!(guid = ?theirs.guid, "resolving note conflict");
        let mut moved = mine;
        moved.title = Some(conflicting_title(&moved));
        moved.local_id = LocalId::new();
        moved.guid = None;
        moved.update_sequence_num = None;
        moved.is_dirty = true;
        Ok(resolution_for(self.policy.notes, moved))
    }

    async fn resolve_resource_conflict(
        &self,
        theirs: Resource,
        mine: Resource,
    ) -> CoreResult<ConflictResolution<Resource>> {
        debug!(guid = ?theirs.guid, "resolving resource conflict");
        let mut moved = mine;
        moved.local_id = LocalId::new();
        moved.guid = None;
        moved.update_sequence_num = None;
        moved.is_dirty = true;
        Ok(resolution_for(self.policy.resources, moved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evercore_core::config::DefaultConflictStrategy;

    fn note(title: Option<&str>) -> Note {
        Note {
            guid: Some(evercore_core::domain::Guid::new("11111111-1111-1111-1111-111111111111").unwrap()),
            local_id: LocalId::new(),
            update_sequence_num: Some(evercore_core::domain::Usn::new(5)),
            is_dirty: true,
            is_locally_deleted: false,
            title: title.map(str::to_string),
            content: None,
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        }
    }

    #[tokio::test]
    async fn move_mine_strips_guid_and_renames_note() {
        let resolver = DefaultConflictResolver::default();
        let theirs = note(Some("Final"));
        let mine = note(Some("Draft"));
        let resolution = resolver.resolve_note_conflict(theirs, mine).await.unwrap();
        let moved = resolution.as_move_mine().expect("expected MoveMine");
        assert_eq!(moved.title.as_deref(), Some("Draft - conflicting"));
        assert!(moved.guid.is_none());
        assert!(moved.is_dirty);
    }

    #[tokio::test]
    async fn use_theirs_policy_short_circuits_duplication() {
        let policy = ConflictPolicy::uniform(DefaultConflictStrategy::UseTheirs);
        let resolver = DefaultConflictResolver::new(policy);
        let theirs = note(Some("Final"));
        let mine = note(Some("Draft"));
        let resolution = resolver.resolve_note_conflict(theirs, mine).await.unwrap();
        assert!(resolution.is_use_theirs());
    }

    #[tokio::test]
    async fn resource_conflict_follows_its_own_policy_slot() {
        let policy = ConflictPolicy::uniform(DefaultConflictStrategy::UseMine);
        let resolver = DefaultConflictResolver::new(policy);
        let resource = Resource {
            guid: Some(evercore_core::domain::Guid::new("22222222-2222-2222-2222-222222222222").unwrap()),
            local_id: LocalId::new(),
            update_sequence_num: Some(evercore_core::domain::Usn::new(3)),
            is_dirty: true,
            is_locally_deleted: false,
            note_guid: None,
            mime: None,
            data_size: None,
            data_hash: None,
        };
        let resolution = resolver.resolve_resource_conflict(resource.clone(), resource).await.unwrap();
        assert!(resolution.is_use_mine());
    }
}
