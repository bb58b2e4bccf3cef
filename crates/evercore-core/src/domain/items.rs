//! Evernote-compatible data items: notebooks, tags, saved searches, notes,
//! resources, and linked notebooks.

use serde::{Deserialize, Serialize};

use super::ids::{Guid, LocalId, Usn};

/// Fields every synchronized item carries, regardless of category.
pub trait SyncItemMeta {
    fn guid(&self) -> Option<&Guid>;
    fn local_id(&self) -> &LocalId;
    fn update_sequence_num(&self) -> Option<Usn>;
    fn is_dirty(&self) -> bool;
    fn is_locally_deleted(&self) -> bool;
    fn name(&self) -> Option<&str>;
}

macro_rules! impl_sync_item_meta {
    ($ty:ty, name_field = $name_field:ident) => {
        impl SyncItemMeta for $ty {
            fn guid(&self) -> Option<&Guid> {
                self.guid.as_ref()
            }
            fn local_id(&self) -> &LocalId {
                &self.local_id
            }
            fn update_sequence_num(&self) -> Option<Usn> {
                self.update_sequence_num
            }
            fn is_dirty(&self) -> bool {
                self.is_dirty
            }
            fn is_locally_deleted(&self) -> bool {
                self.is_locally_deleted
            }
            fn name(&self) -> Option<&str> {
                self.$name_field.as_deref()
            }
        }
    };
    ($ty:ty, no_name) => {
        impl SyncItemMeta for $ty {
            fn guid(&self) -> Option<&Guid> {
                self.guid.as_ref()
            }
            fn local_id(&self) -> &LocalId {
                &self.local_id
            }
            fn update_sequence_num(&self) -> Option<Usn> {
                self.update_sequence_num
            }
            fn is_dirty(&self) -> bool {
                self.is_dirty
            }
            fn is_locally_deleted(&self) -> bool {
                self.is_locally_deleted
            }
            fn name(&self) -> Option<&str> {
                None
            }
        }
    };
}

/// A notebook: Evernote guarantees name uniqueness within the account scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub guid: Option<Guid>,
    pub local_id: LocalId,
    pub update_sequence_num: Option<Usn>,
    pub is_dirty: bool,
    pub is_locally_deleted: bool,
    pub name: Option<String>,
    pub linked_notebook_guid: Option<Guid>,
}
impl_sync_item_meta!(Notebook, name_field = name);

/// A tag. May have a `parent_guid` establishing a hierarchy; the per-item
/// processor must apply tags parent-before-child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub guid: Option<Guid>,
    pub local_id: LocalId,
    pub update_sequence_num: Option<Usn>,
    pub is_dirty: bool,
    pub is_locally_deleted: bool,
    pub name: Option<String>,
    pub parent_guid: Option<Guid>,
    pub linked_notebook_guid: Option<Guid>,
}
impl_sync_item_meta!(Tag, name_field = name);

/// A saved search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub guid: Option<Guid>,
    pub local_id: LocalId,
    pub update_sequence_num: Option<Usn>,
    pub is_dirty: bool,
    pub is_locally_deleted: bool,
    pub name: Option<String>,
    pub query: String,
}
impl_sync_item_meta!(SavedSearch, name_field = name);

/// A note. Has no name-uniqueness constraint, so matching is by guid only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub guid: Option<Guid>,
    pub local_id: LocalId,
    pub update_sequence_num: Option<Usn>,
    pub is_dirty: bool,
    pub is_locally_deleted: bool,
    pub title: Option<String>,
    pub content: Option<String>,
    pub notebook_guid: Option<Guid>,
    pub tag_guids: Vec<Guid>,
    pub resource_guids: Vec<Guid>,
}
impl_sync_item_meta!(Note, no_name);

impl Note {
    /// First 12 characters of the plain-text content, used by `MoveMine`
    /// when the note has no title. Falls back to an empty string.
    #[must_use]
    pub fn plain_text_prefix(&self, max_chars: usize) -> String {
        self.content
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(max_chars)
            .collect()
    }
}

/// An attachment to a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub guid: Option<Guid>,
    pub local_id: LocalId,
    pub update_sequence_num: Option<Usn>,
    pub is_dirty: bool,
    pub is_locally_deleted: bool,
    pub note_guid: Option<Guid>,
    pub mime: Option<String>,
    pub data_size: Option<u64>,
    pub data_hash: Option<Vec<u8>>,
}
impl_sync_item_meta!(Resource, no_name);

/// A pointer to a notebook owned by another user and shared with this
/// account; carries its own authentication token and note-store URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedNotebook {
    pub guid: Guid,
    pub local_id: LocalId,
    pub update_sequence_num: Option<Usn>,
    pub is_dirty: bool,
    pub is_locally_deleted: bool,
    pub share_name: Option<String>,
    pub username: Option<String>,
    pub shard_id: Option<String>,
    pub note_store_url: Option<String>,
    pub web_api_url_prefix: Option<String>,
}

impl SyncItemMeta for LinkedNotebook {
    fn guid(&self) -> Option<&Guid> {
        Some(&self.guid)
    }
    fn local_id(&self) -> &LocalId {
        &self.local_id
    }
    fn update_sequence_num(&self) -> Option<Usn> {
        self.update_sequence_num
    }
    fn is_dirty(&self) -> bool {
        self.is_dirty
    }
    fn is_locally_deleted(&self) -> bool {
        self.is_locally_deleted
    }
    fn name(&self) -> Option<&str> {
        self.share_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_plain_text_prefix_truncates() {
        let note = Note {
            guid: None,
            local_id: LocalId::new(),
            update_sequence_num: None,
            is_dirty: true,
            is_locally_deleted: false,
            title: None,
            content: Some("Hello, this is a long note body".to_string()),
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        };
        assert_eq!(note.plain_text_prefix(12), "Hello, this ");
    }

    #[test]
    fn note_plain_text_prefix_empty_when_no_content() {
        let note = Note {
            guid: None,
            local_id: LocalId::new(),
            update_sequence_num: None,
            is_dirty: true,
            is_locally_deleted: false,
            title: None,
            content: None,
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        };
        assert_eq!(note.plain_text_prefix(12), "");
    }
}
