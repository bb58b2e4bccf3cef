//! A contiguous slice of server state, `[low USN, high USN]`.

use serde::{Deserialize, Serialize};

use super::ids::{Guid, Usn};
use super::items::{LinkedNotebook, Note, Notebook, Resource, SavedSearch, Tag};

/// One sync chunk: ordered add/update records for each item category plus a
/// list of expunged guids per category. `low <= high`; chunks for a given
/// (account, linked-notebook) are non-overlapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncChunk {
    pub low_usn: Usn,
    pub high_usn: Usn,
    /// The server's current high-water mark at the time this chunk was
    /// produced; a chunk is "full" (more remain) iff `high_usn < server_usn`.
    pub server_usn: Usn,

    #[serde(default)]
    pub notebooks: Vec<Notebook>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub saved_searches: Vec<SavedSearch>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub linked_notebooks: Vec<LinkedNotebook>,

    #[serde(default)]
    pub expunged_notebooks: Vec<Guid>,
    #[serde(default)]
    pub expunged_tags: Vec<Guid>,
    #[serde(default)]
    pub expunged_saved_searches: Vec<Guid>,
    #[serde(default)]
    pub expunged_notes: Vec<Guid>,
    #[serde(default)]
    pub expunged_resources: Vec<Guid>,
    #[serde(default)]
    pub expunged_linked_notebooks: Vec<Guid>,
}

impl SyncChunk {
    /// `true` if the server has more data past this chunk's `high_usn`.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.high_usn < self.server_usn
    }

    /// `true` if the chunk carries no items or expunges at all (the "server
    /// has nothing new" terminal case).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty()
            && self.tags.is_empty()
            && self.saved_searches.is_empty()
            && self.notes.is_empty()
            && self.resources.is_empty()
            && self.linked_notebooks.is_empty()
            && self.expunged_notebooks.is_empty()
            && self.expunged_tags.is_empty()
            && self.expunged_saved_searches.is_empty()
            && self.expunged_notes.is_empty()
            && self.expunged_resources.is_empty()
            && self.expunged_linked_notebooks.is_empty()
    }
}
