//! The conflict-resolution outcome contract consumed by the per-item
//! processors and the sender.

use std::fmt::{self, Display, Formatter};

/// One of the four standard resolutions a conflict resolver may return for
/// a category `T` (Notebook, Tag, SavedSearch, or Note).
///
/// `MoveMine` yields a new local item with a fresh `LocalId` and no `Guid`;
/// the core then applies `UseTheirs` to the slot that held the conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution<T> {
    /// Overwrite local with the server version.
    UseTheirs,
    /// Keep local, mark dirty so it is uploaded in the send phase.
    UseMine,
    /// Discard local unsent changes; replace with the server version.
    IgnoreMine,
    /// Rename/duplicate the local item with a new LocalId and no Guid.
    MoveMine(T),
}

impl<T> ConflictResolution<T> {
    #[must_use]
    pub fn is_use_theirs(&self) -> bool {
        matches!(self, Self::UseTheirs)
    }

    #[must_use]
    pub fn is_use_mine(&self) -> bool {
        matches!(self, Self::UseMine)
    }

    #[must_use]
    pub fn is_ignore_mine(&self) -> bool {
        matches!(self, Self::IgnoreMine)
    }

    #[must_use]
    pub fn as_move_mine(&self) -> Option<&T> {
        match self {
            Self::MoveMine(t) => Some(t),
            _ => None,
        }
    }
}

impl<T> Display for ConflictResolution<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseTheirs => write!(f, "use-theirs"),
            Self::UseMine => write!(f, "use-mine"),
            Self::IgnoreMine => write!(f, "ignore-mine"),
            Self::MoveMine(_) => write!(f, "move-mine"),
        }
    }
}
