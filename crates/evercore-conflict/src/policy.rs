//! Per-category default resolution policy (§4.7): "always use theirs",
//! "always use mine", or "keep both via MoveMine" — selectable per item
//! category from configuration, analogous in spirit to a glob-pattern
//! policy engine but keyed by category instead of path.

use evercore_core::config::DefaultConflictStrategy;
use evercore_core::domain::ConflictResolution;

/// The default strategy applied when an item has both a dirty local copy
/// and an incoming remote update, absent an injected interactive resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    pub notebooks: DefaultConflictStrategy,
    pub tags: DefaultConflictStrategy,
    pub saved_searches: DefaultConflictStrategy,
    pub notes: DefaultConflictStrategy,
    pub resources: DefaultConflictStrategy,
}

impl ConflictPolicy {
    /// One strategy applied uniformly across every category.
    #[must_use]
    pub fn uniform(strategy: DefaultConflictStrategy) -> Self {
        Self {
            notebooks: strategy,
            tags: strategy,
            saved_searches: strategy,
            notes: strategy,
            resources: strategy,
        }
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::uniform(DefaultConflictStrategy::MoveMine)
    }
}

/// Converts a strategy into the corresponding non-`IgnoreMine` resolution.
/// `MoveMine` carries no payload here; the caller supplies the duplicate.
#[must_use]
pub fn resolution_for<T>(strategy: DefaultConflictStrategy, moved: T) -> ConflictResolution<T> {
    match strategy {
        DefaultConflictStrategy::UseTheirs => ConflictResolution::UseTheirs,
        DefaultConflictStrategy::UseMine => ConflictResolution::UseMine,
        DefaultConflictStrategy::MoveMine => ConflictResolution::MoveMine(moved),
    }
}
