//! Error types for the conflict resolution engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConflictError {
    /// The resolver could not classify which side changed.
    #[error("indeterminate conflict: {0}")]
    Indeterminate(String),

    /// A collaborator (typically local storage) failed during resolution.
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    /// No policy entry exists for a category and no escape-hatch resolver
    /// was configured.
    #[error("no resolution policy configured for {0}")]
    NoPolicy(String),

    #[error(transparent)]
    Core(#[from] evercore_core::CoreError),
}
