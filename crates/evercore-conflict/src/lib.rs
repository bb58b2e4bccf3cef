//! Evercore Conflict - default conflict resolution policy
//!
//! Implements `evercore_core::ports::IConflictResolver` with a
//! configuration-driven default policy per item category, plus the note
//! renaming rule `MoveMine` uses to keep a demoted local copy.

pub mod error;
pub mod namer;
pub mod policy;
pub mod resolver;

pub use error::ConflictError;
pub use namer::conflicting_title;
pub use policy::ConflictPolicy;
pub use resolver::DefaultConflictResolver;
