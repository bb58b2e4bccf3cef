//! Domain error types
//!
//! One `thiserror` enum per failure category named in the error-handling
//! design: invalid arguments are caller bugs, cancellation is not logged as
//! an error, and collaborator failures are wrapped rather than downcast.

use thiserror::Error;

/// Errors raised by domain types and ports in `evercore-core`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Public API misuse; the caller is always at fault.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A `Canceler` observed cancellation mid-operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Generic non-recoverable local fault.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The local storage collaborator failed to open or failed an operation.
    #[error("local storage error: {0}")]
    LocalStorage(String),

    /// The wire transport collaborator failed.
    #[error("remote transport error: {0}")]
    RemoteTransport(String),

    /// A defensive invariant was violated (would be a null-pointer check in
    /// the source language).
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// Opaque failure from a collaborator outside this crate's control.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
