//! Error types for sync-state persistence, chunk storage, authentication,
//! and the account synchronizer state machine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("sync state I/O error: {0}")]
    SyncStateIo(String),

    #[error("sync chunks storage error: {0}")]
    ChunksStorage(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("cached credentials not found for account")]
    CredentialsNotFound,

    #[error(transparent)]
    Core(#[from] evercore_core::CoreError),

    #[error(transparent)]
    Conflict(#[from] evercore_conflict::ConflictError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
