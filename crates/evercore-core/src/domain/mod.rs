pub mod auth;
pub mod chunk;
pub mod conflict;
pub mod ids;
pub mod items;
pub mod status;
pub mod sync_state;

pub use auth::{AuthenticationInfo, HttpCookie};
pub use chunk::SyncChunk;
pub use conflict::ConflictResolution;
pub use ids::{Guid, LocalId, Timestamp, UserId, Usn};
pub use items::{LinkedNotebook, Note, Notebook, Resource, SavedSearch, SyncItemMeta, Tag};
pub use status::{
    DownloadNotesStatus, DownloadResourcesStatus, FailedItem, SendStatus,
    StopSynchronizationError, SyncChunksDataCounters, SyncOptions, SyncResult, SyncStats,
};
pub use sync_state::SyncState;
