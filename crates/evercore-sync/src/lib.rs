//! Evercore Sync - sync-state persistence, chunk download, and the account
//! synchronizer state machine
//!
//! This crate wires `evercore-core`'s ports to concrete collaborators:
//! - **Authentication** - `AuthenticationInfoProvider`, keychain-backed, with
//!   single-flight refresh deduplication.
//! - **Download** - `ChunksProvider` (sync-chunk cache + remote fetch),
//!   `FullDataDownloader` (bounded-concurrency note/resource bodies),
//!   per-item `processors`, and `Downloader` orchestrating all three.
//! - **Send** - `Sender`, pushing dirty local items in dependency order.
//! - **Orchestration** - `AccountSynchronizer`, the Downloading/Sending
//!   state machine described for one account's sync round.
//!
//! `evercore-cli` is the thin consumer of this crate's public API.

pub mod account_synchronizer;
pub mod auth_provider;
pub mod chunks_downloader;
pub mod chunks_storage;
pub mod downloader;
pub mod error;
pub mod full_data;
pub mod keychain;
pub mod last_sync_status;
pub mod processors;
pub mod rate_limit;
pub mod remote_error;
pub mod sender;
pub mod store_factory;
pub mod sync_state_store;

pub use account_synchronizer::AccountSynchronizer;
pub use auth_provider::{AuthOptions, AuthenticationInfoProvider, ClearCachesScope, IInteractiveAuthenticator};
pub use chunks_downloader::ChunksProvider;
pub use chunks_storage::{ChunkScope, SyncChunksStorage};
pub use downloader::{DownloadOutcome, Downloader, IThumbnailFetcher};
pub use error::{SyncError, SyncResult};
pub use full_data::FullDataDownloader;
pub use last_sync_status::LastSyncStatusStore;
pub use sender::Sender;
pub use store_factory::{INoteStoreFactory, InMemoryNoteStoreFactory};
pub use sync_state_store::SyncStateStore;
