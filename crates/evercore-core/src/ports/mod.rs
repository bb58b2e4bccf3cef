//! Port definitions (hexagonal architecture interfaces).
//!
//! These are the boundaries the Account Synchronizer consumes but does not
//! implement end-to-end: the local storage engine, the wire-protocol
//! client, the keychain, and the conflict resolver.

pub mod conflict_resolver;
pub mod keychain;
pub mod local_storage;
pub mod remote;

pub use conflict_resolver::IConflictResolver;
pub use keychain::{secret_key, IKeychain};
pub use local_storage::{Affiliation, ILocalStorage, StorageEvent, StoragePatch, TagNotesRelation};
pub use remote::{
    IncludeNoteLimits, INoteStore, IUserStore, NoteResultSpec, RemoteUser, RequestContext,
    ResourceOptions, SyncChunkFilter,
};
