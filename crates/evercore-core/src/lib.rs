//! Evercore Core - domain model and ports for the account synchronizer
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Notebook`, `Tag`, `Note`, `Resource`, `SavedSearch`, `LinkedNotebook`
//! - **Sync state** - `SyncState`, `SyncChunk`, `ConflictResolution<T>`
//! - **Port definitions** - Traits for adapters: `ILocalStorage`, `INoteStore`, `IUserStore`, `IKeychain`, `IConflictResolver`
//! - **Cancellation** - `Canceler`, `ManualCanceler`, `FutureTrackingCanceler`, `AnyOfCanceler`
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external
//! dependencies. Ports define trait interfaces that adapter crates
//! (`evercore-sync`, `evercore-conflict`) implement or consume.

pub mod canceler;
pub mod config;
pub mod domain;
pub mod error;
pub mod memory_storage;
pub mod ports;

pub use canceler::{AnyOfCanceler, Canceler, FutureTrackingCanceler, IsCanceled, ManualCanceler};
pub use config::{Config, ConfigBuilder, ValidationError};
pub use error::{CoreError, CoreResult};
pub use memory_storage::InMemoryLocalStorage;
