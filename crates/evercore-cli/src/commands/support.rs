//! Shared wiring for the commands that talk to the sync engine.
//!
//! The demo backend keeps local notebook/tag/note state in memory only, so
//! it starts empty on every invocation; `sync_state/` and
//! `last_sync_status/` under the data directory are the only things that
//! persist across CLI runs. A production deployment swaps `InMemoryLocalStorage`
//! for a real adapter without touching anything else wired up here.

use std::path::PathBuf;
use std::sync::Arc;

use evercore_core::config::Config;
use evercore_core::domain::UserId;
use evercore_sync::{AuthenticationInfoProvider, InMemoryNoteStoreFactory};

use crate::demo_auth::DemoInteractiveAuthenticator;

/// The single account this demo CLI operates against.
pub const DEMO_USER_ID: UserId = UserId::new(1);

pub fn load_config() -> Config {
    Config::load_or_default().unwrap_or_default()
}

/// `StorageConfig::data_dir` defaults to a `~`-prefixed path; expand it
/// against `dirs::home_dir()` since nothing else in this reference build
/// does shell-style expansion.
pub fn data_dir(config: &Config) -> PathBuf {
    let raw = &config.storage.data_dir;
    match raw.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(rest),
        Err(_) => raw.clone(),
    }
}

pub fn build_auth_provider(config: &Config) -> Arc<AuthenticationInfoProvider> {
    Arc::new(AuthenticationInfoProvider::new(
        config.auth.app_name.clone(),
        config.auth.keychain_service.clone(),
        Arc::new(evercore_sync::keychain::KeyringKeychain::new()),
        Arc::new(DemoInteractiveAuthenticator::new("s1")),
        Arc::new(InMemoryNoteStoreFactory::new()),
    ))
}
