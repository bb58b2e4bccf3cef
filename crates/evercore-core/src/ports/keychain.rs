//! Secret storage port (§6.5). Tokens and cookies are stored here, never in
//! application files. The production adapter is backed by the `keyring`
//! crate; see `evercore-sync` for the concrete implementation.

use async_trait::async_trait;

use crate::domain::UserId;
use crate::error::CoreResult;

/// Builds the `"<app>-evernote-<userId>-<shardId>"` key naming convention.
#[must_use]
pub fn secret_key(app: &str, user_id: UserId, shard_id: &str) -> String {
    format!("{app}-evernote-{user_id}-{shard_id}")
}

#[async_trait]
pub trait IKeychain: Send + Sync {
    async fn write_password(&self, service: &str, key: &str, password: &str) -> CoreResult<()>;
    async fn read_password(&self, service: &str, key: &str) -> CoreResult<Option<String>>;
    async fn delete_password(&self, service: &str, key: &str) -> CoreResult<()>;
}
