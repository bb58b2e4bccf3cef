//! Stand-in for the real OAuth 1.0a handshake (Evernote never shipped a
//! browser-delegated flow for third-party note stores in the way this
//! client's ambient stack assumes for its own remote calls). `evercore-sync`
//! already separates the handshake out behind `IInteractiveAuthenticator`,
//! so this adapter can synthesize a long-lived token for the configured
//! in-memory demo account without the rest of the sync engine knowing the
//! difference.

use async_trait::async_trait;
use evercore_core::domain::{AuthenticationInfo, Timestamp, UserId};
use evercore_sync::{SyncError, SyncResult};

pub struct DemoInteractiveAuthenticator {
    shard_id: String,
}

impl DemoInteractiveAuthenticator {
    #[must_use]
    pub fn new(shard_id: impl Into<String>) -> Self {
        Self { shard_id: shard_id.into() }
    }

    fn synthesize(&self, user_id: UserId) -> AuthenticationInfo {
        let now = Timestamp::now();
        AuthenticationInfo {
            user_id,
            auth_token: format!("demo-token-{}-{}", user_id.value(), now.as_millis()),
            auth_token_expiration_time: Timestamp::from_millis(now.as_millis() + 365 * 24 * 60 * 60 * 1000),
            authentication_time: now,
            shard_id: self.shard_id.clone(),
            note_store_url: format!("demo://{}/notestore", self.shard_id),
            web_api_url_prefix: format!("demo://{}/", self.shard_id),
            user_store_cookies: vec![],
        }
    }
}

#[async_trait]
impl evercore_sync::IInteractiveAuthenticator for DemoInteractiveAuthenticator {
    async fn authenticate_new_account(&self) -> SyncResult<AuthenticationInfo> {
        Ok(self.synthesize(UserId::new(1)))
    }

    async fn refresh(&self, user_id: UserId) -> SyncResult<AuthenticationInfo> {
        if user_id != UserId::new(1) {
            return Err(SyncError::CredentialsNotFound);
        }
        Ok(self.synthesize(user_id))
    }
}
