//! Authentication credentials for one endpoint (user-store or linked notebook).

use serde::{Deserialize, Serialize};

use super::ids::{Timestamp, UserId};

/// Safety margin subtracted from the expiration time when deciding whether a
/// cached token still counts as valid (see `authenticateAccount`, option
/// `UseCachedOrRefresh`).
pub const EXPIRY_SAFETY_MARGIN_MILLIS: i64 = 10 * 60 * 1000;

/// A single HTTP cookie captured from the authentication handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

/// Credentials for one endpoint: user-store or a single linked notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationInfo {
    pub user_id: UserId,
    pub auth_token: String,
    pub auth_token_expiration_time: Timestamp,
    pub authentication_time: Timestamp,
    pub shard_id: String,
    pub note_store_url: String,
    pub web_api_url_prefix: String,
    #[serde(default)]
    pub user_store_cookies: Vec<HttpCookie>,
}

impl AuthenticationInfo {
    /// Valid iff `now < authTokenExpirationTime`.
    #[must_use]
    pub fn is_valid(&self, now: Timestamp) -> bool {
        now.as_millis() < self.auth_token_expiration_time.as_millis()
    }

    /// Valid with the 10-minute safety margin applied, used by
    /// `UseCachedOrRefresh`.
    #[must_use]
    pub fn is_valid_with_margin(&self, now: Timestamp) -> bool {
        now.as_millis() + EXPIRY_SAFETY_MARGIN_MILLIS < self.auth_token_expiration_time.as_millis()
    }
}
