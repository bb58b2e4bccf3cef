//! Classifies a collaborator's `CoreError` into "rate limited", "auth
//! expired", or "everything else", the same way the engine's transient-error
//! classifier reads substrings out of a generic error message rather than
//! downcasting to a concrete type.
//!
//! Remote adapters (the HTTP client, the in-memory fake) signal these two
//! special cases by prefixing `CoreError::RemoteTransport`'s message with
//! `"rate_limit:<seconds>"` or `"auth_expired"`.

use evercore_core::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorClass {
    RateLimit(Option<i32>),
    AuthExpired,
    Other,
}

pub const RATE_LIMIT_PREFIX: &str = "rate_limit:";
pub const AUTH_EXPIRED_MARKER: &str = "auth_expired";

#[must_use]
pub fn classify_remote_error(err: &CoreError) -> RemoteErrorClass {
    if let CoreError::RemoteTransport(message) = err {
        if let Some(rest) = message.strip_prefix(RATE_LIMIT_PREFIX) {
            return RemoteErrorClass::RateLimit(rest.trim().parse::<i32>().ok());
        }
        if message.starts_with(AUTH_EXPIRED_MARKER) {
            return RemoteErrorClass::AuthExpired;
        }
    }
    RemoteErrorClass::Other
}

#[must_use]
pub fn rate_limit_error(seconds_to_wait: Option<i32>) -> CoreError {
    let suffix = seconds_to_wait.map(|s| s.to_string()).unwrap_or_default();
    CoreError::RemoteTransport(format!("{RATE_LIMIT_PREFIX}{suffix}"))
}

#[must_use]
pub fn auth_expired_error() -> CoreError {
    CoreError::RemoteTransport(AUTH_EXPIRED_MARKER.to_string())
}
