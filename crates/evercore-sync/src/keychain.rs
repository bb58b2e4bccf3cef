//! `keyring`-backed implementation of `evercore_core::ports::IKeychain`
//! (§6.5). Tokens and cookies are stored here, never in application files.

use async_trait::async_trait;
use tracing::{debug, info};

use evercore_core::error::{CoreError, CoreResult};
use evercore_core::ports::IKeychain;

/// Adapts the platform secret-service keyring to `IKeychain`.
#[derive(Debug, Default)]
pub struct KeyringKeychain;

impl KeyringKeychain {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IKeychain for KeyringKeychain {
    async fn write_password(&self, service: &str, key: &str, password: &str) -> CoreResult<()> {
        let service = service.to_string();
        let key = key.to_string();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|err| CoreError::Collaborator(anyhow::anyhow!(err)))?;
            entry
                .set_password(&password)
                .map_err(|err| CoreError::Collaborator(anyhow::anyhow!(err)))?;
            debug!(service, key, "wrote secret to keychain");
            Ok(())
        })
        .await
        .map_err(|err| CoreError::Runtime(err.to_string()))?
    }

    async fn read_password(&self, service: &str, key: &str) -> CoreResult<Option<String>> {
        let service = service.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|err| CoreError::Collaborator(anyhow::anyhow!(err)))?;
            match entry.get_password() {
                Ok(password) => Ok(Some(password)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(err) => Err(CoreError::Collaborator(anyhow::anyhow!(err))),
            }
        })
        .await
        .map_err(|err| CoreError::Runtime(err.to_string()))?
    }

    async fn delete_password(&self, service: &str, key: &str) -> CoreResult<()> {
        let service = service.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|err| CoreError::Collaborator(anyhow::anyhow!(err)))?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {
                    info!(service, key, "cleared secret from keychain");
                    Ok(())
                }
                Err(err) => Err(CoreError::Collaborator(anyhow::anyhow!(err))),
            }
        })
        .await
        .map_err(|err| CoreError::Runtime(err.to_string()))?
    }
}

/// An in-memory `IKeychain` for tests, avoiding a dependency on a real
/// platform secret-service backend.
#[derive(Debug, Default)]
pub struct InMemoryKeychain {
    entries: dashmap::DashMap<(String, String), String>,
}

impl InMemoryKeychain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IKeychain for InMemoryKeychain {
    async fn write_password(&self, service: &str, key: &str, password: &str) -> CoreResult<()> {
        self.entries
            .insert((service.to_string(), key.to_string()), password.to_string());
        Ok(())
    }

    async fn read_password(&self, service: &str, key: &str) -> CoreResult<Option<String>> {
        Ok(self
            .entries
            .get(&(service.to_string(), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn delete_password(&self, service: &str, key: &str) -> CoreResult<()> {
        self.entries.remove(&(service.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_keychain_round_trips() {
        let keychain = InMemoryKeychain::new();
        keychain.write_password("svc", "k1", "secret").await.unwrap();
        assert_eq!(
            keychain.read_password("svc", "k1").await.unwrap(),
            Some("secret".to_string())
        );
    }

    #[tokio::test]
    async fn in_memory_keychain_delete_then_missing() {
        let keychain = InMemoryKeychain::new();
        keychain.write_password("svc", "k1", "secret").await.unwrap();
        keychain.delete_password("svc", "k1").await.unwrap();
        assert_eq!(keychain.read_password("svc", "k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_keychain_missing_key_is_none() {
        let keychain = InMemoryKeychain::new();
        assert_eq!(keychain.read_password("svc", "absent").await.unwrap(), None);
    }
}
