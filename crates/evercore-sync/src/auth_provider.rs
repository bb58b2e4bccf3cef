//! Authentication-info provider (§4.4): produces a valid, non-expired
//! `AuthenticationInfo` on demand, caching in memory and persisting secrets
//! to the keychain. New-account interactive auth and token refresh are
//! delegated to an injected `IInteractiveAuthenticator` so this provider
//! stays transport-agnostic.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use evercore_core::domain::{AuthenticationInfo, Guid, LinkedNotebook, Timestamp, UserId};
use evercore_core::ports::remote::RequestContext;
use evercore_core::ports::IKeychain;

use crate::error::{SyncError, SyncResult};
use crate::store_factory::INoteStoreFactory;

/// Collaborator that performs the actual OAuth handshake / token refresh.
/// Kept separate from `AuthenticationInfoProvider` so the provider never
/// depends on a concrete transport (browser launch, local callback server).
#[async_trait]
pub trait IInteractiveAuthenticator: Send + Sync {
    async fn authenticate_new_account(&self) -> SyncResult<AuthenticationInfo>;
    async fn refresh(&self, user_id: UserId) -> SyncResult<AuthenticationInfo>;
}

/// Which cache entry `authenticateAccount`/`authenticateToLinkedNotebook`
/// should consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOptions {
    UseCached,
    Refresh,
    UseCachedOrRefresh,
}

/// Scope for `clearCaches`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearCachesScope {
    User,
    LinkedNotebooks,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RefreshKey {
    User(UserId),
    LinkedNotebook(UserId, Guid),
}

fn keychain_index_key(app_name: &str, user_id: UserId) -> String {
    format!("{app_name}-evernote-{user_id}-index")
}

pub struct AuthenticationInfoProvider {
    app_name: String,
    keychain_service: String,
    keychain: Arc<dyn IKeychain>,
    interactive: Arc<dyn IInteractiveAuthenticator>,
    note_store_factory: Arc<dyn INoteStoreFactory>,
    user_cache: DashMap<UserId, AuthenticationInfo>,
    linked_notebook_cache: DashMap<(UserId, Guid), AuthenticationInfo>,
    refresh_locks: DashMap<RefreshKey, Arc<tokio::sync::Mutex<()>>>,
}

impl AuthenticationInfoProvider {
    #[must_use]
    pub fn new(
        app_name: impl Into<String>,
        keychain_service: impl Into<String>,
        keychain: Arc<dyn IKeychain>,
        interactive: Arc<dyn IInteractiveAuthenticator>,
        note_store_factory: Arc<dyn INoteStoreFactory>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            keychain_service: keychain_service.into(),
            keychain,
            interactive,
            note_store_factory,
            user_cache: DashMap::new(),
            linked_notebook_cache: DashMap::new(),
            refresh_locks: DashMap::new(),
        }
    }

    fn refresh_lock(&self, key: RefreshKey) -> Arc<tokio::sync::Mutex<()>> {
        self.refresh_locks.entry(key).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    async fn persist_user_secret(&self, info: &AuthenticationInfo) -> SyncResult<()> {
        let key = evercore_core::ports::secret_key(&self.app_name, info.user_id, &info.shard_id);
        let json = serde_json::to_string(info)
            .map_err(|err| SyncError::Authentication(format!("serializing auth info: {err}")))?;
        self.keychain
            .write_password(&self.keychain_service, &key, &json)
            .await?;
        self.keychain
            .write_password(
                &self.keychain_service,
                &keychain_index_key(&self.app_name, info.user_id),
                &info.shard_id,
            )
            .await?;
        Ok(())
    }

    async fn load_user_secret(&self, user_id: UserId) -> SyncResult<Option<AuthenticationInfo>> {
        let index_key = keychain_index_key(&self.app_name, user_id);
        let Some(shard_id) = self.keychain.read_password(&self.keychain_service, &index_key).await? else {
            return Ok(None);
        };
        let key = evercore_core::ports::secret_key(&self.app_name, user_id, &shard_id);
        let Some(json) = self.keychain.read_password(&self.keychain_service, &key).await? else {
            return Ok(None);
        };
        let info: AuthenticationInfo = serde_json::from_str(&json)
            .map_err(|err| SyncError::Authentication(format!("deserializing auth info: {err}")))?;
        Ok(Some(info))
    }

    /// Drives interactive OAuth for a brand-new account and caches the result.
    #[tracing::instrument(skip(self))]
    pub async fn authenticate_new_account(&self) -> SyncResult<AuthenticationInfo> {
        let info = self.interactive.authenticate_new_account().await?;
        self.persist_user_secret(&info).await?;
        self.user_cache.insert(info.user_id, info.clone());
        info!(user_id = %info.user_id, "authenticated new account");
        Ok(info)
    }

    /// Produces a valid `AuthenticationInfo` for the account per `options`.
    #[tracing::instrument(skip(self))]
    pub async fn authenticate_account(
        &self,
        user_id: UserId,
        options: AuthOptions,
    ) -> SyncResult<AuthenticationInfo> {
        match options {
            AuthOptions::UseCached => self.cached_or_load(user_id).await?.ok_or(SyncError::CredentialsNotFound),
            AuthOptions::Refresh => self.refresh_user(user_id).await,
            AuthOptions::UseCachedOrRefresh => {
                if let Some(info) = self.cached_or_load(user_id).await? {
                    if info.is_valid_with_margin(Timestamp::now()) {
                        return Ok(info);
                    }
                }
                self.refresh_user(user_id).await
            }
        }
    }

    async fn cached_or_load(&self, user_id: UserId) -> SyncResult<Option<AuthenticationInfo>> {
        if let Some(info) = self.user_cache.get(&user_id) {
            return Ok(Some(info.clone()));
        }
        if let Some(info) = self.load_user_secret(user_id).await? {
            self.user_cache.insert(user_id, info.clone());
            return Ok(Some(info));
        }
        Ok(None)
    }

    async fn refresh_user(&self, user_id: UserId) -> SyncResult<AuthenticationInfo> {
        let lock = self.refresh_lock(RefreshKey::User(user_id));
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: another caller may have just refreshed.
        if let Some(info) = self.user_cache.get(&user_id) {
            if info.is_valid_with_margin(Timestamp::now()) {
                return Ok(info.clone());
            }
        }

        debug!(%user_id, "refreshing authentication info");
        let info = self.interactive.refresh(user_id).await?;
        self.persist_user_secret(&info).await?;
        self.user_cache.insert(user_id, info.clone());
        Ok(info)
    }

    /// Short-lived linked-notebook tokens, issued by exchanging the account
    /// token against the linked notebook's metadata.
    #[tracing::instrument(skip(self, linked_notebook))]
    pub async fn authenticate_to_linked_notebook(
        &self,
        user_id: UserId,
        linked_notebook: &LinkedNotebook,
        options: AuthOptions,
    ) -> SyncResult<AuthenticationInfo> {
        let cache_key = (user_id, linked_notebook.guid.clone());

        match options {
            AuthOptions::UseCached => self
                .linked_notebook_cache
                .get(&cache_key)
                .map(|entry| entry.clone())
                .ok_or(SyncError::CredentialsNotFound),
            AuthOptions::Refresh => self.exchange_linked_notebook(user_id, linked_notebook).await,
            AuthOptions::UseCachedOrRefresh => {
                if let Some(info) = self.linked_notebook_cache.get(&cache_key) {
                    if info.is_valid_with_margin(Timestamp::now()) {
                        return Ok(info.clone());
                    }
                }
                self.exchange_linked_notebook(user_id, linked_notebook).await
            }
        }
    }

    async fn exchange_linked_notebook(
        &self,
        user_id: UserId,
        linked_notebook: &LinkedNotebook,
    ) -> SyncResult<AuthenticationInfo> {
        let key = RefreshKey::LinkedNotebook(user_id, linked_notebook.guid.clone());
        let lock = self.refresh_lock(key);
        let _guard = lock.lock().await;

        let cache_key = (user_id, linked_notebook.guid.clone());
        if let Some(info) = self.linked_notebook_cache.get(&cache_key) {
            if info.is_valid_with_margin(Timestamp::now()) {
                return Ok(info.clone());
            }
        }

        let account_info = self.authenticate_account(user_id, AuthOptions::UseCachedOrRefresh).await?;
        let note_store = self.note_store_factory.note_store_for_user(&account_info);
        let ctx = RequestContext::new(account_info.auth_token.clone());
        let info = note_store
            .authenticate_to_shared_notebook(linked_notebook, &ctx)
            .await?;
        self.linked_notebook_cache.insert(cache_key, info.clone());
        Ok(info)
    }

    /// Drops in-memory caches per `scope`; persisted secrets are untouched.
    pub fn clear_caches(&self, scope: ClearCachesScope) {
        match scope {
            ClearCachesScope::User => self.user_cache.clear(),
            ClearCachesScope::LinkedNotebooks => self.linked_notebook_cache.clear(),
            ClearCachesScope::All => {
                self.user_cache.clear();
                self.linked_notebook_cache.clear();
            }
        }
    }

    /// Removes the account from cache and deletes its persisted secret.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_authentication(&self, user_id: UserId) -> SyncResult<()> {
        if let Some(shard_id) = self
            .keychain
            .read_password(&self.keychain_service, &keychain_index_key(&self.app_name, user_id))
            .await?
        {
            let key = evercore_core::ports::secret_key(&self.app_name, user_id, &shard_id);
            self.keychain.delete_password(&self.keychain_service, &key).await?;
            self.keychain
                .delete_password(&self.keychain_service, &keychain_index_key(&self.app_name, user_id))
                .await?;
        }
        self.user_cache.remove(&user_id);
        self.linked_notebook_cache.retain(|(uid, _), _| *uid != user_id);
        info!(%user_id, "revoked authentication");
        Ok(())
    }
}
