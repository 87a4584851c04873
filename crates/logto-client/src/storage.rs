//! Storage capability and the typed facade the client uses over it

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::Result;

/// Slots the client persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    IdToken,
    RefreshToken,
    SignInSession,
}

impl StorageKey {
    /// Name used by string-keyed backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::IdToken => "idToken",
            StorageKey::RefreshToken => "refreshToken",
            StorageKey::SignInSession => "signInSession",
        }
    }

    pub const ALL: [StorageKey; 3] = [
        StorageKey::IdToken,
        StorageKey::RefreshToken,
        StorageKey::SignInSession,
    ];
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable key-value store supplied by the host runtime.
///
/// Failures surface as `Error::Storage`.
pub trait Storage: Send + Sync {
    fn get_item<'a>(
        &'a self,
        key: StorageKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>>;

    fn set_item<'a>(
        &'a self,
        key: StorageKey,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn remove_item<'a>(
        &'a self,
        key: StorageKey,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// In-process `Storage`; contents are lost with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item<'a>(
        &'a self,
        key: StorageKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.items.lock().await.get(&key).cloned()) })
    }

    fn set_item<'a>(
        &'a self,
        key: StorageKey,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.items.lock().await.insert(key, value);
            Ok(())
        })
    }

    fn remove_item<'a>(
        &'a self,
        key: StorageKey,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.items.lock().await.remove(&key);
            Ok(())
        })
    }
}

/// Generation of the stored token set. Bumped whenever tokens are cleared
/// or replaced by a new sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEpoch(u64);

/// Typed accessors over a `Storage`.
///
/// Multi-slot updates take the write lock so readers never see a callback
/// half-committed (tokens stored while the session is still present).
pub struct StorageFacade {
    storage: Arc<dyn Storage>,
    epoch: RwLock<u64>,
}

impl StorageFacade {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            epoch: RwLock::new(0),
        }
    }

    pub async fn id_token(&self) -> Result<Option<String>> {
        self.read(StorageKey::IdToken).await
    }

    pub async fn refresh_token(&self) -> Result<Option<String>> {
        self.read(StorageKey::RefreshToken).await
    }

    /// The refresh token together with the epoch it belongs to.
    pub async fn refresh_token_at_epoch(&self) -> Result<(Option<String>, TokenEpoch)> {
        let epoch = self.epoch.read().await;
        let token = self.storage.get_item(StorageKey::RefreshToken).await?;
        Ok((token, TokenEpoch(*epoch)))
    }

    pub async fn sign_in_session(&self) -> Result<Option<String>> {
        self.read(StorageKey::SignInSession).await
    }

    pub async fn set_sign_in_session(&self, raw: String) -> Result<()> {
        let _guard = self.epoch.write().await;
        self.storage.set_item(StorageKey::SignInSession, raw).await
    }

    pub async fn remove_sign_in_session(&self) -> Result<()> {
        let _guard = self.epoch.write().await;
        self.storage.remove_item(StorageKey::SignInSession).await
    }

    /// Store the tokens from a completed callback and drop the sign-in session.
    pub async fn commit_sign_in(&self, id_token: &str, refresh_token: Option<&str>) -> Result<()> {
        let mut epoch = self.epoch.write().await;
        *epoch += 1;
        self.put(StorageKey::RefreshToken, refresh_token).await?;
        self.put(StorageKey::IdToken, Some(id_token)).await?;
        self.storage.remove_item(StorageKey::SignInSession).await
    }

    /// Persist tokens rotated by a refresh grant started at `epoch`. Absent
    /// values keep what is stored.
    ///
    /// Returns `false` without writing when the tokens were cleared or
    /// replaced since `epoch`.
    pub async fn store_rotated(
        &self,
        epoch: TokenEpoch,
        id_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<bool> {
        let current = self.epoch.write().await;
        if *current != epoch.0 {
            return Ok(false);
        }
        if let Some(token) = refresh_token {
            self.put(StorageKey::RefreshToken, Some(token)).await?;
        }
        if let Some(token) = id_token {
            self.put(StorageKey::IdToken, Some(token)).await?;
        }
        Ok(true)
    }

    /// Remove the id and refresh tokens.
    pub async fn clear_tokens(&self) -> Result<()> {
        let mut epoch = self.epoch.write().await;
        *epoch += 1;
        self.storage.remove_item(StorageKey::RefreshToken).await?;
        self.storage.remove_item(StorageKey::IdToken).await
    }

    async fn read(&self, key: StorageKey) -> Result<Option<String>> {
        let _guard = self.epoch.read().await;
        self.storage.get_item(key).await
    }

    async fn put(&self, key: StorageKey, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.storage.set_item(key, value.to_string()).await,
            None => self.storage.remove_item(key).await,
        }
    }
}

impl fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageFacade").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> (Arc<MemoryStorage>, StorageFacade) {
        let storage = Arc::new(MemoryStorage::new());
        let facade = StorageFacade::new(storage.clone());
        (storage, facade)
    }

    #[test]
    fn key_names() {
        let names: Vec<_> = StorageKey::ALL.iter().map(StorageKey::as_str).collect();
        assert_eq!(names, ["idToken", "refreshToken", "signInSession"]);
    }

    #[tokio::test]
    async fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item(StorageKey::IdToken).await.unwrap(), None);
        storage
            .set_item(StorageKey::IdToken, "id".into())
            .await
            .unwrap();
        assert_eq!(
            storage.get_item(StorageKey::IdToken).await.unwrap().as_deref(),
            Some("id")
        );
        storage.remove_item(StorageKey::IdToken).await.unwrap();
        assert_eq!(storage.get_item(StorageKey::IdToken).await.unwrap(), None);
    }

    #[tokio::test]
    async fn commit_sign_in_stores_tokens_and_drops_session() {
        let (storage, facade) = facade();
        facade.set_sign_in_session("{}".into()).await.unwrap();

        facade.commit_sign_in("id", Some("rt")).await.unwrap();

        assert_eq!(facade.id_token().await.unwrap().as_deref(), Some("id"));
        assert_eq!(facade.refresh_token().await.unwrap().as_deref(), Some("rt"));
        assert_eq!(
            storage.get_item(StorageKey::SignInSession).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn commit_without_refresh_token_removes_stale_one() {
        let (_, facade) = facade();
        facade.commit_sign_in("id", Some("old")).await.unwrap();
        facade.commit_sign_in("id", None).await.unwrap();
        assert_eq!(facade.refresh_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_rotated_keeps_absent_values() {
        let (_, facade) = facade();
        facade.commit_sign_in("id-1", Some("rt-1")).await.unwrap();
        let (token, epoch) = facade.refresh_token_at_epoch().await.unwrap();
        assert_eq!(token.as_deref(), Some("rt-1"));

        assert!(facade.store_rotated(epoch, None, Some("rt-2")).await.unwrap());
        assert_eq!(facade.id_token().await.unwrap().as_deref(), Some("id-1"));
        assert_eq!(facade.refresh_token().await.unwrap().as_deref(), Some("rt-2"));

        assert!(facade.store_rotated(epoch, Some("id-2"), None).await.unwrap());
        assert_eq!(facade.id_token().await.unwrap().as_deref(), Some("id-2"));
        assert_eq!(facade.refresh_token().await.unwrap().as_deref(), Some("rt-2"));
    }

    #[tokio::test]
    async fn store_rotated_after_clear_or_new_sign_in_is_dropped() {
        let (_, facade) = facade();
        facade.commit_sign_in("id-1", Some("rt-1")).await.unwrap();

        let (_, epoch) = facade.refresh_token_at_epoch().await.unwrap();
        facade.clear_tokens().await.unwrap();
        assert!(!facade.store_rotated(epoch, Some("id-2"), Some("rt-2")).await.unwrap());
        assert_eq!(facade.id_token().await.unwrap(), None);
        assert_eq!(facade.refresh_token().await.unwrap(), None);

        let (_, epoch) = facade.refresh_token_at_epoch().await.unwrap();
        facade.commit_sign_in("id-3", Some("rt-3")).await.unwrap();
        assert!(!facade.store_rotated(epoch, None, Some("rt-4")).await.unwrap());
        assert_eq!(facade.refresh_token().await.unwrap().as_deref(), Some("rt-3"));
    }

    #[tokio::test]
    async fn clear_tokens_leaves_session() {
        let (_, facade) = facade();
        facade.commit_sign_in("id", Some("rt")).await.unwrap();
        facade.set_sign_in_session("pending".into()).await.unwrap();

        facade.clear_tokens().await.unwrap();

        assert_eq!(facade.id_token().await.unwrap(), None);
        assert_eq!(facade.refresh_token().await.unwrap(), None);
        assert_eq!(
            facade.sign_in_session().await.unwrap().as_deref(),
            Some("pending")
        );
    }
}
