//! Pending sign-in sessions
//!
//! A session records what the callback will be checked against: the redirect
//! URI, the PKCE verifier and the state token. It is persisted as camelCase
//! JSON so storage written by other Logto SDKs stays readable.

use std::sync::Arc;

use logto_auth::CodeGenerator;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::StorageFacade;

/// Persisted state of an in-progress sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInSessionItem {
    pub redirect_uri: String,
    pub code_verifier: String,
    pub state: String,
}

impl SignInSessionItem {
    /// Parse and validate a stored session.
    pub fn parse(raw: &str) -> Result<Self> {
        let item: Self =
            serde_json::from_str(raw).map_err(|e| Error::InvalidSignInSession(e.to_string()))?;
        for (field, value) in [
            ("redirectUri", &item.redirect_uri),
            ("codeVerifier", &item.code_verifier),
            ("state", &item.state),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidSignInSession(format!("{field} is empty")));
            }
        }
        Ok(item)
    }
}

/// A freshly started session plus the challenge to put on the authorization URL.
#[derive(Debug, Clone)]
pub struct SignInStart {
    pub session: SignInSessionItem,
    pub code_challenge: String,
}

/// Creates, reads and clears the pending sign-in session.
pub struct SignInSessionManager {
    storage: Arc<StorageFacade>,
    generator: Arc<dyn CodeGenerator>,
}

impl SignInSessionManager {
    pub fn new(storage: Arc<StorageFacade>, generator: Arc<dyn CodeGenerator>) -> Self {
        Self { storage, generator }
    }

    /// Generate verifier, challenge and state, and persist the session.
    ///
    /// Replaces any session already pending.
    pub async fn begin(&self, redirect_uri: &str) -> Result<SignInStart> {
        let code_verifier = self.generator.code_verifier();
        let code_challenge = self.generator.code_challenge(&code_verifier);
        let session = SignInSessionItem {
            redirect_uri: redirect_uri.to_string(),
            code_verifier,
            state: self.generator.state(),
        };
        let raw = serde_json::to_string(&session)
            .map_err(|e| Error::InvalidSignInSession(e.to_string()))?;
        self.storage.set_sign_in_session(raw).await?;
        Ok(SignInStart {
            session,
            code_challenge,
        })
    }

    /// The pending session, if any.
    pub async fn current(&self) -> Result<Option<SignInSessionItem>> {
        match self.storage.sign_in_session().await? {
            Some(raw) => SignInSessionItem::parse(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.remove_sign_in_session().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage, StorageKey};
    use crate::testing::FixedGenerator;

    fn manager() -> (Arc<MemoryStorage>, SignInSessionManager) {
        let storage = Arc::new(MemoryStorage::new());
        let facade = Arc::new(StorageFacade::new(storage.clone()));
        (
            storage,
            SignInSessionManager::new(facade, Arc::new(FixedGenerator)),
        )
    }

    #[tokio::test]
    async fn begin_persists_camel_case_session() {
        let (storage, manager) = manager();
        let start = manager.begin("https://app/callback").await.unwrap();

        assert_eq!(start.session.redirect_uri, "https://app/callback");
        assert_eq!(start.session.code_verifier, FixedGenerator::VERIFIER);
        assert_eq!(start.session.state, FixedGenerator::STATE);
        assert_eq!(start.code_challenge, FixedGenerator::CHALLENGE);

        let raw = storage
            .get_item(StorageKey::SignInSession)
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["redirectUri"], "https://app/callback");
        assert_eq!(json["codeVerifier"], FixedGenerator::VERIFIER);
        assert_eq!(json["state"], FixedGenerator::STATE);

        assert_eq!(manager.current().await.unwrap(), Some(start.session));
    }

    #[tokio::test]
    async fn current_is_none_without_session() {
        let (_, manager) = manager();
        assert_eq!(manager.current().await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_removes_session() {
        let (_, manager) = manager();
        manager.begin("https://app/callback").await.unwrap();
        manager.clear().await.unwrap();
        assert_eq!(manager.current().await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_session_is_invalid() {
        let (storage, manager) = manager();
        storage
            .set_item(StorageKey::SignInSession, "{\"redirectUri\":1}".into())
            .await
            .unwrap();
        assert!(matches!(
            manager.current().await,
            Err(Error::InvalidSignInSession(_))
        ));
    }

    #[test]
    fn empty_fields_are_invalid() {
        let err = SignInSessionItem::parse(
            r#"{"redirectUri":"https://app/callback","codeVerifier":"","state":"s"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSignInSession(ref m) if m.contains("codeVerifier")));
    }
}
