//! Logto OAuth2/OIDC client core
//!
//! `LogtoClient` drives the Authorization Code + PKCE flow end to end on top
//! of injected capabilities (`Storage`, `Requester`, `Navigate`,
//! `CodeGenerator`, `IdTokenVerifier`). A runtime variant (CLI, server,
//! embedded) is just a different `Adapters` value; there is one client type.
//!
//! Client lifecycle:
//! 1. `sign_in()` persists a sign-in session and navigates to the authorization URL
//! 2. `is_sign_in_redirected()` tells the host whether a URL is the callback
//! 3. `handle_sign_in_callback()` verifies state, exchanges the code, verifies
//!    the ID token, stores tokens and clears the session
//! 4. `get_access_token()` serves cached tokens and refreshes them single-flight
//! 5. `sign_out()` clears local state, revokes best-effort, navigates to end-session

pub mod client;
pub mod config;
pub mod error;
pub mod navigate;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Adapters, LogtoClient, SignInOptions};
pub use config::{LogtoConfig, with_reserved_scopes};
pub use error::{Error, NotAuthenticatedReason, Result};
pub use navigate::Navigate;
pub use session::{SignInSessionItem, SignInSessionManager, SignInStart};
pub use storage::{MemoryStorage, Storage, StorageFacade, StorageKey, TokenEpoch};

pub use logto_auth::{
    CallbackError, CodeGenerator, IdTokenClaims, IdTokenVerifier, InteractionMode,
    JwksIdTokenVerifier, OidcConfig, PkceGenerator, Requester, ReqwestRequester, UserInfo,
};
