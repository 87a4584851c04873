//! Error kinds surfaced by `LogtoClient`

use std::fmt;

use logto_auth::CallbackError;

/// Errors from client operations.
///
/// `Clone` so one failed refresh can be reported to every caller that joined it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The persisted sign-in session exists but doesn't match its schema.
    #[error("invalid sign-in session: {0}")]
    InvalidSignInSession(String),

    /// A callback was handled with no sign-in pending.
    #[error("sign-in session not found")]
    SignInSessionNotFound,

    #[error("callback verification failed: {0}")]
    CallbackVerificationFailed(CallbackError),

    #[error("invalid id token: {0}")]
    InvalidIdToken(String),

    #[error("not authenticated: {0}")]
    NotAuthenticated(NotAuthenticatedReason),

    /// Any failure on the refresh grant path, wrapping its cause.
    #[error("failed to get access token by refresh token: {0}")]
    GetAccessTokenByRefreshTokenFailed(#[source] Box<Error>),

    #[error("storage error: {0}")]
    Storage(String),

    /// Protocol failures with no dedicated kind (transport, discovery, exchange, ...).
    #[error(transparent)]
    Auth(logto_auth::Error),
}

/// Which credential was missing when an authenticated operation was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotAuthenticatedReason {
    MissingIdToken,
    MissingRefreshToken,
    /// Tokens were cleared or replaced while a refresh was in flight.
    TokensCleared,
}

impl fmt::Display for NotAuthenticatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotAuthenticatedReason::MissingIdToken => f.write_str("no id token stored"),
            NotAuthenticatedReason::MissingRefreshToken => f.write_str("no refresh token stored"),
            NotAuthenticatedReason::TokensCleared => {
                f.write_str("tokens were cleared during refresh")
            }
        }
    }
}

impl From<logto_auth::Error> for Error {
    fn from(err: logto_auth::Error) -> Self {
        match err {
            logto_auth::Error::CallbackVerification(reason) => {
                Error::CallbackVerificationFailed(reason)
            }
            logto_auth::Error::InvalidIdToken(msg) => Error::InvalidIdToken(msg),
            other => Error::Auth(other),
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
