//! Error types for OIDC protocol operations
//!
//! Payloads are plain strings so the whole enum is `Clone`: a single refresh
//! result may be handed to several joined callers.

/// Errors from OIDC protocol operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("token revocation failed: {0}")]
    Revocation(String),

    #[error("userinfo request failed: {0}")]
    UserInfo(String),

    #[error("callback verification failed: {0}")]
    CallbackVerification(CallbackError),

    #[error("invalid id token: {0}")]
    InvalidIdToken(String),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Why an authorization callback URI was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("callback URI does not start with the sign-in redirect URI")]
    RedirectUriMismatched,

    #[error(
        "authorization server returned `{error}`: {}",
        .description.as_deref().unwrap_or("no description")
    )]
    ErrorFound {
        error: String,
        description: Option<String>,
    },

    #[error("callback URI is missing the state parameter")]
    MissingState,

    #[error("state parameter does not match the sign-in session")]
    StateMismatched,

    #[error("callback URI is missing the authorization code")]
    MissingCode,
}

impl From<CallbackError> for Error {
    fn from(err: CallbackError) -> Self {
        Error::CallbackVerification(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Url(err.to_string())
    }
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
