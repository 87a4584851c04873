//! Logto OIDC constants
//!
//! Protocol-level values shared by every client instance. Nothing here is a
//! secret; per-application values (endpoint, app id) come from `LogtoConfig`.

/// Scopes every sign-in requests regardless of configuration.
///
/// `offline_access` is what makes the token endpoint return a refresh token.
pub const RESERVED_SCOPES: [&str; 3] = ["openid", "offline_access", "profile"];

/// Scope sent with a resource-scoped refresh grant instead of the full set.
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// Discovery document path, relative to the tenant endpoint.
pub const DISCOVERY_PATH: &str = "/oidc/.well-known/openid-configuration";

/// The only PKCE challenge method this client sends.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Default `prompt` parameter for the authorization request.
pub const DEFAULT_PROMPT: &str = "consent";

/// Maximum distance between an ID token's `iat` and the local clock.
pub const ISSUED_AT_TOLERANCE_SECS: i64 = 300;

/// Leeway applied to `exp`/`nbf` checks during ID token verification.
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 60;
