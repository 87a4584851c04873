//! Cache keys and entries

use std::fmt;

use common::unix_now;

/// A cached access token.
///
/// `expires_at` is a unix timestamp in seconds (absolute, not a delta),
/// computed from the token response's `expires_in` when the entry is built.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessTokenEntry {
    pub token: String,
    pub scope: String,
    pub expires_at: i64,
}

impl AccessTokenEntry {
    /// Build an entry from a token endpoint response's relative lifetime.
    pub fn from_expires_in(token: String, scope: String, expires_in: u64) -> Self {
        Self {
            token,
            scope,
            expires_at: unix_now().saturating_add(expires_in as i64),
        }
    }

    /// An entry is unusable once `expires_at <= now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for AccessTokenEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenEntry")
            .field("token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Cache key: requested scopes (sorted) plus optional resource indicator.
///
/// Rendered as `"{scopes}@{resource}"`; the key for "no resource, no extra
/// scopes" is `"@"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessTokenKey(String);

impl AccessTokenKey {
    pub fn new(resource: Option<&str>, scopes: &[&str]) -> Self {
        let mut scopes = scopes.to_vec();
        scopes.sort_unstable();
        scopes.dedup();
        Self(format!("{}@{}", scopes.join(" "), resource.unwrap_or_default()))
    }

    /// Key for a resource with no extra scopes.
    pub fn for_resource(resource: Option<&str>) -> Self {
        Self::new(resource, &[])
    }

    /// Key of the token returned by the authorization code exchange.
    pub fn unscoped() -> Self {
        Self::new(None, &[])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessTokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
