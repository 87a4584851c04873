//! OIDC discovery document fetching and memoization
//!
//! The discovery document is stable for the lifetime of a client instance,
//! so it is fetched once and shared read-only. `OidcConfigResolver` wraps a
//! `tokio::sync::OnceCell`: the first caller runs the fetch, concurrent
//! callers wait on the same initialization, and a failed fetch leaves the
//! cell empty so a later call can retry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::constants::DISCOVERY_PATH;
use crate::error::{Error, Result};
use crate::requester::{HttpRequest, Requester};

/// The subset of the discovery document the client uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub end_session_endpoint: String,
    pub revocation_endpoint: String,
    pub jwks_uri: String,
    pub issuer: String,
}

/// Discovery URL for a tenant endpoint (trailing slashes tolerated).
pub fn discovery_url(endpoint: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), DISCOVERY_PATH)
}

/// Fetch and parse the discovery document. No caching.
pub async fn fetch_oidc_config(requester: &dyn Requester, endpoint: &str) -> Result<OidcConfig> {
    let url = discovery_url(endpoint);
    debug!(url, "fetching discovery document");

    let response = requester
        .send(HttpRequest::get(&url))
        .await
        .map_err(|e| Error::Discovery(format!("discovery request failed: {e}")))?;

    if !response.is_success() {
        return Err(Error::Discovery(format!(
            "discovery endpoint returned {}: {}",
            response.status, response.body
        )));
    }

    response
        .json::<OidcConfig>()
        .map_err(|e| Error::Discovery(format!("invalid discovery document: {e}")))
}

/// Single-flight, memoized discovery for one client instance.
pub struct OidcConfigResolver {
    endpoint: String,
    requester: Arc<dyn Requester>,
    config: OnceCell<Arc<OidcConfig>>,
}

impl OidcConfigResolver {
    pub fn new(endpoint: impl Into<String>, requester: Arc<dyn Requester>) -> Self {
        Self {
            endpoint: endpoint.into(),
            requester,
            config: OnceCell::new(),
        }
    }

    /// Return the discovery document, fetching it on first use.
    pub async fn resolve(&self) -> Result<Arc<OidcConfig>> {
        self.config
            .get_or_try_init(|| async {
                let config = fetch_oidc_config(self.requester.as_ref(), &self.endpoint).await?;
                info!(issuer = %config.issuer, "discovery document loaded");
                Ok::<_, Error>(Arc::new(config))
            })
            .await
            .cloned()
    }

    /// The memoized document, if a fetch has already succeeded.
    pub fn cached(&self) -> Option<Arc<OidcConfig>> {
        self.config.get().cloned()
    }
}
