//! ID token claims and verification
//!
//! `decode_id_token_claims` reads the payload without checking anything and
//! backs the fast local `get_id_token_claims` path. Verification goes through
//! the `IdTokenVerifier` capability; `JwksIdTokenVerifier` is the default and
//! checks signature, issuer, audience, expiry and issued-at skew against the
//! provider's JWKS.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use common::unix_now;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode_header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::constants::{CLOCK_SKEW_LEEWAY_SECS, ISSUED_AT_TOLERANCE_SECS};
use crate::error::{Error, Result};
use crate::requester::{HttpRequest, Requester};

/// Claims carried by a Logto ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizations: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Decode the payload of a compact JWS without verifying it.
pub fn decode_id_token_claims(id_token: &str) -> Result<IdTokenClaims> {
    let mut segments = id_token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(Error::Decode(
                "id token must have three dot-separated segments".into(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Decode(format!("id token payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Decode(format!("id token payload is not valid claims JSON: {e}")))
}

/// Verifies an ID token and returns its claims.
///
/// Implementations must reject a bad signature, a foreign issuer, a foreign
/// audience, an expired token, or an `iat` too far from the local clock.
pub trait IdTokenVerifier: Send + Sync {
    fn verify<'a>(
        &'a self,
        id_token: &'a str,
        audience: &'a str,
        issuer: &'a str,
        jwks_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IdTokenClaims>> + Send + 'a>>;
}

/// `IdTokenVerifier` backed by the provider's JWKS.
///
/// Key sets are fetched through the injected `Requester` the first time a
/// JWKS URI is needed and cached per URI. An unknown `kid` forces one refetch
/// to pick up rotated keys.
pub struct JwksIdTokenVerifier {
    requester: Arc<dyn Requester>,
    key_sets: RwLock<HashMap<String, Arc<JwkSet>>>,
}

impl JwksIdTokenVerifier {
    pub fn new(requester: Arc<dyn Requester>) -> Self {
        Self {
            requester,
            key_sets: RwLock::new(HashMap::new()),
        }
    }

    async fn key_set(&self, jwks_uri: &str, force: bool) -> Result<Arc<JwkSet>> {
        if !force && let Some(set) = self.key_sets.read().await.get(jwks_uri) {
            return Ok(set.clone());
        }

        debug!(jwks_uri, "fetching JWKS");
        let response = self
            .requester
            .send(HttpRequest::get(jwks_uri))
            .await
            .map_err(|e| Error::InvalidIdToken(format!("JWKS request failed: {e}")))?;
        if !response.is_success() {
            return Err(Error::InvalidIdToken(format!(
                "JWKS endpoint returned {}",
                response.status
            )));
        }
        let set: JwkSet = response
            .json()
            .map_err(|e| Error::InvalidIdToken(format!("invalid JWKS: {e}")))?;

        let set = Arc::new(set);
        self.key_sets
            .write()
            .await
            .insert(jwks_uri.to_string(), set.clone());
        Ok(set)
    }

    async fn find_key(&self, jwks_uri: &str, kid: Option<&str>) -> Result<Jwk> {
        let cached = self.key_set(jwks_uri, false).await?;
        if let Some(jwk) = select_key(&cached, kid) {
            return Ok(jwk);
        }
        warn!(jwks_uri, kid, "signing key not in cached JWKS, refetching");
        let fetched = self.key_set(jwks_uri, true).await?;
        select_key(&fetched, kid).ok_or_else(|| {
            Error::InvalidIdToken(format!("no signing key matches kid {kid:?}"))
        })
    }
}

impl IdTokenVerifier for JwksIdTokenVerifier {
    fn verify<'a>(
        &'a self,
        id_token: &'a str,
        audience: &'a str,
        issuer: &'a str,
        jwks_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IdTokenClaims>> + Send + 'a>> {
        Box::pin(async move {
            let header = decode_header(id_token)
                .map_err(|e| Error::InvalidIdToken(format!("malformed header: {e}")))?;
            let jwk = self.find_key(jwks_uri, header.kid.as_deref()).await?;
            let key = DecodingKey::from_jwk(&jwk)
                .map_err(|e| Error::InvalidIdToken(format!("unusable JWK: {e}")))?;

            let alg = pinned_algorithm(&jwk, header.alg)?;
            let mut validation = Validation::new(alg);
            validation.set_audience(&[audience]);
            validation.set_issuer(&[issuer]);
            validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
            validation.leeway = CLOCK_SKEW_LEEWAY_SECS;

            let data = jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)
                .map_err(|e| Error::InvalidIdToken(e.to_string()))?;

            check_issued_at(data.claims.iat, unix_now())?;
            Ok(data.claims)
        })
    }
}

fn select_key(set: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    let mut signing = set
        .keys
        .iter()
        .filter(|k| !matches!(k.common.public_key_use, Some(PublicKeyUse::Encryption)));
    match kid {
        Some(kid) => signing
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .cloned(),
        None => signing.next().cloned(),
    }
}

/// The algorithm to validate with: the one the JWK declares, if any. A token
/// header naming a different algorithm is rejected.
fn pinned_algorithm(jwk: &Jwk, header_alg: Algorithm) -> Result<Algorithm> {
    let Some(declared) = jwk.common.key_algorithm.as_ref() else {
        return Ok(header_alg);
    };
    let declared = Algorithm::from_str(&declared.to_string()).map_err(|_| {
        Error::InvalidIdToken(format!("JWK declares unsupported algorithm {declared}"))
    })?;
    if declared != header_alg {
        return Err(Error::InvalidIdToken(format!(
            "token algorithm {header_alg:?} does not match key algorithm {declared:?}"
        )));
    }
    Ok(declared)
}

fn check_issued_at(iat: i64, now: i64) -> Result<()> {
    if (now - iat).abs() > ISSUED_AT_TOLERANCE_SECS {
        return Err(Error::InvalidIdToken(format!(
            "issued-at {iat} is more than {ISSUED_AT_TOLERANCE_SECS}s from local time {now}"
        )));
    }
    Ok(())
}
