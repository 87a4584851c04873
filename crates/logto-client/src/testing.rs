//! In-process Logto tenant and capability fakes for client tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use logto_auth::{
    CodeGenerator, HttpRequest, HttpResponse, IdTokenClaims, IdTokenVerifier, Requester,
    decode_id_token_claims, discovery_url,
};
use serde_json::json;

use crate::navigate::Navigate;

pub const ENDPOINT: &str = "https://logto.dev";
pub const APP_ID: &str = "foo";
pub const REDIRECT_URI: &str = "https://app.example/callback";
pub const AUTHORIZATION_ENDPOINT: &str = "https://logto.dev/oidc/auth";
pub const TOKEN_ENDPOINT: &str = "https://logto.dev/oidc/token";
pub const USERINFO_ENDPOINT: &str = "https://logto.dev/oidc/me";
pub const END_SESSION_ENDPOINT: &str = "https://logto.dev/oidc/session/end";
pub const REVOCATION_ENDPOINT: &str = "https://logto.dev/oidc/token/revocation";
pub const JWKS_URI: &str = "https://logto.dev/oidc/jwks";
pub const ISSUER: &str = "https://logto.dev/oidc";

/// Unsigned JWT carrying the given claims; only `FakeVerifier` accepts it.
pub fn id_token(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let now = common::unix_now();
    let claims = json!({
        "iss": ISSUER,
        "sub": sub,
        "aud": APP_ID,
        "exp": now + 3600,
        "iat": now,
        "name": "Jane",
    });
    let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{claims}.sig")
}

/// Fake tenant answering discovery, token, revocation and userinfo requests.
///
/// Code exchanges issue `at-code` / `rt-0`; the n-th refresh issues `at-n`
/// and rotates the refresh token to `rt-n`.
pub struct FakeLogto {
    calls: Mutex<Vec<HttpRequest>>,
    refreshes: AtomicUsize,
    pub code_expires_in: AtomicU64,
    pub fail_discovery: AtomicBool,
    pub fail_exchange: AtomicBool,
    pub reject_refresh: AtomicBool,
    pub fail_revocation: AtomicBool,
    pub omit_refresh_token: AtomicBool,
    delay: Option<Duration>,
}

impl Default for FakeLogto {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            refreshes: AtomicUsize::new(0),
            code_expires_in: AtomicU64::new(3600),
            fail_discovery: AtomicBool::new(false),
            fail_exchange: AtomicBool::new(false),
            reject_refresh: AtomicBool::new(false),
            fail_revocation: AtomicBool::new(false),
            omit_refresh_token: AtomicBool::new(false),
            delay: None,
        }
    }
}

impl FakeLogto {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls_to(&self, url: &str) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    /// Token endpoint calls made with `grant_type=refresh_token`.
    pub fn refresh_calls(&self) -> Vec<HttpRequest> {
        self.calls_to(TOKEN_ENDPOINT)
            .into_iter()
            .filter(|r| r.form_value("grant_type") == Some("refresh_token"))
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn respond(&self, request: &HttpRequest) -> HttpResponse {
        let discovery = discovery_url(ENDPOINT);
        match request.url.as_str() {
            url if url == discovery => {
                if self.fail_discovery.load(Ordering::SeqCst) {
                    return HttpResponse::new(503, "unavailable");
                }
                ok(json!({
                    "authorization_endpoint": AUTHORIZATION_ENDPOINT,
                    "token_endpoint": TOKEN_ENDPOINT,
                    "userinfo_endpoint": USERINFO_ENDPOINT,
                    "end_session_endpoint": END_SESSION_ENDPOINT,
                    "revocation_endpoint": REVOCATION_ENDPOINT,
                    "jwks_uri": JWKS_URI,
                    "issuer": ISSUER,
                }))
            }
            TOKEN_ENDPOINT => self.token(request),
            REVOCATION_ENDPOINT => {
                if self.fail_revocation.load(Ordering::SeqCst) {
                    HttpResponse::new(500, "revocation down")
                } else {
                    HttpResponse::new(200, "")
                }
            }
            USERINFO_ENDPOINT => match request.bearer_token.as_deref() {
                Some(_) => ok(json!({ "sub": "user-1", "name": "Jane", "email": "jane@example.com" })),
                None => HttpResponse::new(401, "missing bearer"),
            },
            _ => HttpResponse::new(404, "not found"),
        }
    }

    fn token(&self, request: &HttpRequest) -> HttpResponse {
        match request.form_value("grant_type") {
            Some("authorization_code") => {
                if self.fail_exchange.load(Ordering::SeqCst) {
                    return HttpResponse::new(400, r#"{"error":"invalid_request"}"#);
                }
                let mut body = json!({
                    "access_token": "at-code",
                    "id_token": id_token("user-1"),
                    "scope": "openid offline_access profile",
                    "expires_in": self.code_expires_in.load(Ordering::SeqCst),
                    "token_type": "Bearer",
                });
                if !self.omit_refresh_token.load(Ordering::SeqCst) {
                    body["refresh_token"] = json!("rt-0");
                }
                ok(body)
            }
            Some("refresh_token") => {
                if self.reject_refresh.load(Ordering::SeqCst) {
                    return HttpResponse::new(400, r#"{"error":"invalid_grant"}"#);
                }
                let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
                ok(json!({
                    "access_token": format!("at-{n}"),
                    "refresh_token": format!("rt-{n}"),
                    "scope": "openid offline_access profile",
                    "expires_in": 3600,
                    "token_type": "Bearer",
                }))
            }
            _ => HttpResponse::new(400, r#"{"error":"unsupported_grant_type"}"#),
        }
    }
}

fn ok(body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(200, body.to_string())
}

impl Requester for FakeLogto {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = logto_auth::Result<HttpResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.respond(&request))
        })
    }
}

/// Generator with fixed outputs so URLs and sessions are predictable.
pub struct FixedGenerator;

impl FixedGenerator {
    pub const VERIFIER: &'static str = "fixed-verifier";
    pub const CHALLENGE: &'static str = "fixed-challenge";
    pub const STATE: &'static str = "fixed-state";
}

impl CodeGenerator for FixedGenerator {
    fn code_verifier(&self) -> String {
        Self::VERIFIER.to_string()
    }

    fn code_challenge(&self, _verifier: &str) -> String {
        Self::CHALLENGE.to_string()
    }

    fn state(&self) -> String {
        Self::STATE.to_string()
    }
}

/// Accepts any structurally valid token whose `aud` and `iss` match, unless
/// told to reject.
#[derive(Default)]
pub struct FakeVerifier {
    pub reject: AtomicBool,
}

impl IdTokenVerifier for FakeVerifier {
    fn verify<'a>(
        &'a self,
        id_token: &'a str,
        audience: &'a str,
        issuer: &'a str,
        _jwks_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = logto_auth::Result<IdTokenClaims>> + Send + 'a>> {
        Box::pin(async move {
            if self.reject.load(Ordering::SeqCst) {
                return Err(logto_auth::Error::InvalidIdToken("signature mismatch".into()));
            }
            let claims = decode_id_token_claims(id_token)?;
            if claims.aud != audience || claims.iss != issuer {
                return Err(logto_auth::Error::InvalidIdToken("foreign token".into()));
            }
            Ok(claims)
        })
    }
}

/// Records every URL it is asked to open.
#[derive(Default)]
pub struct RecordingNavigate {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigate {
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

impl Navigate for RecordingNavigate {
    fn navigate(&self, url: &str) {
        self.visited.lock().unwrap().push(url.to_string());
    }
}
