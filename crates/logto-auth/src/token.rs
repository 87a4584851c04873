//! Token endpoint grants, revocation and userinfo
//!
//! Handles the back-channel interactions with the authorization server:
//! 1. Authorization code exchange (sign-in callback completion)
//! 2. Refresh token grant (access token refresh, optionally resource-scoped)
//! 3. Refresh token revocation (sign-out)
//! 4. Userinfo lookup with a bearer access token
//!
//! Grants POST form-encoded bodies to the discovered `token_endpoint`.

use std::collections::BTreeMap;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::requester::{HttpRequest, HttpResponse, Requester};

/// Response from the token endpoint for both code exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time. The caller
/// converts it to an absolute unix timestamp when caching the access token.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default)]
    pub id_token: Option<Secret<String>>,
    #[serde(default)]
    pub scope: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
}

/// Parameters for the authorization code grant.
#[derive(Debug, Clone, Copy)]
pub struct CodeGrant<'a> {
    pub token_endpoint: &'a str,
    pub client_id: &'a str,
    pub code: &'a str,
    pub code_verifier: &'a str,
    pub redirect_uri: &'a str,
}

/// Parameters for the refresh token grant.
///
/// `scopes` overrides the scope of the new access token; `None` lets the
/// server reuse the scope of the original grant.
#[derive(Clone, Copy)]
pub struct RefreshGrant<'a> {
    pub token_endpoint: &'a str,
    pub client_id: &'a str,
    pub refresh_token: &'a str,
    pub resource: Option<&'a str>,
    pub scopes: Option<&'a [&'a str]>,
}

/// Exchange an authorization code for tokens.
///
/// The verifier proves this client is the one that started the flow; the
/// redirect URI must be the one sent in the authorization request.
pub async fn exchange_code(requester: &dyn Requester, grant: &CodeGrant<'_>) -> Result<TokenResponse> {
    let request = HttpRequest::post_form(
        grant.token_endpoint,
        [
            ("grant_type", "authorization_code"),
            ("code", grant.code),
            ("redirect_uri", grant.redirect_uri),
            ("code_verifier", grant.code_verifier),
            ("client_id", grant.client_id),
        ],
    );

    let response = requester
        .send(request)
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    if !response.is_success() {
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {}: {}",
            response.status, response.body
        )));
    }

    parse_token_response(&response, "token response")
}

/// Fetch a new token set with a refresh token.
pub async fn refresh_token(requester: &dyn Requester, grant: &RefreshGrant<'_>) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", grant.refresh_token.to_string()),
        ("client_id", grant.client_id.to_string()),
    ];
    if let Some(resource) = grant.resource {
        form.push(("resource", resource.to_string()));
    }
    if let Some(scopes) = grant.scopes {
        form.push(("scope", scopes.join(" ")));
    }
    debug!(resource = grant.resource, "requesting refresh grant");

    let response = requester
        .send(HttpRequest::post_form(grant.token_endpoint, form))
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    if !response.is_success() {
        // invalid_grant means the refresh token is revoked, expired or rotated away
        if matches!(response.status, 401 | 403) || is_invalid_grant(&response) {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({}): {}",
                response.status, response.body
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {}: {}",
            response.status, response.body
        )));
    }

    parse_token_response(&response, "refresh response")
}

/// Revoke a refresh token at the revocation endpoint.
pub async fn revoke_token(
    requester: &dyn Requester,
    revocation_endpoint: &str,
    client_id: &str,
    token: &str,
) -> Result<()> {
    let request = HttpRequest::post_form(
        revocation_endpoint,
        [("token", token), ("client_id", client_id)],
    );

    let response = requester
        .send(request)
        .await
        .map_err(|e| Error::Revocation(format!("revocation request failed: {e}")))?;

    if !response.is_success() {
        return Err(Error::Revocation(format!(
            "revocation endpoint returned {}: {}",
            response.status, response.body
        )));
    }
    Ok(())
}

/// Claims returned by the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub phone_number_verified: Option<bool>,
    /// Claims this client does not model explicitly (custom data, identities, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Fetch the signed-in user's profile with an access token.
pub async fn fetch_user_info(
    requester: &dyn Requester,
    userinfo_endpoint: &str,
    access_token: &str,
) -> Result<UserInfo> {
    let response = requester
        .send(HttpRequest::get(userinfo_endpoint).with_bearer(access_token))
        .await
        .map_err(|e| Error::UserInfo(format!("userinfo request failed: {e}")))?;

    if !response.is_success() {
        return Err(Error::UserInfo(format!(
            "userinfo endpoint returned {}: {}",
            response.status, response.body
        )));
    }

    response
        .json::<UserInfo>()
        .map_err(|e| Error::UserInfo(format!("invalid userinfo response: {e}")))
}

fn parse_token_response(response: &HttpResponse, what: &str) -> Result<TokenResponse> {
    response
        .json::<TokenResponse>()
        .map_err(|e| Error::TokenExchange(format!("invalid {what}: {e}")))
}

fn is_invalid_grant(response: &HttpResponse) -> bool {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: String,
    }

    response.status == 400
        && response
            .json::<OAuthErrorBody>()
            .is_ok_and(|body| body.error == "invalid_grant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRequester;

    const TOKEN: &str = "https://logto.dev/oidc/token";

    fn code_grant() -> CodeGrant<'static> {
        CodeGrant {
            token_endpoint: TOKEN,
            client_id: "foo",
            code: "code_123",
            code_verifier: "verifier_abc",
            redirect_uri: "https://app.example/cb",
        }
    }

    #[test]
    fn token_response_deserializes() {
        let json = r#"{"access_token":"at_abc","refresh_token":"rt_def","id_token":"id.tok.en","scope":"openid offline_access","expires_in":3600}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token.expose(), "at_abc");
        assert_eq!(token.refresh_token.unwrap().expose(), "rt_def");
        assert_eq!(token.id_token.unwrap().expose(), "id.tok.en");
        assert_eq!(token.scope, "openid offline_access");
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn token_response_optional_fields_default() {
        let json = r#"{"access_token":"at_abc","expires_in":60}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(token.refresh_token.is_none());
        assert!(token.id_token.is_none());
        assert_eq!(token.scope, "");
        assert!(!format!("{token:?}").contains("at_abc"));
    }

    #[tokio::test]
    async fn exchange_sends_code_grant_form() {
        let requester = MockRequester::new().json(
            TOKEN,
            200,
            serde_json::json!({"access_token": "at", "expires_in": 3600, "scope": "openid"}),
        );
        let token = exchange_code(&requester, &code_grant()).await.unwrap();
        assert_eq!(token.access_token.expose(), "at");

        let calls = requester.calls_to(TOKEN);
        assert_eq!(calls.len(), 1);
        let request = &calls[0];
        assert_eq!(request.form_value("grant_type"), Some("authorization_code"));
        assert_eq!(request.form_value("code"), Some("code_123"));
        assert_eq!(request.form_value("code_verifier"), Some("verifier_abc"));
        assert_eq!(request.form_value("redirect_uri"), Some("https://app.example/cb"));
        assert_eq!(request.form_value("client_id"), Some("foo"));
    }

    #[tokio::test]
    async fn exchange_rejects_error_status() {
        let requester = MockRequester::new().json(
            TOKEN,
            400,
            serde_json::json!({"error": "invalid_grant"}),
        );
        let err = exchange_code(&requester, &code_grant()).await.unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refresh_includes_resource_and_scope() {
        let requester = MockRequester::new().json(
            TOKEN,
            200,
            serde_json::json!({"access_token": "at_r", "expires_in": 3600}),
        );
        let grant = RefreshGrant {
            token_endpoint: TOKEN,
            client_id: "foo",
            refresh_token: "rt_1",
            resource: Some("https://api.example"),
            scopes: Some(&["offline_access"]),
        };
        refresh_token(&requester, &grant).await.unwrap();

        let request = &requester.calls_to(TOKEN)[0];
        assert_eq!(request.form_value("grant_type"), Some("refresh_token"));
        assert_eq!(request.form_value("refresh_token"), Some("rt_1"));
        assert_eq!(request.form_value("resource"), Some("https://api.example"));
        assert_eq!(request.form_value("scope"), Some("offline_access"));
    }

    #[tokio::test]
    async fn refresh_without_resource_omits_optional_fields() {
        let requester = MockRequester::new().json(
            TOKEN,
            200,
            serde_json::json!({"access_token": "at", "expires_in": 3600}),
        );
        let grant = RefreshGrant {
            token_endpoint: TOKEN,
            client_id: "foo",
            refresh_token: "rt_1",
            resource: None,
            scopes: None,
        };
        refresh_token(&requester, &grant).await.unwrap();

        let request = &requester.calls_to(TOKEN)[0];
        assert_eq!(request.form_value("resource"), None);
        assert_eq!(request.form_value("scope"), None);
    }

    #[tokio::test]
    async fn refresh_invalid_grant_is_invalid_credentials() {
        let requester = MockRequester::new().json(
            TOKEN,
            400,
            serde_json::json!({"error": "invalid_grant", "error_description": "grant request is invalid"}),
        );
        let grant = RefreshGrant {
            token_endpoint: TOKEN,
            client_id: "foo",
            refresh_token: "rt_revoked",
            resource: None,
            scopes: None,
        };
        let err = refresh_token(&requester, &grant).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn revoke_posts_token() {
        let revocation = "https://logto.dev/oidc/token/revocation";
        let requester = MockRequester::new().route(revocation, |_| Ok(HttpResponse::new(200, "")));
        revoke_token(&requester, revocation, "foo", "rt_1").await.unwrap();

        let request = &requester.calls_to(revocation)[0];
        assert_eq!(request.form_value("token"), Some("rt_1"));
        assert_eq!(request.form_value("client_id"), Some("foo"));
    }

    #[tokio::test]
    async fn revoke_error_status_is_revocation_error() {
        let revocation = "https://logto.dev/oidc/token/revocation";
        let requester = MockRequester::new().route(revocation, |_| Ok(HttpResponse::new(500, "boom")));
        let err = revoke_token(&requester, revocation, "foo", "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Revocation(_)));
    }

    #[tokio::test]
    async fn user_info_sends_bearer_and_keeps_extra_claims() {
        let me = "https://logto.dev/oidc/me";
        let requester = MockRequester::new().json(
            me,
            200,
            serde_json::json!({"sub": "user_1", "username": "alice", "custom_data": {"tier": "pro"}}),
        );
        let info = fetch_user_info(&requester, me, "at_user").await.unwrap();
        assert_eq!(info.sub, "user_1");
        assert_eq!(info.username.as_deref(), Some("alice"));
        assert_eq!(info.extra["custom_data"]["tier"], "pro");

        let request = &requester.calls_to(me)[0];
        assert_eq!(request.bearer_token.as_deref(), Some("at_user"));
    }
}
