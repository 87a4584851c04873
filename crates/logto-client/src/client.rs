//! The `LogtoClient` orchestrator

use std::sync::Arc;

use logto_auth::{
    CodeGenerator, CodeGrant, IdTokenClaims, IdTokenVerifier, InteractionMode,
    JwksIdTokenVerifier, OFFLINE_ACCESS_SCOPE, OidcConfig, OidcConfigResolver, PkceGenerator,
    RefreshGrant, Requester, SignInUriParams, UserInfo, build_sign_in_url, build_sign_out_url,
    decode_id_token_claims, exchange_code, revoke_token, verify_and_parse_code,
};
use logto_cache::{AccessTokenCache, AccessTokenEntry, AccessTokenKey};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::LogtoConfig;
use crate::error::{Error, NotAuthenticatedReason, Result};
use crate::navigate::Navigate;
use crate::session::{SignInSessionItem, SignInSessionManager};
use crate::storage::{Storage, StorageFacade, TokenEpoch};

/// Scope sent with resource-scoped refresh grants.
const RESOURCE_REFRESH_SCOPES: &[&str] = &[OFFLINE_ACCESS_SCOPE];

/// Host-supplied capabilities.
pub struct Adapters {
    pub storage: Arc<dyn Storage>,
    pub requester: Arc<dyn Requester>,
    pub navigate: Arc<dyn Navigate>,
    pub generator: Arc<dyn CodeGenerator>,
    pub verifier: Arc<dyn IdTokenVerifier>,
}

impl Adapters {
    /// Adapters with the default PKCE generator and a JWKS verifier that
    /// fetches keys through `requester`.
    pub fn new(
        storage: Arc<dyn Storage>,
        requester: Arc<dyn Requester>,
        navigate: Arc<dyn Navigate>,
    ) -> Self {
        let verifier = Arc::new(JwksIdTokenVerifier::new(requester.clone()));
        Self {
            storage,
            requester,
            navigate,
            generator: Arc::new(PkceGenerator),
            verifier,
        }
    }

    pub fn with_code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_id_token_verifier(mut self, verifier: Arc<dyn IdTokenVerifier>) -> Self {
        self.verifier = verifier;
        self
    }
}

/// Options for one sign-in redirect.
#[derive(Debug, Clone, Default)]
pub struct SignInOptions {
    pub redirect_uri: String,
    pub login_hint: Option<String>,
    pub interaction_mode: Option<InteractionMode>,
}

impl SignInOptions {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            ..Self::default()
        }
    }
}

/// Authorization Code + PKCE client for one Logto application.
///
/// Cheap to clone; clones share storage, the discovery document and the
/// access token cache.
#[derive(Clone)]
pub struct LogtoClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: LogtoConfig,
    storage: Arc<StorageFacade>,
    sessions: SignInSessionManager,
    oidc: OidcConfigResolver,
    access_tokens: AccessTokenCache<Error>,
    requester: Arc<dyn Requester>,
    navigate: Arc<dyn Navigate>,
    verifier: Arc<dyn IdTokenVerifier>,
}

impl LogtoClient {
    pub fn new(config: LogtoConfig, adapters: Adapters) -> Self {
        let storage = Arc::new(StorageFacade::new(adapters.storage));
        let sessions = SignInSessionManager::new(storage.clone(), adapters.generator);
        let oidc = OidcConfigResolver::new(config.endpoint(), adapters.requester.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                storage,
                sessions,
                oidc,
                access_tokens: AccessTokenCache::new(),
                requester: adapters.requester,
                navigate: adapters.navigate,
                verifier: adapters.verifier,
            }),
        }
    }

    pub fn config(&self) -> &LogtoConfig {
        &self.inner.config
    }

    /// The tenant's discovery document, fetched at most once per client.
    pub async fn get_oidc_config(&self) -> Result<Arc<OidcConfig>> {
        Ok(self.inner.oidc.resolve().await?)
    }

    /// Start a sign-in redirecting back to `redirect_uri`. Returns the
    /// authorization URL after handing it to `Navigate`.
    pub async fn sign_in(&self, redirect_uri: &str) -> Result<String> {
        self.sign_in_with(SignInOptions::new(redirect_uri)).await
    }

    /// Start a sign-in with extra authorization parameters.
    ///
    /// Any previous session and tokens are discarded.
    pub async fn sign_in_with(&self, options: SignInOptions) -> Result<String> {
        let inner = &self.inner;
        let oidc = inner.oidc.resolve().await?;
        let start = inner.sessions.begin(&options.redirect_uri).await?;

        let url = build_sign_in_url(&SignInUriParams {
            authorization_endpoint: &oidc.authorization_endpoint,
            client_id: inner.config.app_id(),
            redirect_uri: &start.session.redirect_uri,
            code_challenge: &start.code_challenge,
            state: &start.session.state,
            scopes: inner.config.scopes(),
            resources: inner.config.resources(),
            prompt: inner.config.prompt(),
            login_hint: options.login_hint.as_deref(),
            interaction_mode: options.interaction_mode,
        })?;

        inner.storage.clear_tokens().await?;
        inner.access_tokens.clear().await;

        info!(redirect_uri = %options.redirect_uri, "starting sign-in");
        inner.navigate.navigate(&url);
        Ok(url)
    }

    /// Whether `url` is the callback for the pending sign-in: its origin and
    /// path equal the session's redirect URI. False without a session.
    pub async fn is_sign_in_redirected(&self, url: &str) -> Result<bool> {
        let Some(session) = self.inner.sessions.current().await? else {
            return Ok(false);
        };
        let Ok(parsed) = Url::parse(url) else {
            return Ok(false);
        };
        let target = format!("{}{}", parsed.origin().ascii_serialization(), parsed.path());
        Ok(target == session.redirect_uri)
    }

    /// Complete a sign-in from the callback URL.
    ///
    /// Verification failures (redirect URI, provider error, state, missing
    /// code) keep the session so the host can retry. Once the code has been
    /// sent to the token endpoint the session is spent: any later failure
    /// clears it.
    pub async fn handle_sign_in_callback(&self, callback_uri: &str) -> Result<()> {
        let inner = &self.inner;
        let session = inner
            .sessions
            .current()
            .await?
            .ok_or(Error::SignInSessionNotFound)?;

        let code = verify_and_parse_code(callback_uri, &session.redirect_uri, &session.state)
            .inspect_err(|e| warn!(error = %e, "sign-in callback rejected"))?;
        let oidc = inner.oidc.resolve().await?;

        let (entry, id_token, refresh_token, claims) =
            match inner.redeem_code(&oidc, &session, &code).await {
                Ok(redeemed) => redeemed,
                Err(e) => {
                    warn!(error = %e, "code exchange failed, discarding sign-in session");
                    inner.sessions.clear().await?;
                    return Err(e);
                }
            };

        inner
            .storage
            .commit_sign_in(&id_token, refresh_token.as_deref())
            .await?;
        inner
            .access_tokens
            .insert(AccessTokenKey::unscoped(), entry)
            .await;

        info!(sub = %claims.sub, "sign-in completed");
        Ok(())
    }

    /// Access token for `resource` (or the default audience when `None`).
    ///
    /// Served from cache while unexpired. Otherwise the refresh token is
    /// redeemed; concurrent callers for the same resource share one request.
    pub async fn get_access_token(&self, resource: Option<&str>) -> Result<String> {
        let inner = &self.inner;
        if inner.storage.id_token().await?.is_none() {
            return Err(Error::NotAuthenticated(
                NotAuthenticatedReason::MissingIdToken,
            ));
        }

        let key = AccessTokenKey::for_resource(resource);
        let refresher = Arc::clone(inner);
        let resource = resource.map(str::to_owned);
        inner
            .access_tokens
            .get_or_refresh(key, move || async move {
                refresher.refresh_access_token(resource.as_deref()).await
            })
            .await
    }

    /// Claims of the stored ID token, decoded without verification.
    pub async fn get_id_token_claims(&self) -> Result<IdTokenClaims> {
        let id_token = self.get_id_token().await?.ok_or(Error::NotAuthenticated(
            NotAuthenticatedReason::MissingIdToken,
        ))?;
        Ok(decode_id_token_claims(&id_token)?)
    }

    pub async fn get_id_token(&self) -> Result<Option<String>> {
        self.inner.storage.id_token().await
    }

    pub async fn get_refresh_token(&self) -> Result<Option<String>> {
        self.inner.storage.refresh_token().await
    }

    /// Signed in means an ID token is stored.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.inner.storage.id_token().await?.is_some())
    }

    /// Profile of the signed-in user from the userinfo endpoint.
    pub async fn fetch_user_info(&self) -> Result<UserInfo> {
        let access_token = self.get_access_token(None).await?;
        let oidc = self.inner.oidc.resolve().await?;
        Ok(logto_auth::fetch_user_info(
            self.inner.requester.as_ref(),
            &oidc.userinfo_endpoint,
            &access_token,
        )
        .await?)
    }

    /// Drop every cached access token; the next `get_access_token` refreshes.
    pub async fn clear_access_token(&self) {
        self.inner.access_tokens.clear().await;
    }

    /// Drop every cached access token and the stored id and refresh tokens.
    pub async fn clear_all_tokens(&self) -> Result<()> {
        self.inner.access_tokens.clear().await;
        self.inner.storage.clear_tokens().await
    }

    /// Sign out and navigate to the end-session URL, which is also returned.
    ///
    /// Local state is cleared before any network call. Refresh token
    /// revocation is best-effort.
    pub async fn sign_out(&self, post_logout_redirect_uri: Option<&str>) -> Result<String> {
        let inner = &self.inner;
        let id_token = inner
            .storage
            .id_token()
            .await?
            .ok_or(Error::NotAuthenticated(
                NotAuthenticatedReason::MissingIdToken,
            ))?;
        let refresh_token = inner.storage.refresh_token().await?;

        inner.access_tokens.clear().await;
        inner.storage.clear_tokens().await?;

        let oidc = inner.oidc.resolve().await?;
        if let Some(token) = refresh_token {
            if let Err(e) = revoke_token(
                inner.requester.as_ref(),
                &oidc.revocation_endpoint,
                inner.config.app_id(),
                &token,
            )
            .await
            {
                warn!(error = %e, "refresh token revocation failed, continuing sign-out");
            }
        }

        let url = build_sign_out_url(
            &oidc.end_session_endpoint,
            inner.config.app_id(),
            &id_token,
            post_logout_redirect_uri,
        )?;
        info!("signed out");
        inner.navigate.navigate(&url);
        Ok(url)
    }
}

impl Inner {
    /// Exchange the code and verify the returned ID token.
    async fn redeem_code(
        &self,
        oidc: &OidcConfig,
        session: &SignInSessionItem,
        code: &str,
    ) -> Result<(AccessTokenEntry, String, Option<String>, IdTokenClaims)> {
        let response = exchange_code(
            self.requester.as_ref(),
            &CodeGrant {
                token_endpoint: &oidc.token_endpoint,
                client_id: self.config.app_id(),
                code,
                code_verifier: &session.code_verifier,
                redirect_uri: &session.redirect_uri,
            },
        )
        .await?;

        let id_token = response
            .id_token
            .as_ref()
            .map(|t| t.expose_owned())
            .ok_or_else(|| Error::InvalidIdToken("token response has no id_token".into()))?;
        let claims = self.verify_id_token(&id_token, oidc).await?;

        let refresh_token = response.refresh_token.as_ref().map(|t| t.expose_owned());
        let entry = AccessTokenEntry::from_expires_in(
            response.access_token.expose_owned(),
            response.scope.clone(),
            response.expires_in,
        );
        Ok((entry, id_token, refresh_token, claims))
    }

    /// Refresh path run once per cache key; every failure except a missing or
    /// cleared session is wrapped in `GetAccessTokenByRefreshTokenFailed`.
    async fn refresh_access_token(&self, resource: Option<&str>) -> Result<AccessTokenEntry> {
        let (refresh_token, epoch) = match self.storage.refresh_token_at_epoch().await {
            Ok((Some(token), epoch)) => (token, epoch),
            Ok((None, _)) => {
                return Err(Error::NotAuthenticated(
                    NotAuthenticatedReason::MissingRefreshToken,
                ));
            }
            Err(e) => return Err(Error::GetAccessTokenByRefreshTokenFailed(Box::new(e))),
        };

        self.redeem_refresh_token(&refresh_token, epoch, resource)
            .await
            .map_err(|e| match e {
                Error::NotAuthenticated(_) => e,
                e => {
                    warn!(error = %e, resource, "access token refresh failed");
                    Error::GetAccessTokenByRefreshTokenFailed(Box::new(e))
                }
            })
    }

    async fn redeem_refresh_token(
        &self,
        refresh_token: &str,
        epoch: TokenEpoch,
        resource: Option<&str>,
    ) -> Result<AccessTokenEntry> {
        let oidc = self.oidc.resolve().await?;
        let response = logto_auth::refresh_token(
            self.requester.as_ref(),
            &RefreshGrant {
                token_endpoint: &oidc.token_endpoint,
                client_id: self.config.app_id(),
                refresh_token,
                resource,
                scopes: resource.map(|_| RESOURCE_REFRESH_SCOPES),
            },
        )
        .await?;

        let id_token = response.id_token.as_ref().map(|t| t.expose().as_str());
        if let Some(id_token) = id_token {
            self.verify_id_token(id_token, &oidc).await?;
        }
        let stored = self
            .storage
            .store_rotated(
                epoch,
                id_token,
                response.refresh_token.as_ref().map(|t| t.expose().as_str()),
            )
            .await?;
        if !stored {
            debug!(resource, "tokens cleared during refresh, discarding response");
            return Err(Error::NotAuthenticated(
                NotAuthenticatedReason::TokensCleared,
            ));
        }

        debug!(resource, expires_in = response.expires_in, "access token refreshed");
        Ok(AccessTokenEntry::from_expires_in(
            response.access_token.expose_owned(),
            response.scope.clone(),
            response.expires_in,
        ))
    }

    async fn verify_id_token(&self, id_token: &str, oidc: &OidcConfig) -> Result<IdTokenClaims> {
        self.verifier
            .verify(
                id_token,
                self.config.app_id(),
                &oidc.issuer,
                &oidc.jwks_uri,
            )
            .await
            .map_err(|e| match e {
                logto_auth::Error::InvalidIdToken(msg) => Error::InvalidIdToken(msg),
                other => Error::InvalidIdToken(other.to_string()),
            })
    }
}
