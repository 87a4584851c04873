//! Logto OIDC protocol primitives
//!
//! Everything in this crate is stateless or self-contained: PKCE and state
//! generation, the HTTP transport capability, the discovery document and its
//! single-flight resolver, token endpoint grants, URL construction, callback
//! verification and ID token handling. The stateful flow lives in
//! `logto-client`; this crate can be tested and used on its own.
//!
//! Sign-in flow, expressed in this crate's terms:
//! 1. `OidcConfigResolver::resolve()` fetches the discovery document once
//! 2. `CodeGenerator` produces state + verifier, `compute_challenge()` the challenge
//! 3. `build_sign_in_url()` produces the authorization URL
//! 4. `verify_and_parse_code()` checks the callback and extracts the code
//! 5. `exchange_code()` trades the code for tokens
//! 6. `IdTokenVerifier::verify()` validates the returned ID token
//! 7. `refresh_token()` / `revoke_token()` manage the refresh token afterwards

pub mod constants;
pub mod discovery;
pub mod error;
pub mod id_token;
pub mod pkce;
pub mod requester;
pub mod token;
pub mod uri;

#[cfg(test)]
pub(crate) mod testing;

pub use constants::*;
pub use discovery::{OidcConfig, OidcConfigResolver, discovery_url, fetch_oidc_config};
pub use error::{CallbackError, Error, Result};
pub use id_token::{IdTokenClaims, IdTokenVerifier, JwksIdTokenVerifier, decode_id_token_claims};
pub use pkce::{CodeGenerator, PkceGenerator, compute_challenge, generate_state, generate_verifier};
pub use requester::{HttpRequest, HttpResponse, Method, Requester, ReqwestRequester};
pub use token::{
    CodeGrant, RefreshGrant, TokenResponse, UserInfo, exchange_code, fetch_user_info,
    refresh_token, revoke_token,
};
pub use uri::{
    InteractionMode, SignInUriParams, build_sign_in_url, build_sign_out_url,
    verify_and_parse_code,
};
