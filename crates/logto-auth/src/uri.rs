//! Authorization, end-session and callback URIs
//!
//! Builders use `url`'s form serializer, so values are percent-encoded the
//! way `application/x-www-form-urlencoded` requires (spaces become `+`).

use url::Url;

use crate::constants::CODE_CHALLENGE_METHOD;
use crate::error::{CallbackError, Result};

/// Which screen the sign-in experience opens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    SignIn,
    SignUp,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMode::SignIn => "signIn",
            InteractionMode::SignUp => "signUp",
        }
    }
}

/// Inputs for the authorization request URL.
#[derive(Debug, Clone)]
pub struct SignInUriParams<'a> {
    pub authorization_endpoint: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub code_challenge: &'a str,
    pub state: &'a str,
    pub scopes: &'a [String],
    pub resources: &'a [String],
    pub prompt: &'a str,
    pub login_hint: Option<&'a str>,
    pub interaction_mode: Option<InteractionMode>,
}

/// Build the authorization URL for a sign-in redirect.
///
/// Each resource indicator becomes its own `resource` parameter. An empty
/// prompt is omitted.
pub fn build_sign_in_url(params: &SignInUriParams<'_>) -> Result<String> {
    let mut url = Url::parse(params.authorization_endpoint)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", params.client_id)
            .append_pair("redirect_uri", params.redirect_uri)
            .append_pair("code_challenge", params.code_challenge)
            .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD)
            .append_pair("state", params.state)
            .append_pair("response_type", "code")
            .append_pair("scope", &params.scopes.join(" "));
        if !params.prompt.is_empty() {
            query.append_pair("prompt", params.prompt);
        }
        for resource in params.resources {
            query.append_pair("resource", resource);
        }
        if let Some(hint) = params.login_hint {
            query.append_pair("login_hint", hint);
        }
        if let Some(mode) = params.interaction_mode {
            query.append_pair("interaction_mode", mode.as_str());
        }
    }
    Ok(url.into())
}

/// Build the end-session URL for a sign-out redirect.
pub fn build_sign_out_url(
    end_session_endpoint: &str,
    client_id: &str,
    id_token: &str,
    post_logout_redirect_uri: Option<&str>,
) -> Result<String> {
    let mut url = Url::parse(end_session_endpoint)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", client_id)
            .append_pair("id_token_hint", id_token);
        if let Some(redirect) = post_logout_redirect_uri {
            query.append_pair("post_logout_redirect_uri", redirect);
        }
    }
    Ok(url.into())
}

/// Check a callback URI against the pending sign-in and return its code.
///
/// Checks run in order: the callback must start with the redirect URI, must
/// not carry an `error`, must carry a `state` equal to `expected_state`, and
/// must carry a `code`.
pub fn verify_and_parse_code(
    callback_uri: &str,
    redirect_uri: &str,
    expected_state: &str,
) -> Result<String> {
    if !callback_uri.starts_with(redirect_uri) {
        return Err(CallbackError::RedirectUriMismatched.into());
    }

    let url = Url::parse(callback_uri)?;
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(CallbackError::ErrorFound { error, description }.into());
    }
    match state {
        None => return Err(CallbackError::MissingState.into()),
        Some(state) if state != expected_state => {
            return Err(CallbackError::StateMismatched.into());
        }
        Some(_) => {}
    }
    code.ok_or_else(|| CallbackError::MissingCode.into())
}
