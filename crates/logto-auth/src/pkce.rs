//! PKCE (Proof Key for Code Exchange) and state generation per RFC 7636
//!
//! The verifier stays with the client in the sign-in session and is sent
//! during code exchange; the challenge goes into the authorization URL so the
//! authorization server can check both requests came from the same party.
//! The state token binds the callback to the session that started it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes encoded as URL-safe base64 without padding: 86
/// characters, inside the 43-128 range RFC 7636 allows.
pub fn generate_verifier() -> String {
    random_base64url::<64>()
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random state token for CSRF protection.
pub fn generate_state() -> String {
    random_base64url::<64>()
}

fn random_base64url<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Source of verifiers, challenges and state tokens.
///
/// Injected into the client so runtimes with their own randomness source (or
/// tests that need fixed values) can replace the default.
pub trait CodeGenerator: Send + Sync {
    fn code_verifier(&self) -> String;

    fn code_challenge(&self, verifier: &str) -> String;

    fn state(&self) -> String;
}

/// Default generator backed by the thread-local CSPRNG and SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct PkceGenerator;

impl CodeGenerator for PkceGenerator {
    fn code_verifier(&self) -> String {
        generate_verifier()
    }

    fn code_challenge(&self, verifier: &str) -> String {
        compute_challenge(verifier)
    }

    fn state(&self) -> String {
        generate_state()
    }
}
