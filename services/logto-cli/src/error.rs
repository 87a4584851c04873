//! CLI-specific error types

use thiserror::Error;

/// Failures of the CLI runtime itself. Client and config errors keep their
/// own types and are wrapped by `anyhow` at the top level.
#[derive(Error, Debug)]
pub enum Error {
    #[error("callback listener failed: {0}")]
    Listener(String),

    #[error("no sign-in callback received within {0}s")]
    CallbackTimeout(u64),
}

/// Result alias using CLI Error
pub type Result<T> = std::result::Result<T, Error>;
