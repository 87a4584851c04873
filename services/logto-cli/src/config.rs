//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! `LOGTO_ENDPOINT` and `LOGTO_APP_ID` override the `[logto]` table so one
//! file can be pointed at different tenants.

use logto_client::LogtoConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct LogtoCliConfig {
    pub logto: LogtoSection,
    #[serde(default)]
    pub cli: CliSection,
}

/// Logto application settings
#[derive(Debug, Deserialize)]
pub struct LogtoSection {
    pub endpoint: String,
    pub app_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Keep tokens in `storage_path` between runs; in-memory otherwise.
    #[serde(default = "default_persist_storage")]
    pub persist_storage: bool,
}

/// Local runtime settings
#[derive(Debug, Deserialize)]
pub struct CliSection {
    /// Loopback address the sign-in callback listener binds.
    #[serde(default = "default_callback_addr")]
    pub callback_addr: SocketAddr,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// How long `sign-in` waits for the browser to come back.
    #[serde(default = "default_sign_in_timeout")]
    pub sign_in_timeout_secs: u64,
}

impl Default for CliSection {
    fn default() -> Self {
        Self {
            callback_addr: default_callback_addr(),
            callback_path: default_callback_path(),
            storage_path: default_storage_path(),
            timeout_secs: default_timeout(),
            sign_in_timeout_secs: default_sign_in_timeout(),
        }
    }
}

fn default_persist_storage() -> bool {
    true
}

fn default_callback_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_callback_path() -> String {
    "/callback".into()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("logto-session.json")
}

fn default_timeout() -> u64 {
    30
}

fn default_sign_in_timeout() -> u64 {
    300
}

impl LogtoCliConfig {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: LogtoCliConfig = toml::from_str(&contents)?;

        if let Ok(endpoint) = std::env::var("LOGTO_ENDPOINT") {
            config.logto.endpoint = endpoint;
        }
        if let Ok(app_id) = std::env::var("LOGTO_APP_ID") {
            config.logto.app_id = app_id;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.logto.endpoint.starts_with("http://") && !self.logto.endpoint.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "endpoint must start with http:// or https://, got: {}",
                self.logto.endpoint
            )));
        }

        if self.logto.app_id.trim().is_empty() {
            return Err(common::Error::Config("app_id must not be empty".into()));
        }

        if self.cli.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.cli.callback_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "callback_path must start with '/', got: {}",
                self.cli.callback_path
            )));
        }

        Ok(())
    }

    /// Client configuration for the `[logto]` table.
    pub fn logto_config(&self) -> LogtoConfig {
        let mut config = LogtoConfig::new(&self.logto.endpoint, &self.logto.app_id)
            .with_scopes(self.logto.scopes.iter().cloned())
            .with_resources(self.logto.resources.iter().cloned())
            .with_persist_storage(self.logto.persist_storage);
        if let Some(prompt) = &self.logto.prompt {
            config = config.with_prompt(prompt);
        }
        config
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("logto-cli.toml")
    }
}
