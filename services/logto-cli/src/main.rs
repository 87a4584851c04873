//! Logto CLI
//!
//! Command-line runtime for the Logto client:
//! 1. Loads TOML config (`--config` / `CONFIG_PATH`) with env overrides
//! 2. Persists tokens in a 0600 session file between runs
//! 3. Completes browser sign-in through a loopback callback listener
//! 4. Prints tokens, claims and userinfo for scripting

mod command;
mod config;
mod error;
mod file_storage;
mod loopback;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use logto_client::{
    Adapters, InteractionMode, LogtoClient, MemoryStorage, Navigate, Requester, ReqwestRequester,
    SignInOptions, Storage,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::{Cli, Command};
use crate::config::LogtoCliConfig;
use crate::file_storage::FileStorage;
use crate::loopback::CallbackListener;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr with LOG_LEVEL / RUST_LOG support; stdout is for command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let config_path = LogtoCliConfig::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = LogtoCliConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        endpoint = %config.logto.endpoint,
        app_id = %config.logto.app_id,
        persist_storage = config.logto.persist_storage,
        "configuration loaded"
    );

    let client = build_client(&config).await?;
    run(&client, &config, cli.command).await
}

async fn build_client(config: &LogtoCliConfig) -> Result<LogtoClient> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.cli.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let requester: Arc<dyn Requester> = Arc::new(ReqwestRequester::new(http));

    let logto = config.logto_config();
    let storage: Arc<dyn Storage> = if logto.using_persist_storage() {
        let path = config.cli.storage_path.clone();
        let storage = FileStorage::load(path)
            .await
            .context("failed to open session file")?;
        info!(path = %storage.path().display(), "using file storage");
        Arc::new(storage)
    } else {
        Arc::new(MemoryStorage::new())
    };
    let navigate: Arc<dyn Navigate> = Arc::new(print_url);

    Ok(LogtoClient::new(
        logto,
        Adapters::new(storage, requester, navigate),
    ))
}

/// The CLI cannot drive a browser; the user opens the URL.
fn print_url(url: &str) {
    println!("Open this URL in your browser:\n{url}\n");
}

async fn run(client: &LogtoClient, config: &LogtoCliConfig, command: Command) -> Result<()> {
    match command {
        Command::SignIn {
            login_hint,
            sign_up,
        } => {
            let listener = CallbackListener::bind(config.cli.callback_addr, &config.cli.callback_path)
                .await?;
            client
                .sign_in_with(SignInOptions {
                    redirect_uri: listener.redirect_uri().to_string(),
                    login_hint,
                    interaction_mode: sign_up.then_some(InteractionMode::SignUp),
                })
                .await
                .context("failed to start sign-in")?;

            let callback = listener
                .wait(Duration::from_secs(config.cli.sign_in_timeout_secs))
                .await?;
            client
                .handle_sign_in_callback(&callback)
                .await
                .context("sign-in callback failed")?;

            let claims = client.get_id_token_claims().await?;
            let who = claims
                .username
                .as_deref()
                .or(claims.email.as_deref())
                .unwrap_or(&claims.sub);
            println!("Signed in as {who}");
        }
        Command::Token { resource } => {
            let token = client
                .get_access_token(resource.as_deref())
                .await
                .context("failed to get access token")?;
            println!("{token}");
        }
        Command::Claims => {
            let claims = client.get_id_token_claims().await?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Command::UserInfo => {
            let info = client
                .fetch_user_info()
                .await
                .context("failed to fetch userinfo")?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::SignOut {
            post_logout_redirect_uri,
        } => {
            client
                .sign_out(post_logout_redirect_uri.as_deref())
                .await
                .context("failed to sign out")?;
            println!("Signed out");
        }
        Command::Status => {
            if client.is_authenticated().await? {
                let claims = client.get_id_token_claims().await?;
                println!("Signed in as {} (id token expires at {})", claims.sub, claims.exp);
            } else {
                println!("Not signed in");
            }
        }
    }
    Ok(())
}
