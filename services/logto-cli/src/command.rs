//! Command-line interface

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "logto-cli")]
#[command(about = "Sign in to a Logto application and print its tokens")]
#[command(version)]
pub struct Cli {
    /// Config file (overrides CONFIG_PATH)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sign in through the browser
    SignIn {
        /// Prefill the identifier on the sign-in page
        #[arg(long)]
        login_hint: Option<String>,
        /// Open the registration page instead of sign-in
        #[arg(long)]
        sign_up: bool,
    },
    /// Print an access token
    Token {
        /// API resource indicator; the default audience when omitted
        #[arg(long)]
        resource: Option<String>,
    },
    /// Print the ID token claims
    Claims,
    /// Print the userinfo response
    #[command(name = "userinfo")]
    UserInfo,
    /// Sign out and revoke the refresh token
    SignOut {
        #[arg(long)]
        post_logout_redirect_uri: Option<String>,
    },
    /// Show whether a user is signed in
    Status,
}
