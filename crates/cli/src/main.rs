//! Corner Shop CLI - Database migrations and application management.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! cs-cli migrate
//!
//! # Register a token-issuing application with a generated secret
//! cs-cli app create --name web
//!
//! # Register an application with a secret you supply
//! cs-cli app create --name mobile --secret "$MOBILE_SIGNING_SECRET"
//!
//! # Delete expired guest sessions and their carts
//! cs-cli session purge
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `app create` - Register an application and its signing secret
//! - `session purge` - Delete expired guest sessions

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use secrecy::SecretString;

mod commands;

#[derive(Parser)]
#[command(name = "cs-cli")]
#[command(author, version, about = "Corner Shop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Manage token-issuing applications
    App {
        #[command(subcommand)]
        action: AppAction,
    },
    /// Maintain guest sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Delete expired guest sessions and their cart lines
    Purge,
}

#[derive(Subcommand)]
enum AppAction {
    /// Register a new application
    Create {
        /// Application name (unique)
        #[arg(short, long)]
        name: String,

        /// Signing secret; 32 random bytes are generated when omitted
        #[arg(short, long, env = "CS_APP_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::App { action } => match action {
            AppAction::Create { name, secret } => {
                commands::app::create(&name, secret.map(SecretString::from)).await?;
            }
        },
        Commands::Session { action } => match action {
            SessionAction::Purge => commands::session::purge().await?,
        },
    }
    Ok(())
}
