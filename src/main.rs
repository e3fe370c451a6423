//! # Main — CLI Entry Point
//!
//! Loads `.env`, initialises logging and routes subcommands to [`cli`].
//!
//! ## Subcommands
//!
//! - `serve`: run the HTTP API (progression engine, read models, notifications).
//! - `migrate`: apply the embedded schema and exit.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection.
//! - `--config`: optional TOML file with [`precastflow::config::ServerConfig`].
//! - `--jwt-secret` / `JWT_SECRET`: HS256 secret for session tokens.
//! - `--fcm-server-key` / `FCM_SERVER_KEY`: enables push delivery.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "precastflow",
    about = "Precast production workflow: stage progression, QC gating, stockyard hand-off"
)]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// TOML configuration file; explicit flags and env vars take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Secret used to verify HS256 session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// FCM server key; push delivery is disabled without it
    #[arg(long, env = "FCM_SERVER_KEY", hide_env_values = true)]
    fcm_server_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Port to listen on (default 7010, or `port` from the config file)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Apply database migrations and exit
    Migrate,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for K8s, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { port } => cli::run_serve(&cli, *port),
        Commands::Migrate => cli::run_migrate(&cli),
    }
}
