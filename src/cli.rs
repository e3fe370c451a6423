//! # CLI Execution Functions
//!
//! Execution logic for each subcommand, kept out of `main.rs`.

use anyhow::Result;
use precastflow::config::{Overrides, ServerConfig};
use precastflow::{db, server};
use tracing::info;

use super::Cli;

fn database_url(cli: &Cli) -> Result<&str> {
    cli.database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)"))
}

/// File config (or defaults) with explicit flags and env vars applied on top.
fn load_config(cli: &Cli, port: Option<u16>) -> Result<ServerConfig> {
    let base = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path.display(), e))?,
        None => ServerConfig::default(),
    };
    Ok(base.apply_overrides(Overrides {
        port,
        jwt_secret: cli.jwt_secret.clone(),
        fcm_server_key: cli.fcm_server_key.clone(),
    }))
}

pub fn run_serve(cli: &Cli, port: Option<u16>) -> Result<()> {
    let database_url = database_url(cli)?;
    let config = load_config(cli, port)?;
    config.validate()?;
    info!(
        port = config.port,
        max_connections = config.max_connections,
        push_enabled = config.push.fcm_server_key.is_some(),
        "starting precastflow"
    );
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(server::run(config, database_url))
}

pub fn run_migrate(cli: &Cli) -> Result<()> {
    let database_url = database_url(cli)?;
    let config = load_config(cli, None)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let database = db::Database::connect(database_url, config.max_connections).await?;
        database.run_migrations().await?;
        info!(count = db::MIGRATIONS.len(), "schema up to date");
        Ok::<(), anyhow::Error>(())
    })
}
