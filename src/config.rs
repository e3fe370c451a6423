//! Server configuration.
//!
//! Loaded from an optional TOML file; explicit CLI flags and environment
//! variables (resolved by clap in `main`) are applied on top with
//! [`ServerConfig::apply_overrides`].
//!
//! ```toml
//! port = 7010
//! max_connections = 10
//! request_timeout_secs = 30
//! statement_timeout_ms = 5000
//! jwt_secret = "change-me"
//! public_base_url = "https://precast.example.com"
//! outbox_capacity = 1024
//!
//! [push]
//! fcm_server_key = "AAAA..."
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_connections: u32,
    pub request_timeout_secs: u64,
    /// `SET LOCAL statement_timeout` applied to every transition.
    pub statement_timeout_ms: u64,
    pub jwt_secret: String,
    /// Prefix of `action_url` in notification intents.
    pub public_base_url: String,
    pub outbox_capacity: usize,
    pub push: PushConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 7010,
            max_connections: 10,
            request_timeout_secs: 30,
            statement_timeout_ms: 5000,
            jwt_secret: String::new(),
            public_base_url: "http://localhost:7010".to_string(),
            outbox_capacity: 1024,
            push: PushConfig::default(),
        }
    }
}

/// The `[push]` section. Push delivery is disabled without a server key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub fcm_server_key: Option<String>,
    pub fcm_endpoint: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            fcm_server_key: None,
            fcm_endpoint: "https://fcm.googleapis.com/fcm/send".to_string(),
        }
    }
}

/// Values given explicitly on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
    pub fcm_server_key: Option<String>,
}

impl ServerConfig {
    pub fn parse_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    pub fn apply_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(secret) = overrides.jwt_secret {
            self.jwt_secret = secret;
        }
        if let Some(key) = overrides.fcm_server_key {
            self.push.fcm_server_key = Some(key);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be positive");
        }
        if self.statement_timeout_ms == 0 {
            bail!("statement_timeout_ms must be positive");
        }
        if self.jwt_secret.trim().is_empty() {
            bail!("jwt_secret is required (set JWT_SECRET or jwt_secret in the config file)");
        }
        if self.outbox_capacity == 0 {
            bail!("outbox_capacity must be at least 1");
        }
        url::Url::parse(&self.public_base_url)
            .map_err(|e| anyhow::anyhow!("public_base_url is not a URL: {}", e))?;
        Ok(())
    }
}
