use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use marketbridge_protocol::ThreadVisibility;
use serde::Deserialize;
use thiserror::Error;

use crate::routing::BootstrapRoute;

/// Config file used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "marketbridge.yaml";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default = "default_frontend_base_url")]
    pub frontend_base_url: String,
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Category code to display name, merged over the built-in catalog.
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
    #[serde(default)]
    pub discord: DiscordSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            webhook: WebhookConfig::default(),
            frontend_base_url: default_frontend_base_url(),
            routing: RoutingConfig::default(),
            categories: BTreeMap::new(),
            discord: DiscordSettings::default(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let config: Self = serde_saphyr::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.frontend_base_url).map_err(|e| {
            ConfigError::InvalidFrontendUrl(format!("{}: {e}", self.frontend_base_url))
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidFrontendUrl(self.frontend_base_url.clone()));
        }
        Ok(())
    }
}

fn default_frontend_base_url() -> String {
    "http://localhost:3000".to_string()
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Bearer token for the admin API. The admin API is closed when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            admin_token: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

// ============================================================================
// WebhookConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    /// Environment variable holding the shared secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// Header the backend puts the secret in.
    #[serde(default = "default_secret_header")]
    pub header: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            header: default_secret_header(),
        }
    }
}

impl WebhookConfig {
    /// The shared secret, if one is set in the environment.
    pub fn secret(&self) -> Option<String> {
        std::env::var(&self.secret_env)
            .ok()
            .filter(|s| !s.is_empty())
    }
}

fn default_secret_env() -> String {
    "WEBHOOK_SECRET".to_string()
}

fn default_secret_header() -> String {
    "x-webhook-secret".to_string()
}

// ============================================================================
// RoutingConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_path")]
    pub path: PathBuf,
    /// Routes seeded at startup when not already configured.
    #[serde(default)]
    pub bootstrap: Vec<BootstrapRoute>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            path: default_routing_path(),
            bootstrap: Vec::new(),
        }
    }
}

fn default_routing_path() -> PathBuf {
    PathBuf::from(".marketbridge/routing.json")
}

// ============================================================================
// DiscordSettings
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DiscordSettings {
    /// Environment variable holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Role ids allowed to change routing.
    #[serde(default)]
    pub admin_role_ids: Vec<u64>,
    /// Role names allowed to change routing, matched exactly (ignoring case).
    #[serde(default)]
    pub admin_role_names: Vec<String>,
    /// Members with the Administrator permission may change routing.
    #[serde(default = "default_true")]
    pub allow_administrator_permission: bool,
    /// Register the `/route` slash command on startup.
    #[serde(default = "default_true")]
    pub register_commands: bool,
    #[serde(default)]
    pub thread_visibility: ThreadVisibility,
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            admin_role_ids: Vec::new(),
            admin_role_names: Vec::new(),
            allow_administrator_permission: true,
            register_commands: true,
            thread_visibility: ThreadVisibility::default(),
        }
    }
}

fn default_token_env() -> String {
    "DISCORD_TOKEN".to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("frontend_base_url is not a usable base url: {0}")]
    InvalidFrontendUrl(String),
}

// ============================================================================
// Tests
// ============================================================================
