//! Configuration management for the docrest server.
//!
//! Configuration merges three sources, later ones overriding earlier ones:
//!
//! 1. hardcoded defaults,
//! 2. a configuration file (YAML, TOML or JSON, by extension),
//! 3. `DOCREST_`-prefixed environment variables with `__` as the nested key
//!    separator (e.g. `DOCREST_STORAGE__DATABASE_URL`).
//!
//! The rule set ships as part of the configuration file:
//!
//! ```yaml
//! server:
//!   port: 9889
//! storage:
//!   backend: postgres
//!   database_url: postgres://localhost/docrest
//! auth:
//!   openid_connect_issuer: https://accounts.example.com
//! rules:
//!   - path: "notes/{userId}"
//!     read:
//!       ifPath: "path.userId == user.id"
//! ```

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use docrest_domain::rules::Rule;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Network settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageSettings,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// The access rule set, consulted in declaration order.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9889
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Storage backend type: "memory" or "postgres".
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database connection URL (required for the "postgres" backend).
    pub database_url: Option<String>,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection acquire timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_url: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    /// OpenID Connect issuer URL. Empty or absent disables authentication:
    /// every caller is anonymous.
    #[serde(default)]
    pub openid_connect_issuer: Option<String>,
}

impl AuthSettings {
    /// The issuer, when authentication is enabled.
    pub fn issuer(&self) -> Option<&str> {
        self.openid_connect_issuer
            .as_deref()
            .filter(|issuer| !issuer.is_empty())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development).
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServerConfig {
    /// Loads configuration from a file with environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("DOCREST").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Loads configuration from the environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("DOCREST").separator("__"))
            .build()?
            .try_deserialize()
    }
}
