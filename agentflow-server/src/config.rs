//! Configuration management for the server

use crate::{Error, Result};
use agentflow_core::{BusConfig, EngineConfig};
use agentflow_storage::DatabaseConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Prefix of environment variable overrides, e.g. `AGENTFLOW_SERVER__PORT`
pub const ENV_PREFIX: &str = "AGENTFLOW";

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from config files and the environment
    ///
    /// Sources, lowest precedence first: `config/default`, `config/local`,
    /// the optional explicit file, then `AGENTFLOW_*` variables with `__`
    /// separating nested keys.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite:agentflow.db")?
            .set_default("database.max_connections", 10)?
            .set_default("database.migrate_on_startup", true)?
            .set_default("engine.retry_failed_steps", false)?
            .set_default("engine.backoff_factor", 2.0)?
            .set_default("bus.poll_interval_ms", 10)?
            .set_default("bus.max_history", 10_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine or listener cannot run with
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.bus.validate()?;
        if self.server.host.trim().is_empty() {
            return Err(Error::Configuration("server.host must not be empty".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(Error::Configuration("database.url must not be empty".into()));
        }
        if self.logging.level.trim().is_empty() {
            return Err(Error::Configuration("logging.level must not be empty".into()));
        }
        Ok(())
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                Error::Configuration(format!(
                    "invalid server address {}:{}: {}",
                    self.server.host, self.server.port, e
                ))
            })
    }
}
