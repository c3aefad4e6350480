#![deny(unsafe_code)]

//! Configuration loading and validation for kestrel.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure shared by the daemon, which re-reads it on
//! every reload request, and the CLI, which uses it to locate the control
//! socket and pick its ping deadline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Socket file name used when no explicit path is configured.
pub const SOCKET_FILE_NAME: &str = "kestrel.sock";

/// Log levels accepted by `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settings used by control clients.
    #[serde(default)]
    pub client: ClientConfig,
}

/// Configuration for the control daemon.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path of the Unix socket the control service binds.
    ///
    /// Defaults to `$XDG_RUNTIME_DIR/kestrel.sock`, or `/tmp/kestrel.sock`
    /// when no runtime directory is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,
}

impl DaemonConfig {
    /// Resolve the socket path from config, falling back to the default.
    pub fn resolved_socket_path(&self) -> PathBuf {
        match self.socket_path.as_deref() {
            Some(path) => PathBuf::from(path),
            None => default_socket_path(),
        }
    }
}

/// The socket path used when `daemon.socket_path` is unset.
pub fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(SOCKET_FILE_NAME)
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Client-side settings.
///
/// Liveness deadlines belong to the client: the daemon answers pings as fast
/// as it can and never times anything out itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// How long `kestrel ping` waits for the echo before declaring the
    /// compositor unresponsive.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ping_timeout_secs: default_ping_timeout_secs(),
        }
    }
}

impl ClientConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

fn default_ping_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.daemon.socket_path {
            if path.is_empty() {
                return Err(ConfigError::Validation(
                    "daemon.socket_path must not be empty when set".to_string(),
                ));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                LOG_LEVELS, self.logging.level
            )));
        }

        if self.client.ping_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "client.ping_timeout_secs must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
