//! Configuration management for the IgorFS daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/igorfs/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENCY, MAX_CHUNK_SIZE};

/// Default address the HTTP server binds to.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3000";

/// Upper bound for `files.max_concurrency`.
pub const MAX_CONCURRENCY_LIMIT: usize = 1024;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_concurrency must be between 1 and {MAX_CONCURRENCY_LIMIT}, got {0}")]
    InvalidMaxConcurrency(usize),

    #[error("chunk_size must be between 1 and {MAX_CHUNK_SIZE} bytes, got {0}")]
    InvalidChunkSize(usize),

    #[error("request_timeout_secs must be between 0 and 3600 seconds, got {0}")]
    InvalidRequestTimeout(u64),

    #[error("bind_address must be an IP address and port, got {0}")]
    InvalidBindAddress(String),

    #[error("root_dir must not be empty")]
    EmptyRootDir,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the IgorFS daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Shared folder configuration.
    pub files: FileConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,

    /// Time limit for producing a response, in seconds (0 = no limit).
    pub request_timeout_secs: u64,
}

/// Shared folder configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// The only directory exposed by the service.
    pub root_dir: PathBuf,

    /// Maximum number of directories scanned at once.
    pub max_concurrency: usize,

    /// Read chunk size for downloads in bytes (default: 64KB).
    pub chunk_size: usize,

    /// Whether entries whose name starts with '.' are listed and counted.
    pub include_hidden: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("data"),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            include_hidden: true,
        }
    }
}

impl ServerConfig {
    /// The request time limit, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Parse the bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("igorfs")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - IGORFS_ROOT_DIR: Override the shared root directory
    /// - IGORFS_BIND_ADDRESS: Override the listen address
    /// - IGORFS_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("IGORFS_ROOT_DIR") {
            if !root.is_empty() {
                tracing::info!("Overriding root_dir from environment: {}", root);
                self.files.root_dir = PathBuf::from(root);
            }
        }

        if let Ok(addr) = std::env::var("IGORFS_BIND_ADDRESS") {
            if !addr.is_empty() {
                tracing::info!("Overriding bind_address from environment: {}", addr);
                self.server.bind_address = addr;
            }
        }

        if let Ok(level) = std::env::var("IGORFS_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    /// The root directory's existence is checked when the boundary is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files.max_concurrency < 1 || self.files.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(ConfigError::InvalidMaxConcurrency(self.files.max_concurrency));
        }

        if self.files.chunk_size < 1 || self.files.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize(self.files.chunk_size));
        }

        if self.server.request_timeout_secs > 3600 {
            return Err(ConfigError::InvalidRequestTimeout(
                self.server.request_timeout_secs,
            ));
        }

        self.server.socket_addr()?;

        if self.files.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRootDir);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
