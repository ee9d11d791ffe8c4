//! Runner configuration.
//!
//! Settings come from an optional TOML file searched in the current
//! directory and the user config directory, with the customer
//! identifier taken from the `ETRADE_CUSTOMER` environment variable.
//! A missing customer identifier is a hard error: nothing is launched
//! and nothing is contacted without one.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable holding the required customer identifier.
pub const CUSTOMER_ENV_VAR: &str = "ETRADE_CUSTOMER";

/// Runner configuration loaded from TOML file (or defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Server subprocess settings.
    pub server: ServerConfig,
    /// HTTP client settings.
    pub http: HttpConfig,
}

/// Server subprocess configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server binary name or path.
    pub binary: String,
    /// Listen address passed to `--addr`.
    pub addr: String,
    /// Seconds to wait after SIGINT before escalating to SIGKILL.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: "etrade".to_string(),
            addr: ":8888".to_string(),
            shutdown_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Graceful-shutdown timeout as a `Duration`.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL of the server API.
    pub base_url: String,
    /// Maximum readiness-poll attempts before giving up.
    pub ready_attempts: u32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8888".to_string(),
            ready_attempts: 5,
            request_timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    /// Parse the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the URL does not parse.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    /// Per-request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Read the required customer identifier from the environment.
///
/// # Errors
///
/// Returns `ConfigError::MissingCustomerId` when the variable is unset
/// or empty.
pub fn customer_id_from_env() -> Result<String, ConfigError> {
    match std::env::var(CUSTOMER_ENV_VAR) {
        Ok(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(ConfigError::MissingCustomerId),
    }
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .etrade-runner.toml
        search_paths.push(PathBuf::from(".etrade-runner.toml"));

        // 2. User config directory: ~/.config/etrade-runner/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("etrade-runner").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<RunnerConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(RunnerConfig::default())
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &PathBuf) -> Result<RunnerConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no customer ID configured; set the {CUSTOMER_ENV_VAR} environment variable")]
    MissingCustomerId,

    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
}
