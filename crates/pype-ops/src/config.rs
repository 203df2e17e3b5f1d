//! Client configuration.
//!
//! Configuration is read from `<config dir>/pype-ops/config.toml`, which can
//! be overridden with the `PYPE_OPS_CONFIG_PATH` environment variable.
//! Individual values can be overridden with `PYPE_*` variables.
//!
//! ```toml
//! [server]
//! url = "http://localhost:5000"
//! api_key = "..."
//! timeout_secs = 30
//!
//! [general]
//! log_level = "info"
//! ```

use crate::error::{OpsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "PYPE_OPS_CONFIG_PATH";
pub const ENV_SERVER_URL: &str = "PYPE_SERVER_URL";
pub const ENV_API_KEY: &str = "PYPE_API_KEY";
pub const ENV_LOG_LEVEL: &str = "PYPE_LOG_LEVEL";
pub const ENV_TIMEOUT_SECS: &str = "PYPE_TIMEOUT_SECS";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Server connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSection {
    pub log_level: String,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerSection,
    pub general: GeneralSection,
}

impl ClientConfig {
    /// Load configuration from the default location.
    ///
    /// A missing file is not an error; defaults with environment overrides
    /// are used instead.
    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Self::load_from_path(&path).await;
        }

        debug!("No configuration at {}, using defaults", path.display());
        let mut config = Self::default();
        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| OpsError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| OpsError::config(format!("Failed to parse config file: {}", e)))?;

        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Apply `PYPE_*` environment variable overrides
    pub fn merge_env_vars(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_SERVER_URL) {
            debug!("Overriding server url from environment: {}", url);
            self.server.url = url;
        }

        if let Ok(api_key) = std::env::var(ENV_API_KEY) {
            debug!("Overriding api key from environment");
            self.server.api_key = Some(api_key);
        }

        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", log_level);
            self.general.log_level = log_level;
        }

        if let Ok(timeout) = std::env::var(ENV_TIMEOUT_SECS) {
            self.server.timeout_secs = timeout.parse().map_err(|_| {
                OpsError::config(format!("Invalid {} value '{}'", ENV_TIMEOUT_SECS, timeout))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(OpsError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let url = self.server.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(OpsError::config(format!(
                "Server url '{}' must start with http:// or https://",
                self.server.url
            )));
        }

        if self.server.timeout_secs == 0 {
            return Err(OpsError::config("Timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Path of the configuration file
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(config_path) = std::env::var(ENV_CONFIG_PATH) {
            return Ok(PathBuf::from(config_path));
        }

        dirs::config_dir()
            .map(|dir| dir.join("pype-ops").join("config.toml"))
            .ok_or_else(|| OpsError::config("Could not determine the config directory"))
    }
}
