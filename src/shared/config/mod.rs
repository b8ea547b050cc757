//! Application configuration module
//!
//! Provides configuration types for the tracking client: backend location,
//! request and probe timeouts, background sync cadence and the data
//! directory used by the local database.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default request timeout, in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default connectivity probe timeout, in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Default background sync interval, in seconds
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server URL
    pub server_url: Option<String>,
    /// Fixed client-side timeout applied to every API request
    pub request_timeout_ms: Option<u64>,
    /// Timeout for the reachability probe
    pub probe_timeout_ms: Option<u64>,
    /// Seconds between background sync passes
    pub sync_interval_secs: Option<u64>,
    /// Directory holding the local database
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.server_url {
            if url.trim().is_empty() {
                return Err(ConfigError::MissingValue("server_url"));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue("request_timeout_ms must be positive"));
        }
        if self.probe_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue("probe_timeout_ms must be positive"));
        }
        if self.sync_interval_secs == Some(0) {
            return Err(ConfigError::InvalidValue("sync_interval_secs must be positive"));
        }
        Ok(())
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
    }

    pub fn probe_timeout_ms(&self) -> u64 {
        self.probe_timeout_ms.unwrap_or(DEFAULT_PROBE_TIMEOUT_MS)
    }

    pub fn sync_interval_secs(&self) -> u64 {
        self.sync_interval_secs.unwrap_or(DEFAULT_SYNC_INTERVAL_SECS)
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    request_timeout_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
    sync_interval_secs: Option<u64>,
    data_dir: Option<PathBuf>,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn request_timeout_ms(mut self, millis: u64) -> Self {
        self.request_timeout_ms = Some(millis);
        self
    }

    /// Set the connectivity probe timeout
    pub fn probe_timeout_ms(mut self, millis: u64) -> Self {
        self.probe_timeout_ms = Some(millis);
        self
    }

    /// Set the background sync interval
    pub fn sync_interval_secs(mut self, secs: u64) -> Self {
        self.sync_interval_secs = Some(secs);
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let config = AppConfig {
            server_url: self.server_url.map(|url| url.trim_end_matches('/').to_string()),
            request_timeout_ms: self.request_timeout_ms,
            probe_timeout_ms: self.probe_timeout_ms,
            sync_interval_secs: self.sync_interval_secs,
            data_dir: self.data_dir,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("could not read configuration: {0}")]
    Io(String),
    #[error("could not parse configuration: {0}")]
    Parse(String),
}
