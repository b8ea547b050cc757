use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use std::path::PathBuf;
use std::time::Duration;

/// Default server URL
const DEFAULT_SERVER_URL: &str = "https://track-app-backend-flame.vercel.app/api";

/// Environment variable overriding the server URL
const SERVER_URL_ENV: &str = "MINETRACK_API_URL";

/// Resolved client settings. The bearer token lives on the API client,
/// not here.
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
}

impl Default for Config {
    fn default() -> Self {
        let server_url = std::env::var(SERVER_URL_ENV)
            .ok()
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let app = AppConfig {
            server_url: Some(server_url),
            ..AppConfig::default()
        };
        Self { app }
    }
}

impl Config {
    /// Defaults, with the server URL taken from the environment when set
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        let app = builder.build()?;
        Ok(Self { app })
    }

    pub fn from_app_config(app: AppConfig) -> Result<Self, ConfigError> {
        app.validate()?;
        Ok(Self { app })
    }

    /// Join an endpoint path onto the server URL
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url().trim_end_matches('/'), path)
    }

    pub fn server_url(&self) -> &str {
        self.app.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.app.request_timeout_ms())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.app.probe_timeout_ms())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.app.sync_interval_secs())
    }

    /// Location of the local database file
    pub fn database_path(&self) -> PathBuf {
        let mut path = self
            .app
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("minetrack")))
            .unwrap_or_else(|| std::env::temp_dir().join("minetrack"));
        path.push("local.db");
        path
    }
}
