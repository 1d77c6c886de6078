use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult};

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

/// Where fetched icons are persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
}

/// Worker pool and HTTP client tuning for background fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Number of concurrent fetch workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Cap on concurrent outbound HTTP requests, independent of `workers`
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Total time allowed for a single request, body included
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Client identity sent with every request; defaults to `<pkg>/<version>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIRECTORY)
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_connections: default_max_connections(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: None,
        }
    }
}

impl FetcherConfig {
    /// User agent actually sent on the wire
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.workers == 0 {
            return Err(AppError::configuration("fetcher.workers must be at least 1"));
        }
        if self.max_connections == 0 {
            return Err(AppError::configuration(
                "fetcher.max_connections must be at least 1",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(AppError::configuration(
                "fetcher.request_timeout must be greater than zero",
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(AppError::configuration(
                "fetcher.connect_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> AppResult<()> {
        self.fetcher.validate()
    }

    /// Load configuration, writing the defaults out when the file does not exist yet
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> AppResult<Self> {
        let config_file = config_file.as_ref();
        let config = if config_file.exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str::<Self>(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file.display());
            default_config
        };
        config.validate()?;
        Ok(config)
    }
}
