//! Pipeline configuration
//!
//! Defaults are layered under an optional TOML file and `TWEETPULSE_`
//! environment variables. Nested keys use a double underscore, e.g.
//! `TWEETPULSE_TWITTER__BEARER_TOKEN`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_FRESHNESS_HOURS;
use crate::limiter::DEFAULT_LIMIT;

/// Most posts the timeline endpoint returns per request
pub const MAX_BATCH_SIZE: usize = 200;

/// Longest accepted freshness window, one year
pub const MAX_FRESHNESS_HOURS: u64 = 24 * 365;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Upstream API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    /// API root, without trailing slash
    pub base_url: String,
    /// App-only bearer token
    pub bearer_token: Option<String>,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitter.com/1.1".to_string(),
            bearer_token: None,
        }
    }
}

/// Settings for the acquisition pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root for the handle ledger and the `tweets/` cache directory
    pub data_dir: PathBuf,
    /// Validations admitted per process lifetime
    pub validation_limit: u64,
    /// Dataset lookups admitted per process lifetime
    pub lookup_limit: u64,
    /// Age in hours after which a cached dataset is refetched
    pub freshness_hours: u64,
    /// Posts requested per fetch
    pub batch_size: usize,
    /// Deadline for each upstream call, in seconds
    pub upstream_timeout_secs: u64,
    pub twitter: TwitterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            validation_limit: DEFAULT_LIMIT,
            lookup_limit: DEFAULT_LIMIT,
            freshness_hours: DEFAULT_FRESHNESS_HOURS,
            batch_size: 50,
            upstream_timeout_secs: 10,
            twitter: TwitterConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Directory holding one dataset file per handle
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("tweets")
    }

    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.freshness_hours == 0 || self.freshness_hours > MAX_FRESHNESS_HOURS {
            return Err(ConfigError::Invalid(format!(
                "freshness_hours must be between 1 and {}, got {}",
                MAX_FRESHNESS_HOURS, self.freshness_hours
            )));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::Invalid("upstream_timeout_secs must be positive".into()));
        }
        if self.validation_limit == 0 || self.lookup_limit == 0 {
            return Err(ConfigError::Invalid("admission limits must be positive".into()));
        }
        Ok(())
    }
}

/// XDG data directory (`~/.local/share/tweetpulse` on Linux), or `./data`
fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "tweetpulse")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Loads configuration from defaults, an optional file and the environment
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: PipelineConfig = figment
        .merge(Env::prefixed("TWEETPULSE_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig =
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
