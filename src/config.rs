use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use proposal_flow_core::poll::PollPolicy;

/// Environment variable overriding `service.base_url`.
pub const BASE_URL_ENV: &str = "PFLOW_API_BASE_URL";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    /// Generation calls can take minutes on the remote side.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_path: default_api_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_api_path() -> String {
    "/api/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_transport_failures")]
    pub max_transport_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_transport_failures: default_max_transport_failures(),
        }
    }
}

fn default_interval_ms() -> u64 {
    5000
}
fn default_max_backoff_ms() -> u64 {
    60_000
}
fn default_max_transport_failures() -> u32 {
    5
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_transport_failures: self.max_transport_failures,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/pflow.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    /// Pause between consecutive generation calls of a batch.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
        }
    }
}

fn default_pacing_ms() -> u64 {
    500
}

impl BatchConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl Config {
    /// All defaults. Used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            service: ServiceConfig::default(),
            poll: PollConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(apply_env(config))
}

/// Loads `path` if it exists, otherwise falls back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        validate(apply_env(Config::minimal()))
    }
}

fn apply_env(mut config: Config) -> Config {
    if let Ok(url) = std::env::var(BASE_URL_ENV) {
        if !url.trim().is_empty() {
            config.service.base_url = url;
        }
    }
    config
}

fn validate(config: Config) -> Result<Config> {
    // Validate service
    if !config.service.base_url.starts_with("http://")
        && !config.service.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "service.base_url must start with http:// or https:// (got '{}')",
            config.service.base_url
        );
    }
    if !config.service.api_path.is_empty() && !config.service.api_path.starts_with('/') {
        anyhow::bail!("service.api_path must be empty or start with '/'");
    }
    if config.service.timeout_secs == 0 {
        anyhow::bail!("service.timeout_secs must be > 0");
    }

    // Validate poll
    if config.poll.interval_ms == 0 {
        anyhow::bail!("poll.interval_ms must be > 0");
    }
    if config.poll.max_backoff_ms < config.poll.interval_ms {
        anyhow::bail!("poll.max_backoff_ms must be >= poll.interval_ms");
    }

    Ok(config)
}
