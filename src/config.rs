//! Configuration loader and validator for the quote sync client.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `api.token`.
pub const TOKEN_ENV: &str = "DEVIS_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub api: Api,
    pub sync: SyncSettings,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Timing and channel settings of the sync core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    pub channel: String,
    pub dedup_window_ms: u64,
    pub refresh_interval_ms: u64,
    pub focus_throttle_ms: u64,
    pub detail_poll_interval_ms: u64,
    pub alert_duration_ms: u64,
    pub activity_page_size: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            channel: crate::bus::CHANNEL_NAME.to_string(),
            dedup_window_ms: 5_000,
            refresh_interval_ms: 10_000,
            focus_throttle_ms: 5_000,
            detail_poll_interval_ms: 3_000,
            alert_duration_ms: 8_000,
            activity_page_size: 50,
        }
    }
}

impl SyncSettings {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn focus_throttle(&self) -> Duration {
        Duration::from_millis(self.focus_throttle_ms)
    }

    pub fn detail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.detail_poll_interval_ms)
    }

    pub fn alert_duration(&self) -> Duration {
        Duration::from_millis(self.alert_duration_ms)
    }
}

impl Config {
    /// Bearer token, preferring the environment over the file.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.api.token.clone().filter(|t| !t.trim().is_empty()))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.api.base_url).is_err() {
        return Err(ConfigError::Invalid("api.base_url must be an absolute URL"));
    }

    let s = &cfg.sync;
    if s.channel.trim().is_empty() {
        return Err(ConfigError::Invalid("sync.channel must be non-empty"));
    }
    if s.dedup_window_ms == 0 {
        return Err(ConfigError::Invalid("sync.dedup_window_ms must be > 0"));
    }
    if s.refresh_interval_ms == 0 {
        return Err(ConfigError::Invalid("sync.refresh_interval_ms must be > 0"));
    }
    if s.focus_throttle_ms == 0 {
        return Err(ConfigError::Invalid("sync.focus_throttle_ms must be > 0"));
    }
    if s.detail_poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("sync.detail_poll_interval_ms must be > 0"));
    }
    if s.alert_duration_ms == 0 {
        return Err(ConfigError::Invalid("sync.alert_duration_ms must be > 0"));
    }
    if s.activity_page_size == 0 {
        return Err(ConfigError::Invalid("sync.activity_page_size must be > 0"));
    }

    Ok(())
}

/// Returns the reference YAML configuration.
pub fn example() -> &'static str {
    r#"api:
  base_url: "http://localhost:8000"
  token: "YOUR_SESSION_TOKEN"

sync:
  channel: "devis-sync"
  dedup_window_ms: 5000
  refresh_interval_ms: 10000
  focus_throttle_ms: 5000
  detail_poll_interval_ms: 3000
  alert_duration_ms: 8000
  activity_page_size: 50
"#
}
