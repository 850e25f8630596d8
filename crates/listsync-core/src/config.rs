use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{ConfigurationError, RetryPolicy};

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per batch (including the first).
    pub max_attempts: u32,
    /// Base delay in milliseconds; doubled after each throttled attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Result<RetryPolicy, ConfigurationError> {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

/// Global configuration loaded from `~/.config/listsync/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListsyncConfig {
    /// Batch endpoint of the remote list store.
    pub endpoint: String,
    /// List that new items are created in unless overridden on the command line.
    pub list: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ListsyncConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://example.invalid/_api/batch".to_string(),
            list: "Documents".to_string(),
            connect_timeout_secs: 15,
            request_timeout_secs: 120,
            retry: None,
        }
    }
}

impl ListsyncConfig {
    /// Validated retry policy (defaults when `[retry]` is absent).
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigurationError> {
        self.retry.clone().unwrap_or_default().policy()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("listsync")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ListsyncConfig> {
    load_or_init_at(&config_path()?)
}

/// Like `load_or_init` but at an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<ListsyncConfig> {
    if !path.exists() {
        let default_cfg = ListsyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: ListsyncConfig = toml::from_str(&data)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(cfg)
}
