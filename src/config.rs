//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! service base URL, the near-expiry renewal threshold and the request
//! timeout.
//!
//! Configuration is stored at `~/.config/vaultgate/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/token storage paths
pub const APP_NAME: &str = "vaultgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default service base URL
const DEFAULT_BASE_URL: &str = "https://api.vaultgate.app";

/// Renew the access token once its remaining lifetime drops to this.
/// The service issues 180-second access tokens; 30 seconds of headroom
/// renews well before expiry without renewing on most calls.
const DEFAULT_NEAR_EXPIRY_THRESHOLD_SECS: i64 = 30;

/// HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub near_expiry_threshold_secs: i64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            near_expiry_threshold_secs: DEFAULT_NEAR_EXPIRY_THRESHOLD_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
