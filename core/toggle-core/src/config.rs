//! Controller tuning and catalog file loading.
//!
//! Handles:
//! - Per-controller timing and retry settings (`ToggleConfig`)
//! - The user catalog at `~/.togglehud/config.toml`

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, ToggleError};
use crate::resource::ResourceProfile;
use crate::types::RetryPolicy;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_VERIFICATION_DELAY_MS: u64 = 750;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.0;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1_500;
pub const DEFAULT_AVAILABILITY_TIMEOUT_MS: u64 = 1_000;

const CONFIG_DIR_NAME: &str = ".togglehud";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Static controller configuration. Applied before first use; not reloadable
/// while a controller is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub poll_interval_ms: u64,
    pub verification_delay_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub probe_timeout_ms: u64,
    pub availability_timeout_ms: u64,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            verification_delay_ms: DEFAULT_VERIFICATION_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            availability_timeout_ms: DEFAULT_AVAILABILITY_TIMEOUT_MS,
        }
    }
}

impl ToggleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ToggleError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ToggleError::InvalidConfig(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 0.0 {
            return Err(ToggleError::InvalidConfig(format!(
                "backoff_multiplier must be a non-negative number, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn verification_delay(&self) -> Duration {
        Duration::from_millis(self.verification_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn availability_timeout(&self) -> Duration {
        Duration::from_millis(self.availability_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Contents of the user catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub resources: Vec<ResourceProfile>,
}

/// Returns the toggle-hud data directory (~/.togglehud).
pub fn get_togglehud_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME))
}

/// Returns the path to the catalog file.
pub fn get_config_path() -> Option<PathBuf> {
    get_togglehud_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Loads the catalog file. A missing file is an empty catalog, not an error.
pub fn load_catalog_config(path: Option<&Path>) -> Result<CatalogConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => get_config_path().ok_or(ToggleError::HomeDirNotFound)?,
    };

    if !config_path.exists() {
        return Ok(CatalogConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|source| ToggleError::Io {
        context: format!("reading {}", config_path.display()),
        source,
    })?;
    let catalog: CatalogConfig =
        toml::from_str(&content).map_err(|err| ToggleError::ConfigMalformed {
            path: config_path.clone(),
            details: err.to_string(),
        })?;

    for profile in &catalog.resources {
        profile
            .tuning
            .validate()
            .map_err(|err| ToggleError::ConfigMalformed {
                path: config_path.clone(),
                details: format!("resource {}: {}", profile.id, err),
            })?;
    }
    Ok(catalog)
}
