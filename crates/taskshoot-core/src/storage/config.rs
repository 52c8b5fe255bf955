//! TOML-based sync configuration.
//!
//! Stores the defaults the CLI feeds into sync requests:
//! - Calendars to synchronize and the default direction
//! - Optional fetch window for full syncs
//! - OAuth redirect port
//!
//! Configuration is stored at `~/.config/taskshoot/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::sync::types::SyncDirection;

/// Sync defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_direction")]
    pub direction: SyncDirection,
    #[serde(default = "default_calendar_ids")]
    pub calendar_ids: Vec<String>,
    /// Full syncs fetch only this many days back when set.
    #[serde(default)]
    pub window_days: Option<i64>,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            direction: default_direction(),
            calendar_ids: default_calendar_ids(),
            window_days: None,
        }
    }
}

/// OAuth client settings. Secrets live in the OS keyring, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSection {
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
}

impl Default for OAuthSection {
    fn default() -> Self {
        Self {
            redirect_port: default_redirect_port(),
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/taskshoot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub oauth: OAuthSection,
}

fn default_direction() -> SyncDirection {
    SyncDirection::Both
}

fn default_calendar_ids() -> Vec<String> {
    vec!["primary".to_string()]
}

fn default_redirect_port() -> u16 {
    19821
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/taskshoot"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Persist the configuration.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}
