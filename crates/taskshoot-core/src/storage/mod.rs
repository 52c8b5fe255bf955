mod config;
pub mod sync_db;

pub use config::{Config, OAuthSection, SyncSection};
pub use sync_db::{SyncDbError, SyncStateDb};

use std::path::PathBuf;

/// Returns `~/.config/taskshoot[-dev]/` based on TASKSHOOT_ENV.
///
/// Set TASKSHOOT_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TASKSHOOT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("taskshoot-dev")
    } else {
        base_dir.join("taskshoot")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
