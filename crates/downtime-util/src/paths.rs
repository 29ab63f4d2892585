//! Default paths for downtimed components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/downtime/config.toml` or `~/.config/downtime/config.toml`
//! - Data: `$XDG_DATA_HOME/downtime` or `~/.local/share/downtime`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const DOWNTIME_CONFIG_ENV: &str = "DOWNTIME_CONFIG";

/// Environment variable for overriding the data directory (read by the CLI)
pub const DOWNTIME_DATA_DIR_ENV: &str = "DOWNTIME_DATA_DIR";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "downtime";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$DOWNTIME_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/downtime/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/downtime/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(DOWNTIME_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the data directory without checking the `DOWNTIME_DATA_DIR` env var.
///
/// Order of precedence:
/// 1. `$XDG_DATA_HOME/downtime` (if XDG_DATA_HOME is set)
/// 2. `~/.local/share/downtime` (fallback)
///
/// The env var is read by the command line, where it overrides the config.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}
