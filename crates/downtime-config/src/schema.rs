//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Storage settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Client connection settings
    #[serde(default)]
    pub dispatch: RawDispatchConfig,

    /// Engine policy values
    #[serde(default)]
    pub enforcement: RawEnforcementConfig,

    /// Schedule used until an operator saves one
    #[serde(default)]
    pub default_schedule: Option<RawSchedule>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Store backend: "sqlite" or "json"
    pub store: Option<String>,

    /// Number of audit events to keep
    pub audit_retention: Option<usize>,
}

/// Dispatch settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDispatchConfig {
    /// TCP port every client listens on
    pub port: Option<u16>,

    pub connect_timeout_seconds: Option<u64>,

    pub read_timeout_seconds: Option<u64>,

    /// Upper bound on the single response read
    pub max_response_bytes: Option<usize>,
}

/// Enforcement settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEnforcementConfig {
    /// Clients seen within this many seconds get a reconciliation dispatch
    pub reconnect_window_seconds: Option<u64>,

    /// Treat a manual unpause as "back to schedule"
    #[serde(default)]
    pub manual_unpause_clears_override: bool,
}

/// Downtime window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSchedule {
    /// Start of downtime (HH:MM format)
    pub disable_time: String,

    /// End of downtime (HH:MM format)
    pub enable_time: String,
}
