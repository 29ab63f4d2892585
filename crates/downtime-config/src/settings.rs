//! Validated settings structures

use crate::schema::{RawConfig, RawDispatchConfig, RawEnforcementConfig, RawSchedule, RawServiceConfig};
use crate::validation::{parse_time, ValidationError};
use downtime_util::{data_dir_without_env, ScheduleWindow};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default TCP port every client listens on
pub const DEFAULT_CLIENT_PORT: u16 = 65432;

/// Default bound on connecting to a client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on reading a client's acknowledgment
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default size of the single response read
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024;

/// Default number of audit events a store keeps
pub const DEFAULT_AUDIT_RETENTION: usize = 5000;

/// Default window for "just reconnected" clients
pub const DEFAULT_RECONNECT_WINDOW: Duration = Duration::from_secs(120);

/// Validated settings ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub dispatch: DispatchSettings,
    pub enforcement: EnforcementConfig,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            dispatch: DispatchSettings::from_raw(raw.dispatch),
            enforcement: EnforcementConfig::from_raw(raw.enforcement, raw.default_schedule),
        }
    }
}

/// Which persistence backend holds schedule, state and registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    /// Plain JSON documents shared with the web front-end
    Json,
}

impl FromStr for StoreBackend {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "json" => Ok(StoreBackend::Json),
            other => Err(ValidationError::UnknownStoreBackend(other.to_string())),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Sqlite => f.write_str("sqlite"),
            StoreBackend::Json => f.write_str("json"),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub store: StoreBackend,
    pub audit_retention: usize,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(data_dir_without_env),
            store: raw
                .store
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            audit_retention: raw.audit_retention.unwrap_or(DEFAULT_AUDIT_RETENTION),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: data_dir_without_env(),
            store: StoreBackend::default(),
            audit_retention: DEFAULT_AUDIT_RETENTION,
        }
    }
}

/// Client connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_response_bytes: usize,
}

impl DispatchSettings {
    fn from_raw(raw: RawDispatchConfig) -> Self {
        Self {
            port: raw.port.unwrap_or(DEFAULT_CLIENT_PORT),
            connect_timeout: raw
                .connect_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: raw
                .read_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_READ_TIMEOUT),
            max_response_bytes: raw.max_response_bytes.unwrap_or(DEFAULT_MAX_RESPONSE_BYTES),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_CLIENT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// Policy values consumed by the enforcement engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementConfig {
    /// Clients whose heartbeat is younger than this are reconciled every cycle
    pub reconnect_window: Duration,

    /// When true, a manual unpause clears the override instead of setting it
    pub manual_unpause_clears_override: bool,

    /// Used when no schedule has been stored, or the stored one is unreadable
    pub default_schedule: ScheduleWindow,
}

impl EnforcementConfig {
    fn from_raw(raw: RawEnforcementConfig, schedule: Option<RawSchedule>) -> Self {
        Self {
            reconnect_window: raw
                .reconnect_window_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RECONNECT_WINDOW),
            manual_unpause_clears_override: raw.manual_unpause_clears_override,
            default_schedule: schedule.map(convert_schedule).unwrap_or_default(),
        }
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            reconnect_window: DEFAULT_RECONNECT_WINDOW,
            manual_unpause_clears_override: false,
            default_schedule: ScheduleWindow::default(),
        }
    }
}

fn convert_schedule(raw: RawSchedule) -> ScheduleWindow {
    let fallback = ScheduleWindow::default();
    ScheduleWindow {
        disable_time: parse_time(&raw.disable_time).unwrap_or(fallback.disable_time),
        enable_time: parse_time(&raw.enable_time).unwrap_or(fallback.enable_time),
    }
}
