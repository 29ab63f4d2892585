//! Configuration validation

use crate::schema::{RawConfig, RawSchedule};
use downtime_util::WallClock;
use thiserror::Error;

/// Largest response buffer a dispatcher may allocate per client
pub const MAX_RESPONSE_BYTES_LIMIT: usize = 65536;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid time format for {field} '{value}': {message}")]
    InvalidTimeFormat {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("max_response_bytes must be between 1 and {MAX_RESPONSE_BYTES_LIMIT}, got {0}")]
    ResponseLimitOutOfRange(usize),

    #[error("Unknown store backend '{0}' (expected \"sqlite\" or \"json\")")]
    UnknownStoreBackend(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(store) = &config.service.store
        && let Err(e) = store.parse::<crate::StoreBackend>()
    {
        errors.push(e);
    }
    if config.service.audit_retention == Some(0) {
        errors.push(ValidationError::MustBePositive {
            field: "service.audit_retention",
        });
    }

    let dispatch = &config.dispatch;
    if dispatch.port == Some(0) {
        errors.push(ValidationError::MustBePositive { field: "dispatch.port" });
    }
    if dispatch.connect_timeout_seconds == Some(0) {
        errors.push(ValidationError::MustBePositive {
            field: "dispatch.connect_timeout_seconds",
        });
    }
    if dispatch.read_timeout_seconds == Some(0) {
        errors.push(ValidationError::MustBePositive {
            field: "dispatch.read_timeout_seconds",
        });
    }
    if let Some(bytes) = dispatch.max_response_bytes
        && !(1..=MAX_RESPONSE_BYTES_LIMIT).contains(&bytes)
    {
        errors.push(ValidationError::ResponseLimitOutOfRange(bytes));
    }

    if config.enforcement.reconnect_window_seconds == Some(0) {
        errors.push(ValidationError::MustBePositive {
            field: "enforcement.reconnect_window_seconds",
        });
    }

    if let Some(schedule) = &config.default_schedule {
        errors.extend(validate_schedule(schedule));
    }

    errors
}

fn validate_schedule(schedule: &RawSchedule) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(e) = parse_time(&schedule.disable_time) {
        errors.push(ValidationError::InvalidTimeFormat {
            field: "default_schedule.disable_time",
            value: schedule.disable_time.clone(),
            message: e,
        });
    }

    if let Err(e) = parse_time(&schedule.enable_time) {
        errors.push(ValidationError::InvalidTimeFormat {
            field: "default_schedule.enable_time",
            value: schedule.enable_time.clone(),
            message: e,
        });
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<WallClock, String> {
    s.parse::<WallClock>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawDispatchConfig, RawEnforcementConfig, RawServiceConfig};

    fn raw() -> RawConfig {
        RawConfig {
            config_version: 1,
            service: RawServiceConfig::default(),
            dispatch: RawDispatchConfig::default(),
            enforcement: RawEnforcementConfig::default(),
            default_schedule: None,
        }
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:30").unwrap(), WallClock::new(14, 30).unwrap());
        assert_eq!(parse_time("23:59").unwrap(), WallClock::new(23, 59).unwrap());

        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("invalid").is_err());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&raw()).is_empty());
    }

    #[test]
    fn zero_values_rejected() {
        let mut config = raw();
        config.dispatch.port = Some(0);
        config.dispatch.read_timeout_seconds = Some(0);
        config.enforcement.reconnect_window_seconds = Some(0);
        config.service.audit_retention = Some(0);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 4);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::MustBePositive { .. })));
    }

    #[test]
    fn response_limit_bounds() {
        let mut config = raw();
        config.dispatch.max_response_bytes = Some(0);
        assert!(matches!(
            &validate_config(&config)[..],
            [ValidationError::ResponseLimitOutOfRange(0)]
        ));

        config.dispatch.max_response_bytes = Some(1024);
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn bad_schedule_times_reported_per_field() {
        let mut config = raw();
        config.default_schedule = Some(RawSchedule {
            disable_time: "25:00".into(),
            enable_time: "morning".into(),
        });

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::InvalidTimeFormat { .. })));
    }

    #[test]
    fn unknown_store_backend() {
        let mut config = raw();
        config.service.store = Some("redis".into());
        assert!(matches!(
            &validate_config(&config)[..],
            [ValidationError::UnknownStoreBackend(name)] if name == "redis"
        ));
    }
}
