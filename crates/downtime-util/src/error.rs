//! Error types for downtimed utilities

use thiserror::Error;

/// Failure to parse an `HH:MM` time of day
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("Expected HH:MM format, got '{0}'")]
    Format(String),

    #[error("Invalid hour in '{0}'")]
    InvalidHour(String),

    #[error("Invalid minute in '{0}'")]
    InvalidMinute(String),

    #[error("Hour must be 0-23, got {0}")]
    HourOutOfRange(u8),

    #[error("Minute must be 0-59, got {0}")]
    MinuteOutOfRange(u8),
}
