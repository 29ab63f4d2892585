//! Time utilities for downtimed
//!
//! Provides wall-clock time of day for the downtime window and a `now()`
//! that can be overridden in development builds.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `DOWNTIME_MOCK_TIME` environment variable can be set
//! to override the system time. This is useful for exercising the downtime
//! window without waiting for the evening.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 23:30:00`)
//!
//! Example:
//! ```bash
//! DOWNTIME_MOCK_TIME="2025-12-25 23:30:00" downtimed enforce
//! ```

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::TimeParseError;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "DOWNTIME_MOCK_TIME";

/// Expected format of the mock time variable
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT)
            else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    expected_format = MOCK_TIME_FORMAT,
                    "Invalid mock time format"
                );
                return None;
            };
            let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    "Failed to convert mock time to local timezone"
                );
                return None;
            };
            let offset = mock_dt.signed_duration_since(chrono::Local::now());
            tracing::info!(
                mock_time = %mock_time_str,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Time of day with minute resolution, written as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallClock {
    hour: u8,
    minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub const fn midnight() -> Self {
        Self { hour: 0, minute: 0 }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Seconds are dropped; only hour and minute take part in comparisons.
    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn from_datetime(dt: &DateTime<Local>) -> Self {
        Self::from_naive_time(dt.time())
    }

    pub fn minutes_from_midnight(&self) -> u16 {
        (self.hour as u16) * 60 + self.minute as u16
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight()
            .cmp(&other.minutes_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for WallClock {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| TimeParseError::Format(s.to_string()))?;

        let hour: u8 = hour
            .parse()
            .map_err(|_| TimeParseError::InvalidHour(s.to_string()))?;
        let minute: u8 = minute
            .parse()
            .map_err(|_| TimeParseError::InvalidMinute(s.to_string()))?;

        if hour >= 24 {
            return Err(TimeParseError::HourOutOfRange(hour));
        }
        if minute >= 60 {
            return Err(TimeParseError::MinuteOutOfRange(minute));
        }

        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for WallClock {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WallClock> for String {
    fn from(value: WallClock) -> Self {
        value.to_string()
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_ordering() {
        let morning = WallClock::new(6, 0).unwrap();
        let noon = WallClock::new(12, 0).unwrap();
        let evening = WallClock::new(22, 30).unwrap();

        assert!(morning < noon);
        assert!(noon < evening);
        assert!(WallClock::midnight() < morning);
    }

    #[test]
    fn test_wall_clock_rejects_out_of_range() {
        assert!(WallClock::new(24, 0).is_none());
        assert!(WallClock::new(12, 60).is_none());
    }

    #[test]
    fn test_parse_wall_clock() {
        assert_eq!("14:30".parse::<WallClock>().unwrap(), WallClock::new(14, 30).unwrap());
        assert_eq!("00:00".parse::<WallClock>().unwrap(), WallClock::midnight());
        assert_eq!("7:05".parse::<WallClock>().unwrap(), WallClock::new(7, 5).unwrap());

        assert_eq!(
            "24:00".parse::<WallClock>(),
            Err(TimeParseError::HourOutOfRange(24))
        );
        assert_eq!(
            "12:60".parse::<WallClock>(),
            Err(TimeParseError::MinuteOutOfRange(60))
        );
        assert!(matches!("noon".parse::<WallClock>(), Err(TimeParseError::Format(_))));
        assert!(matches!("ab:00".parse::<WallClock>(), Err(TimeParseError::InvalidHour(_))));
    }

    #[test]
    fn test_wall_clock_display_is_zero_padded() {
        assert_eq!(WallClock::new(6, 5).unwrap().to_string(), "06:05");
    }

    #[test]
    fn test_wall_clock_serde_uses_hh_mm() {
        let t = WallClock::new(22, 0).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"22:00\"");

        let parsed: WallClock = serde_json::from_str("\"06:00\"").unwrap();
        assert_eq!(parsed, WallClock::new(6, 0).unwrap());

        assert!(serde_json::from_str::<WallClock>("\"25:00\"").is_err());
    }

    #[test]
    fn test_from_datetime_drops_seconds() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 21, 59, 59).unwrap();
        assert_eq!(WallClock::from_datetime(&dt), WallClock::new(21, 59).unwrap());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_datetime_full() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        assert_eq!(format_datetime_full(&dt), "2025-12-25 14:30:45");
    }

    #[test]
    fn test_mock_time_format_parses() {
        assert!(NaiveDateTime::parse_from_str("2025-12-25 23:30:00", MOCK_TIME_FORMAT).is_ok());
        assert!(NaiveDateTime::parse_from_str("2025-12-25T23:30:00", MOCK_TIME_FORMAT).is_err());
        assert!(NaiveDateTime::parse_from_str("23:30", MOCK_TIME_FORMAT).is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_is_mock_time_active_does_not_panic() {
        let _ = is_mock_time_active();
    }

    #[test]
    fn test_now_advances() {
        let t1 = now();
        std::thread::sleep(Duration::from_millis(20));
        let t2 = now();
        assert!(t2 > t1);
    }
}
