//! The daily downtime window

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WallClock;

/// Daily window during which clients should be paused.
///
/// The window runs from `disable_time` up to (not including) `enable_time`
/// and wraps past midnight when `disable_time > enable_time`. Equal times
/// describe an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub disable_time: WallClock,
    pub enable_time: WallClock,
}

impl ScheduleWindow {
    pub fn new(disable_time: WallClock, enable_time: WallClock) -> Self {
        Self {
            disable_time,
            enable_time,
        }
    }

    /// Whether downtime is active at the given time of day
    pub fn is_downtime_active(&self, now: WallClock) -> bool {
        if self.is_empty() {
            false
        } else if self.crosses_midnight() {
            // e.g. 22:00 - 06:00
            now >= self.disable_time || now < self.enable_time
        } else {
            now >= self.disable_time && now < self.enable_time
        }
    }

    /// Whether downtime is active at the given local datetime
    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        self.is_downtime_active(WallClock::from_datetime(dt))
    }

    pub fn crosses_midnight(&self) -> bool {
        self.disable_time > self.enable_time
    }

    pub fn is_empty(&self) -> bool {
        self.disable_time == self.enable_time
    }
}

impl Default for ScheduleWindow {
    /// 22:00 - 06:00
    fn default() -> Self {
        Self {
            disable_time: WallClock::new(22, 0).unwrap_or(WallClock::midnight()),
            enable_time: WallClock::new(6, 0).unwrap_or(WallClock::midnight()),
        }
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.disable_time, self.enable_time)
    }
}
