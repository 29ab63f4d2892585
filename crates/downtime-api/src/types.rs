//! Enforcement state, commands, and client records

use chrono::{DateTime, Local, Utc};
use downtime_util::ClientName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Status last decided for all clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnforcedStatus {
    Paused,
    #[default]
    Unpaused,
}

impl EnforcedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcedStatus::Paused => "paused",
            EnforcedStatus::Unpaused => "unpaused",
        }
    }

    /// Status the schedule asks for, given whether downtime is active
    pub fn from_downtime(active: bool) -> Self {
        if active {
            EnforcedStatus::Paused
        } else {
            EnforcedStatus::Unpaused
        }
    }
}

impl fmt::Display for EnforcedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted enforcement record shared by the engine and the operator surface.
///
/// `status` is the last decided status, not necessarily the last delivered
/// one: per-client delivery failures never roll it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnforcementState {
    pub status: EnforcedStatus,

    /// While set, scheduled enforcement is suppressed
    #[serde(rename = "manual", default)]
    pub manual_override: bool,
}

impl EnforcementState {
    pub fn scheduled(status: EnforcedStatus) -> Self {
        Self {
            status,
            manual_override: false,
        }
    }

    pub fn manual(status: EnforcedStatus) -> Self {
        Self {
            status,
            manual_override: true,
        }
    }
}

/// Command sent to a client over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Pause,
    Unpause,
}

impl Command {
    pub fn for_status(status: EnforcedStatus) -> Self {
        match status {
            EnforcedStatus::Paused => Command::Pause,
            EnforcedStatus::Unpaused => Command::Unpause,
        }
    }

    /// Status a client is in once it has applied this command
    pub fn status(&self) -> EnforcedStatus {
        match self {
            Command::Pause => EnforcedStatus::Paused,
            Command::Unpause => EnforcedStatus::Unpaused,
        }
    }

    /// ASCII token written to the client socket
    pub fn wire_token(&self) -> &'static str {
        match self {
            Command::Pause => "pause",
            Command::Unpause => "unpause",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_token())
    }
}

/// A registered client, keyed by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub name: ClientName,

    /// Host or IP address; the dispatch port is process-wide
    #[serde(rename = "client_ip")]
    pub address: String,

    /// Most recent heartbeat, stored as epoch seconds
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_seen: DateTime<Utc>,
}

impl ClientRecord {
    pub fn new(name: impl Into<ClientName>, address: impl Into<String>, last_seen: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            last_seen,
        }
    }

    /// Whether the last heartbeat is less than `within` before `now`.
    ///
    /// A `last_seen` later than `now` counts as recent.
    pub fn is_recent(&self, within: Duration, now: &DateTime<Local>) -> bool {
        let age = now.timestamp().saturating_sub(self.last_seen.timestamp());
        age < i64::try_from(within.as_secs()).unwrap_or(i64::MAX)
    }

    /// Seconds since the last heartbeat, or zero if it lies in the future
    pub fn age(&self, now: &DateTime<Local>) -> Duration {
        let age = now.timestamp().saturating_sub(self.last_seen.timestamp());
        Duration::from_secs(age.max(0) as u64)
    }
}

/// Which clients a manual command goes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManualTarget {
    All,
    Client { name: ClientName },
}

impl fmt::Display for ManualTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualTarget::All => f.write_str("all clients"),
            ManualTarget::Client { name } => write!(f, "client '{}'", name),
        }
    }
}
