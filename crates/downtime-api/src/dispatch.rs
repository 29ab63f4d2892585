//! Per-client dispatch targets and results

use downtime_util::ClientName;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ClientRecord, Command};

/// Where a single command goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTarget {
    pub client_name: ClientName,
    pub address: String,
}

impl DispatchTarget {
    pub fn new(client_name: impl Into<ClientName>, address: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            address: address.into(),
        }
    }
}

impl From<&ClientRecord> for DispatchTarget {
    fn from(record: &ClientRecord) -> Self {
        Self {
            client_name: record.name.clone(),
            address: record.address.clone(),
        }
    }
}

/// Which bounded step ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPhase {
    Connect,
    Read,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Connect => f.write_str("connect"),
            TimeoutPhase::Read => f.write_str("read"),
        }
    }
}

/// What happened to one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The command was written; `response` may be empty ("no response")
    Delivered { response: String },

    ConnectFailed { reason: String },

    Timeout { phase: TimeoutPhase },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    /// Client acknowledgment for display, if anything was read
    pub fn response(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Delivered { response } if !response.is_empty() => Some(response),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Delivered { response } if response.is_empty() => {
                f.write_str("delivered (no response from client)")
            }
            DispatchOutcome::Delivered { response } => write!(f, "delivered: {}", response),
            DispatchOutcome::ConnectFailed { reason } => write!(f, "connect failed: {}", reason),
            DispatchOutcome::Timeout { phase } => write!(f, "timed out during {}", phase),
        }
    }
}

/// Result of one dispatch; produced per client and never authoritative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub client_name: ClientName,
    pub address: String,
    pub command: Command,
    pub outcome: DispatchOutcome,
}

impl DispatchResult {
    pub fn new(target: &DispatchTarget, command: Command, outcome: DispatchOutcome) -> Self {
        Self {
            client_name: target.client_name.clone(),
            address: target.address.clone(),
            command,
            outcome,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.outcome.is_delivered()
    }
}
