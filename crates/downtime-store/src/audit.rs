//! Audit event types

use chrono::{DateTime, Local};
use downtime_api::{Command, DispatchOutcome, EnforcedStatus, EnforcementState, ManualTarget};
use downtime_util::{ClientName, CycleId, ScheduleWindow};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Scheduled enforcement ran
    CycleCompleted {
        cycle_id: CycleId,
        desired: EnforcedStatus,
        broadcast_total: usize,
        broadcast_delivered: usize,
        reconciled_total: usize,
        reconciled_delivered: usize,
    },

    /// Scheduled enforcement skipped because of a manual override
    EnforcementSuppressed {
        cycle_id: CycleId,
        status: EnforcedStatus,
    },

    /// A command did not reach a client
    DispatchFailed {
        cycle_id: Option<CycleId>,
        client_name: ClientName,
        address: String,
        command: Command,
        outcome: DispatchOutcome,
    },

    /// Operator forced a status
    ManualOverrideSet {
        command: Command,
        target: ManualTarget,
        state: EnforcementState,
    },

    /// Operator handed control back to the schedule
    OverrideCleared { status: EnforcedStatus },

    /// Operator changed the downtime window
    ScheduleUpdated { schedule: ScheduleWindow },

    /// Heartbeat or registration received
    ClientSeen {
        client_name: ClientName,
        address: String,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: downtime_util::now(),
            event,
        }
    }
}
