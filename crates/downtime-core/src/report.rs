//! Results of engine operations, for logging and presentation

use chrono::{DateTime, Local};
use downtime_api::{
    ClientRecord, Command, DispatchResult, EnforcedStatus, EnforcementState, ManualTarget,
};
use downtime_store::AuditEvent;
use downtime_util::{CycleId, ScheduleWindow};
use serde::Serialize;
use std::time::Duration;

/// What one enforcement cycle did
#[derive(Debug, Clone)]
pub enum CycleReport {
    /// A manual override was in effect; nothing was sent or written
    Suppressed {
        cycle_id: CycleId,
        state: EnforcementState,
    },

    Enforced {
        cycle_id: CycleId,
        desired: EnforcedStatus,
        /// One result per registered client
        broadcast: Vec<DispatchResult>,
        /// One result per recently active client
        reconciled: Vec<DispatchResult>,
        /// Whether `desired` was written to the stored state
        state_persisted: bool,
        /// An operator override landed while this cycle was running
        override_preempted: bool,
    },
}

impl CycleReport {
    pub fn cycle_id(&self) -> CycleId {
        match self {
            CycleReport::Suppressed { cycle_id, .. } => *cycle_id,
            CycleReport::Enforced { cycle_id, .. } => *cycle_id,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, CycleReport::Suppressed { .. })
    }

    /// Every dispatch that did not reach its client
    pub fn failures(&self) -> Vec<&DispatchResult> {
        match self {
            CycleReport::Suppressed { .. } => Vec::new(),
            CycleReport::Enforced {
                broadcast,
                reconciled,
                ..
            } => broadcast
                .iter()
                .chain(reconciled.iter())
                .filter(|r| !r.is_delivered())
                .collect(),
        }
    }
}

/// What a manual command did
#[derive(Debug, Clone)]
pub struct ManualReport {
    pub command: Command,
    pub target: ManualTarget,
    pub results: Vec<DispatchResult>,
    pub state: EnforcementState,
}

/// A registered client as seen by the status view
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    #[serde(flatten)]
    pub record: ClientRecord,
    pub recently_active: bool,
    #[serde(rename = "age_seconds", serialize_with = "serialize_secs")]
    pub age: Duration,
}

/// Read-only snapshot for the operator. Not authoritative: a cycle or
/// operator action may change any of it right after it is taken.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub now: DateTime<Local>,
    pub state: EnforcementState,
    pub schedule: ScheduleWindow,
    /// What the schedule alone asks for at `now`
    pub scheduled_status: EnforcedStatus,
    pub clients: Vec<ClientStatus>,
    pub recent_events: Vec<AuditEvent>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}
