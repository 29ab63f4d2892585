//! Store trait definitions

use chrono::{DateTime, Local, Utc};
use downtime_api::{ClientRecord, EnforcementState};
use downtime_util::{ClientName, ScheduleWindow};
use std::time::Duration;

use crate::{AuditEvent, StoreResult};

/// Persisted downtime window, written by the operator surface
pub trait ScheduleStore {
    /// Load the saved schedule, `None` if none was ever saved
    fn load_schedule(&self) -> StoreResult<Option<ScheduleWindow>>;

    fn save_schedule(&self, schedule: &ScheduleWindow) -> StoreResult<()>;
}

/// Persisted enforcement state
pub trait StateStore {
    /// Load the saved state, `None` if none was ever saved
    fn load_state(&self) -> StoreResult<Option<EnforcementState>>;

    fn save_state(&self, state: &EnforcementState) -> StoreResult<()>;

    /// Atomic read-modify-write.
    ///
    /// `apply` runs while the store's write lock is held and sees the current
    /// state (the default when missing or unreadable). The result is persisted
    /// and returned.
    fn update_state(
        &self,
        apply: &mut dyn FnMut(&mut EnforcementState),
    ) -> StoreResult<EnforcementState>;
}

/// Known clients, keyed by name. There is no delete: stale entries are
/// filtered at read time.
pub trait ClientRegistry {
    /// Insert or overwrite the record for `name`
    fn upsert(
        &self,
        name: &ClientName,
        address: &str,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<ClientRecord>;

    /// Snapshot of every registered client
    fn all_clients(&self) -> StoreResult<Vec<ClientRecord>>;

    /// Clients whose last heartbeat is less than `within` before `now`
    fn recently_active(
        &self,
        within: Duration,
        now: &DateTime<Local>,
    ) -> StoreResult<Vec<ClientRecord>> {
        Ok(self
            .all_clients()?
            .into_iter()
            .filter(|c| c.is_recent(within, now))
            .collect())
    }

    fn get_client(&self, name: &ClientName) -> StoreResult<Option<ClientRecord>> {
        Ok(self.all_clients()?.into_iter().find(|c| &c.name == name))
    }
}

/// Append-only record of decisions and dispatch outcomes
pub trait AuditLog {
    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;
}

/// Main store trait
pub trait Store: ScheduleStore + StateStore + ClientRegistry + AuditLog + Send + Sync {
    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
