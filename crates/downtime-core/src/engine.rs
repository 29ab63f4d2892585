//! Enforcement engine

use chrono::{DateTime, Local, Utc};
use downtime_api::{
    ClientRecord, Command, DispatchResult, DispatchTarget, EnforcedStatus, EnforcementState,
    ManualTarget,
};
use downtime_config::EnforcementConfig;
use downtime_dispatch::Dispatcher;
use downtime_store::{AuditEvent, AuditEventType, Store};
use downtime_util::{ClientName, CycleId, ScheduleWindow, WallClock};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    ClientStatus, CycleReport, EngineError, EngineResult, ManualReport, StatusReport,
};

/// Number of audit entries included in a status snapshot
const STATUS_AUDIT_LIMIT: usize = 20;

/// Decides the downtime status and pushes it to clients.
///
/// The engine holds no state of its own between calls: every operation
/// reads what it needs from the store, so separate processes may drive
/// the same store.
pub struct EnforcementEngine {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    config: EnforcementConfig,
}

impl EnforcementEngine {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn Dispatcher>,
        config: EnforcementConfig,
    ) -> Self {
        debug!(
            reconnect_window_secs = config.reconnect_window.as_secs(),
            default_schedule = %config.default_schedule,
            "Enforcement engine initialized"
        );

        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    /// Run one scheduled enforcement cycle at `now`.
    ///
    /// Broadcasts the schedule-derived command to every registered client,
    /// records the decided status, then resends it to clients that checked
    /// in within the reconnect window. Delivery failures never change the
    /// recorded status. Does nothing while a manual override is active.
    pub async fn run_cycle(&self, now: DateTime<Local>) -> CycleReport {
        let cycle_id = CycleId::new();
        let schedule = self.load_schedule();
        let state = self.load_state();

        if state.manual_override {
            info!(
                cycle = %cycle_id,
                status = %state.status,
                "Manual override active, skipping scheduled enforcement"
            );
            self.audit(AuditEventType::EnforcementSuppressed {
                cycle_id,
                status: state.status,
            });
            return CycleReport::Suppressed { cycle_id, state };
        }

        let desired = EnforcedStatus::from_downtime(schedule.contains(&now));
        let command = Command::for_status(desired);
        info!(
            cycle = %cycle_id,
            now = %WallClock::from_datetime(&now),
            schedule = %schedule,
            desired = %desired,
            "Enforcing schedule"
        );

        let clients = self.load_clients();
        let targets: Vec<DispatchTarget> = clients.iter().map(DispatchTarget::from).collect();
        let broadcast = self.dispatcher.dispatch_all(&targets, command).await;

        // Re-read under the store lock: an operator may have taken over
        // while the broadcast was in flight.
        let mut override_preempted = false;
        let persisted = self.store.update_state(&mut |current| {
            if current.manual_override {
                override_preempted = true;
            } else {
                current.status = desired;
            }
        });

        let state_persisted = match persisted {
            Ok(_) if override_preempted => {
                warn!(
                    cycle = %cycle_id,
                    "Manual override set during enforcement, leaving stored state alone"
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                error!(cycle = %cycle_id, error = %e, "Failed to persist enforcement state");
                false
            }
        };

        let reconciled = if override_preempted {
            Vec::new()
        } else {
            self.reconcile(cycle_id, &now, command).await
        };

        for result in broadcast.iter().chain(reconciled.iter()) {
            if !result.is_delivered() {
                self.audit_failure(Some(cycle_id), result);
            }
        }

        self.audit(AuditEventType::CycleCompleted {
            cycle_id,
            desired,
            broadcast_total: broadcast.len(),
            broadcast_delivered: broadcast.iter().filter(|r| r.is_delivered()).count(),
            reconciled_total: reconciled.len(),
            reconciled_delivered: reconciled.iter().filter(|r| r.is_delivered()).count(),
        });

        info!(
            cycle = %cycle_id,
            desired = %desired,
            broadcast = broadcast.len(),
            reconciled = reconciled.len(),
            state_persisted,
            "Enforcement cycle complete"
        );

        CycleReport::Enforced {
            cycle_id,
            desired,
            broadcast,
            reconciled,
            state_persisted,
            override_preempted,
        }
    }

    /// Resend `command` to clients seen within the reconnect window
    async fn reconcile(
        &self,
        cycle_id: CycleId,
        now: &DateTime<Local>,
        command: Command,
    ) -> Vec<DispatchResult> {
        let recent = match self
            .store
            .recently_active(self.config.reconnect_window, now)
        {
            Ok(recent) => recent,
            Err(e) => {
                warn!(cycle = %cycle_id, error = %e, "Failed to load recent clients, skipping reconciliation");
                return Vec::new();
            }
        };

        if recent.is_empty() {
            debug!(cycle = %cycle_id, "No recently active clients to reconcile");
            return Vec::new();
        }

        debug!(cycle = %cycle_id, count = recent.len(), "Reconciling recently active clients");
        let targets: Vec<DispatchTarget> = recent.iter().map(DispatchTarget::from).collect();
        self.dispatcher.dispatch_all(&targets, command).await
    }

    /// Force a status on all clients or one client.
    ///
    /// The command is sent first, then the state is recorded with the
    /// override set, so scheduled cycles stop until `clear_override`.
    pub async fn apply_manual_command(
        &self,
        command: Command,
        target: ManualTarget,
    ) -> EngineResult<ManualReport> {
        let clients = match &target {
            ManualTarget::All => self.store.all_clients()?,
            ManualTarget::Client { name } => match self.store.get_client(name)? {
                Some(record) => vec![record],
                None => return Err(EngineError::UnknownClient(name.clone())),
            },
        };

        info!(
            command = %command,
            target = %target,
            clients = clients.len(),
            "Applying manual command"
        );

        let targets: Vec<DispatchTarget> = clients.iter().map(DispatchTarget::from).collect();
        let results = self.dispatcher.dispatch_all(&targets, command).await;

        for result in results.iter().filter(|r| !r.is_delivered()) {
            self.audit_failure(None, result);
        }

        let state = if command == Command::Unpause && self.config.manual_unpause_clears_override {
            EnforcementState::scheduled(command.status())
        } else {
            EnforcementState::manual(command.status())
        };
        self.store.save_state(&state)?;

        info!(
            status = %state.status,
            manual = state.manual_override,
            "Manual state recorded"
        );

        self.audit(AuditEventType::ManualOverrideSet {
            command,
            target: target.clone(),
            state,
        });

        Ok(ManualReport {
            command,
            target,
            results,
            state,
        })
    }

    /// Hand control back to the schedule. The status is left as is; the
    /// next cycle corrects it.
    pub fn clear_override(&self) -> EngineResult<EnforcementState> {
        let state = self
            .store
            .update_state(&mut |current| current.manual_override = false)?;

        info!(status = %state.status, "Manual override cleared");
        self.audit(AuditEventType::OverrideCleared {
            status: state.status,
        });

        Ok(state)
    }

    /// Replace the downtime window
    pub fn update_schedule(&self, schedule: ScheduleWindow) -> EngineResult<()> {
        self.store.save_schedule(&schedule)?;

        if schedule.is_empty() {
            warn!(schedule = %schedule, "Disable and enable times are equal, downtime will never be active");
        }
        info!(schedule = %schedule, "Schedule updated");
        self.audit(AuditEventType::ScheduleUpdated { schedule });

        Ok(())
    }

    /// Register or refresh a client from a heartbeat
    pub fn record_heartbeat(
        &self,
        name: ClientName,
        address: &str,
        seen_at: DateTime<Utc>,
    ) -> EngineResult<ClientRecord> {
        if name.is_empty() {
            return Err(EngineError::InvalidClientName);
        }
        let address = address.trim();
        if let Err(e) = address.parse::<IpAddr>() {
            return Err(EngineError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            });
        }

        let record = self.store.upsert(&name, address, seen_at)?;
        debug!(client = %record.name, address = %record.address, "Heartbeat recorded");

        self.audit(AuditEventType::ClientSeen {
            client_name: record.name.clone(),
            address: record.address.clone(),
        });

        Ok(record)
    }

    /// Snapshot of schedule, state, clients and recent activity
    pub fn status(&self, now: DateTime<Local>) -> StatusReport {
        let schedule = self.load_schedule();
        let state = self.load_state();

        let clients = self
            .load_clients()
            .into_iter()
            .map(|record| ClientStatus {
                recently_active: record.is_recent(self.config.reconnect_window, &now),
                age: record.age(&now),
                record,
            })
            .collect();

        let recent_events = self
            .store
            .recent_audits(STATUS_AUDIT_LIMIT)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load audit log");
                Vec::new()
            });

        StatusReport {
            scheduled_status: EnforcedStatus::from_downtime(schedule.contains(&now)),
            now,
            state,
            schedule,
            clients,
            recent_events,
        }
    }

    fn load_schedule(&self) -> ScheduleWindow {
        match self.store.load_schedule() {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                debug!("No stored schedule, using default");
                self.config.default_schedule
            }
            Err(e) => {
                warn!(error = %e, "Failed to load schedule, using default");
                self.config.default_schedule
            }
        }
    }

    fn load_state(&self) -> EnforcementState {
        match self.store.load_state() {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to load enforcement state, using default");
                EnforcementState::default()
            }
        }
    }

    fn load_clients(&self) -> Vec<ClientRecord> {
        self.store.all_clients().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load client registry, treating as empty");
            Vec::new()
        })
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    fn audit_failure(&self, cycle_id: Option<CycleId>, result: &DispatchResult) {
        self.audit(AuditEventType::DispatchFailed {
            cycle_id,
            client_name: result.client_name.clone(),
            address: result.address.clone(),
            command: result.command,
            outcome: result.outcome.clone(),
        });
    }
}
