//! SQLite-based store implementation

use chrono::{DateTime, Local, Utc};
use downtime_api::{ClientRecord, EnforcementState};
use downtime_util::{ClientName, ScheduleWindow};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    AuditEvent, AuditLog, ClientRegistry, ScheduleStore, StateStore, Store, StoreError,
    StoreResult, DEFAULT_AUDIT_RETENTION,
};

/// How long a writer waits on another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    audit_retention: usize,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
            audit_retention: DEFAULT_AUDIT_RETENTION,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            audit_retention: DEFAULT_AUDIT_RETENTION,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Keep only the newest `retention` audit events (at least one)
    pub fn with_audit_retention(mut self, retention: usize) -> Self {
        self.audit_retention = retention.max(1);
        self
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only, oldest rows pruned)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Client registry
            CREATE TABLE IF NOT EXISTS clients (
                name TEXT PRIMARY KEY,
                client_ip TEXT NOT NULL,
                last_seen INTEGER NOT NULL
            );

            -- Downtime window (single row)
            CREATE TABLE IF NOT EXISTS schedule (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                schedule_json TEXT NOT NULL
            );

            -- Enforcement state (single row)
            CREATE TABLE IF NOT EXISTS enforcement_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_clients_last_seen ON clients(last_seen);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn read_state(conn: &Connection) -> StoreResult<Option<EnforcementState>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT state_json FROM enforcement_state WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

fn write_state(conn: &Connection, state: &EnforcementState) -> StoreResult<()> {
    let json = serde_json::to_string(state)?;
    conn.execute(
        r#"
        INSERT INTO enforcement_state (id, state_json)
        VALUES (1, ?)
        ON CONFLICT(id)
        DO UPDATE SET state_json = excluded.state_json
        "#,
        [json],
    )?;
    Ok(())
}

fn record_from_row(name: String, address: String, last_seen: i64) -> ClientRecord {
    let last_seen = DateTime::<Utc>::from_timestamp(last_seen, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    ClientRecord::new(name, address, last_seen)
}

impl ScheduleStore for SqliteStore {
    fn load_schedule(&self) -> StoreResult<Option<ScheduleWindow>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row("SELECT schedule_json FROM schedule WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn save_schedule(&self, schedule: &ScheduleWindow) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(schedule)?;

        conn.execute(
            r#"
            INSERT INTO schedule (id, schedule_json)
            VALUES (1, ?)
            ON CONFLICT(id)
            DO UPDATE SET schedule_json = excluded.schedule_json
            "#,
            [json],
        )?;

        debug!(schedule = %schedule, "Schedule saved");
        Ok(())
    }
}

impl StateStore for SqliteStore {
    fn load_state(&self) -> StoreResult<Option<EnforcementState>> {
        let conn = self.conn()?;
        read_state(&conn)
    }

    fn save_state(&self, state: &EnforcementState) -> StoreResult<()> {
        let conn = self.conn()?;
        write_state(&conn, state)?;
        debug!(status = %state.status, manual = state.manual_override, "State saved");
        Ok(())
    }

    fn update_state(
        &self,
        apply: &mut dyn FnMut(&mut EnforcementState),
    ) -> StoreResult<EnforcementState> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front so a concurrent process
        // cannot slip a write between our read and our write.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut state = match read_state(&tx) {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Stored state unreadable, starting from default");
                EnforcementState::default()
            }
        };
        apply(&mut state);
        write_state(&tx, &state)?;
        tx.commit()?;

        debug!(status = %state.status, manual = state.manual_override, "State updated");
        Ok(state)
    }
}

impl ClientRegistry for SqliteStore {
    fn upsert(
        &self,
        name: &ClientName,
        address: &str,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<ClientRecord> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO clients (name, client_ip, last_seen)
            VALUES (?, ?, ?)
            ON CONFLICT(name)
            DO UPDATE SET client_ip = excluded.client_ip, last_seen = excluded.last_seen
            "#,
            params![name.as_str(), address, seen_at.timestamp()],
        )?;

        debug!(client = %name, address, "Client upserted");
        Ok(record_from_row(
            name.as_str().to_string(),
            address.to_string(),
            seen_at.timestamp(),
        ))
    }

    fn all_clients(&self) -> StoreResult<Vec<ClientRecord>> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT name, client_ip, last_seen FROM clients ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(record_from_row(row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    fn recently_active(
        &self,
        within: Duration,
        now: &DateTime<Local>,
    ) -> StoreResult<Vec<ClientRecord>> {
        let conn = self.conn()?;
        // now - last_seen < within  <=>  last_seen > now - within
        let window = i64::try_from(within.as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.timestamp().saturating_sub(window);

        let mut stmt = conn.prepare(
            "SELECT name, client_ip, last_seen FROM clients WHERE last_seen > ? ORDER BY name",
        )?;
        let rows = stmt.query_map([cutoff], |row| {
            Ok(record_from_row(row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    fn get_client(&self, name: &ClientName) -> StoreResult<Option<ClientRecord>> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT name, client_ip, last_seen FROM clients WHERE name = ?",
                [name.as_str()],
                |row| Ok(record_from_row(row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(record)
    }
}

impl AuditLog for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();

        let keep = i64::try_from(self.audit_retention).unwrap_or(i64::MAX);
        let pruned = conn.execute(
            "DELETE FROM audit_log WHERE id <= ?",
            [event.id.saturating_sub(keep)],
        )?;
        debug!(event_id = event.id, pruned, "Audit event appended");

        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| downtime_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }
}

impl Store for SqliteStore {
    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
