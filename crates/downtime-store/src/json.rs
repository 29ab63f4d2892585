//! JSON-document store
//!
//! Keeps the documents the web front-end reads and writes
//! (`schedule.json`, `status.json`, `client_ip.json`) in one directory,
//! plus an append-only `audit.jsonl`. Cross-process access is serialized
//! with `flock` on a lock file; every document write goes to a temporary
//! file which is then renamed into place.
//!
//! The audit log is split into generations of `audit_retention` events.
//! When the live file fills up it replaces `audit.jsonl.1`, so at most two
//! generations exist on disk. The last id handed out is kept in a small
//! counter file so appends never rescan the log.

use chrono::{DateTime, Utc};
use downtime_api::{ClientRecord, EnforcementState};
use downtime_util::{ClientName, ScheduleWindow};
use nix::fcntl::{Flock, FlockArg};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{
    AuditEvent, AuditLog, ClientRegistry, ScheduleStore, StateStore, Store, StoreError,
    StoreResult, DEFAULT_AUDIT_RETENTION,
};

pub const SCHEDULE_FILE: &str = "schedule.json";
pub const STATUS_FILE: &str = "status.json";
pub const REGISTRY_FILE: &str = "client_ip.json";
pub const AUDIT_FILE: &str = "audit.jsonl";
pub const AUDIT_ROTATED_FILE: &str = "audit.jsonl.1";
const AUDIT_SEQ_FILE: &str = ".audit.seq";
const LOCK_FILE: &str = ".downtime.lock";

/// One value of the `client_ip.json` map, keyed by client name
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryEntry {
    client_ip: String,
    last_seen: i64,
}

type RegistryDocument = BTreeMap<String, RegistryEntry>;

/// Keep every entry that parses; a bad entry must not take its
/// neighbours down with it.
fn parse_registry(raw: BTreeMap<String, serde_json::Value>) -> RegistryDocument {
    raw.into_iter()
        .filter_map(|(name, value)| match serde_json::from_value(value) {
            Ok(entry) => Some((name, entry)),
            Err(e) => {
                warn!(client = %name, error = %e, "Skipping unreadable registry entry");
                None
            }
        })
        .collect()
}

/// Audit events of one log file, oldest first
fn read_audit_file(path: &Path) -> StoreResult<Vec<AuditEvent>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut events = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => warn!(error = %e, "Skipping unreadable audit line"),
        }
    }
    Ok(events)
}

fn entry_to_record(name: &str, entry: &RegistryEntry) -> ClientRecord {
    let last_seen =
        DateTime::<Utc>::from_timestamp(entry.last_seen, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    ClientRecord::new(name, entry.client_ip.clone(), last_seen)
}

/// Store backed by JSON documents in a directory
pub struct JsonFileStore {
    dir: PathBuf,
    audit_retention: usize,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "JSON store opened");
        Ok(Self {
            dir,
            audit_retention: DEFAULT_AUDIT_RETENTION,
        })
    }

    /// Keep only the newest `retention` audit events (at least one)
    pub fn with_audit_retention(mut self, retention: usize) -> Self {
        self.audit_retention = retention.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn lock(&self, arg: FlockArg) -> StoreResult<Flock<File>> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path(LOCK_FILE))?;
        Flock::lock(file, arg).map_err(|(_, errno)| StoreError::Lock(errno.to_string()))
    }

    fn shared(&self) -> StoreResult<Flock<File>> {
        self.lock(FlockArg::LockShared)
    }

    fn exclusive(&self) -> StoreResult<Flock<File>> {
        self.lock(FlockArg::LockExclusive)
    }

    /// Read and parse a document; `None` if the file does not exist
    fn read_document<T: DeserializeOwned>(&self, file: &str) -> StoreResult<Option<T>> {
        match fs::read_to_string(self.path(file)) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Like `read_document`, but an unreadable document is treated as
    /// missing. Only used on write paths, which replace the whole file.
    fn read_document_lenient<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        match self.read_document(file) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(file, error = %e, "Existing document unreadable, replacing it");
                None
            }
        }
    }

    /// Write a document atomically: temp file, fsync, rename
    fn write_document<T: Serialize>(&self, file: &str, value: &T) -> StoreResult<()> {
        let target = self.path(file);
        let tmp = self.path(&format!(".{}.tmp", file));

        let json = serde_json::to_string_pretty(value)?;
        {
            let mut out = File::create(&tmp)?;
            out.write_all(json.as_bytes())?;
            out.sync_all()?;
        }
        fs::rename(&tmp, &target)?;

        debug!(file, "Document written");
        Ok(())
    }

    fn read_registry(&self) -> StoreResult<RegistryDocument> {
        Ok(parse_registry(
            self.read_document(REGISTRY_FILE)?.unwrap_or_default(),
        ))
    }

    fn retention(&self) -> i64 {
        i64::try_from(self.audit_retention).unwrap_or(i64::MAX)
    }

    /// Id for the next audit event. Caller holds the exclusive lock.
    fn next_audit_id(&self) -> StoreResult<i64> {
        if let Some(last) = self.read_document_lenient::<i64>(AUDIT_SEQ_FILE) {
            return Ok(last + 1);
        }

        // No counter yet: continue from the newest logged event
        for file in [AUDIT_FILE, AUDIT_ROTATED_FILE] {
            if let Some(event) = read_audit_file(&self.path(file))?.last() {
                return Ok(event.id + 1);
            }
        }
        Ok(1)
    }

    fn rotate_audit(&self) -> StoreResult<()> {
        match fs::rename(self.path(AUDIT_FILE), self.path(AUDIT_ROTATED_FILE)) {
            Ok(()) => {
                debug!("Audit log rotated");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl ScheduleStore for JsonFileStore {
    fn load_schedule(&self) -> StoreResult<Option<ScheduleWindow>> {
        let _guard = self.shared()?;
        self.read_document(SCHEDULE_FILE)
    }

    fn save_schedule(&self, schedule: &ScheduleWindow) -> StoreResult<()> {
        let _guard = self.exclusive()?;
        self.write_document(SCHEDULE_FILE, schedule)
    }
}

impl StateStore for JsonFileStore {
    fn load_state(&self) -> StoreResult<Option<EnforcementState>> {
        let _guard = self.shared()?;
        self.read_document(STATUS_FILE)
    }

    fn save_state(&self, state: &EnforcementState) -> StoreResult<()> {
        let _guard = self.exclusive()?;
        self.write_document(STATUS_FILE, state)
    }

    fn update_state(
        &self,
        apply: &mut dyn FnMut(&mut EnforcementState),
    ) -> StoreResult<EnforcementState> {
        let _guard = self.exclusive()?;

        let mut state: EnforcementState =
            self.read_document_lenient(STATUS_FILE).unwrap_or_default();
        apply(&mut state);
        self.write_document(STATUS_FILE, &state)?;

        Ok(state)
    }
}

impl ClientRegistry for JsonFileStore {
    fn upsert(
        &self,
        name: &ClientName,
        address: &str,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<ClientRecord> {
        let _guard = self.exclusive()?;

        let mut registry =
            parse_registry(self.read_document_lenient(REGISTRY_FILE).unwrap_or_default());
        let entry = RegistryEntry {
            client_ip: address.to_string(),
            last_seen: seen_at.timestamp(),
        };
        let record = entry_to_record(name.as_str(), &entry);
        registry.insert(name.as_str().to_string(), entry);
        self.write_document(REGISTRY_FILE, &registry)?;

        Ok(record)
    }

    fn all_clients(&self) -> StoreResult<Vec<ClientRecord>> {
        let _guard = self.shared()?;
        let registry = self.read_registry()?;
        Ok(registry
            .iter()
            .map(|(name, entry)| entry_to_record(name, entry))
            .collect())
    }

    fn get_client(&self, name: &ClientName) -> StoreResult<Option<ClientRecord>> {
        let _guard = self.shared()?;
        let registry = self.read_registry()?;
        Ok(registry
            .get(name.as_str())
            .map(|entry| entry_to_record(name.as_str(), entry)))
    }
}

impl AuditLog for JsonFileStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let _guard = self.exclusive()?;

        event.id = self.next_audit_id()?;
        if event.id > 1 && (event.id - 1) % self.retention() == 0 {
            self.rotate_audit()?;
        }
        // Counter first: a crash before the append leaves a gap, never a duplicate
        self.write_document(AUDIT_SEQ_FILE, &event.id)?;

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(AUDIT_FILE))?;
        file.write_all(line.as_bytes())?;

        debug!(event_id = event.id, "Audit event appended");
        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let _guard = self.shared()?;

        let mut events = read_audit_file(&self.path(AUDIT_FILE))?;
        if events.len() < limit {
            let mut older = read_audit_file(&self.path(AUDIT_ROTATED_FILE))?;
            older.append(&mut events);
            events = older;
        }

        let floor = events
            .last()
            .map(|newest| newest.id.saturating_sub(self.retention()))
            .unwrap_or(0);
        events.retain(|event| event.id > floor);

        events.reverse();
        events.truncate(limit);
        Ok(events)
    }
}

impl Store for JsonFileStore {
    fn is_healthy(&self) -> bool {
        match self.shared() {
            Ok(_) => self.dir.is_dir(),
            Err(e) => {
                warn!(error = %e, "JSON store lock unavailable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use chrono::{Local, TimeZone};
    use downtime_api::EnforcedStatus;
    use downtime_util::WallClock;
    use std::time::Duration;

    fn store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn empty_directory_has_no_documents() {
        let (_dir, store) = store();
        assert!(store.is_healthy());
        assert!(store.load_schedule().unwrap().is_none());
        assert!(store.load_state().unwrap().is_none());
        assert!(store.all_clients().unwrap().is_empty());
        assert!(store.recent_audits(10).unwrap().is_empty());
    }

    #[test]
    fn reads_legacy_documents() {
        let (dir, store) = store();
        fs::write(
            dir.path().join(SCHEDULE_FILE),
            r#"{"disable_time": "21:30", "enable_time": "07:00"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(STATUS_FILE),
            r#"{"status": "paused", "manual": true}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(REGISTRY_FILE),
            r#"{"kids-pc": {"client_ip": "192.168.86.100", "last_seen": 1735000000}}"#,
        )
        .unwrap();

        assert_eq!(
            store.load_schedule().unwrap(),
            Some(ScheduleWindow::new(
                WallClock::new(21, 30).unwrap(),
                WallClock::new(7, 0).unwrap()
            ))
        );
        assert_eq!(
            store.load_state().unwrap(),
            Some(EnforcementState::manual(EnforcedStatus::Paused))
        );

        let clients = store.all_clients().unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name.as_str(), "kids-pc");
        assert_eq!(clients[0].address, "192.168.86.100");
        assert_eq!(clients[0].last_seen.timestamp(), 1_735_000_000);
    }

    #[test]
    fn registry_is_written_in_legacy_shape() {
        let (dir, store) = store();
        let seen = Utc.timestamp_opt(1_735_000_000, 0).unwrap();
        store
            .upsert(&ClientName::new("laptop"), "10.0.0.7", seen)
            .unwrap();

        let raw = fs::read_to_string(dir.path().join(REGISTRY_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "laptop": { "client_ip": "10.0.0.7", "last_seen": 1735000000 } })
        );
    }

    #[test]
    fn corrupt_state_errors_on_load_and_is_replaced_on_update() {
        let (dir, store) = store();
        fs::write(dir.path().join(STATUS_FILE), "{ not json").unwrap();

        assert!(matches!(store.load_state(), Err(StoreError::Serialization(_))));

        let state = store
            .update_state(&mut |s| s.status = EnforcedStatus::Paused)
            .unwrap();
        assert_eq!(state, EnforcementState::scheduled(EnforcedStatus::Paused));
        assert_eq!(store.load_state().unwrap(), Some(state));
    }

    #[test]
    fn corrupt_registry_is_replaced_on_upsert() {
        let (dir, store) = store();
        fs::write(dir.path().join(REGISTRY_FILE), "[]garbage").unwrap();
        assert!(store.all_clients().is_err());

        let seen = Utc.timestamp_opt(1_735_000_000, 0).unwrap();
        store.upsert(&ClientName::new("a"), "10.0.0.1", seen).unwrap();
        assert_eq!(store.all_clients().unwrap().len(), 1);
    }

    #[test]
    fn bad_registry_entry_does_not_drop_the_others() {
        let (dir, store) = store();
        fs::write(
            dir.path().join(REGISTRY_FILE),
            r#"{
                "kids-pc": {"client_ip": "192.168.86.100", "last_seen": 1735000000},
                "broken": {"client_ip": 42},
                "tv": {"client_ip": "192.168.86.101", "last_seen": 1735000100}
            }"#,
        )
        .unwrap();

        let names: Vec<_> = store
            .all_clients()
            .unwrap()
            .into_iter()
            .map(|c| c.name.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["kids-pc", "tv"]);

        let seen = Utc.timestamp_opt(1_735_000_200, 0).unwrap();
        store
            .upsert(&ClientName::new("laptop"), "192.168.86.102", seen)
            .unwrap();

        let clients = store.all_clients().unwrap();
        assert_eq!(clients.len(), 3);
        assert!(store.get_client(&ClientName::new("kids-pc")).unwrap().is_some());
        assert!(store.get_client(&ClientName::new("tv")).unwrap().is_some());
    }

    #[test]
    fn update_state_keeps_concurrent_override() {
        let (dir, store) = store();
        let other = JsonFileStore::open(dir.path()).unwrap();

        other
            .save_state(&EnforcementState::manual(EnforcedStatus::Unpaused))
            .unwrap();

        let state = store
            .update_state(&mut |s| {
                if !s.manual_override {
                    s.status = EnforcedStatus::Paused;
                }
            })
            .unwrap();

        assert_eq!(state, EnforcementState::manual(EnforcedStatus::Unpaused));
    }

    #[test]
    fn upsert_and_recently_active() {
        let (_dir, store) = store();
        let now = Local.with_ymd_and_hms(2025, 12, 25, 22, 0, 0).unwrap();

        store
            .upsert(
                &ClientName::new("fresh"),
                "10.0.0.1",
                (now - chrono::Duration::seconds(119)).with_timezone(&Utc),
            )
            .unwrap();
        store
            .upsert(
                &ClientName::new("stale"),
                "10.0.0.2",
                (now - chrono::Duration::seconds(600)).with_timezone(&Utc),
            )
            .unwrap();

        let recent = store
            .recently_active(Duration::from_secs(120), &now)
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].name.as_str(), "fresh");
        assert!(store.get_client(&ClientName::new("stale")).unwrap().is_some());
    }

    #[test]
    fn audit_log_is_newest_first() {
        let (_dir, store) = store();
        for status in [EnforcedStatus::Paused, EnforcedStatus::Unpaused] {
            store
                .append_audit(AuditEvent::new(AuditEventType::OverrideCleared { status }))
                .unwrap();
        }

        let events = store.recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, 2);
        assert_eq!(
            events[0].event,
            AuditEventType::OverrideCleared {
                status: EnforcedStatus::Unpaused
            }
        );

        assert_eq!(store.recent_audits(1).unwrap().len(), 1);
    }

    fn cleared(status: EnforcedStatus) -> AuditEvent {
        AuditEvent::new(AuditEventType::OverrideCleared { status })
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path)
            .map(|content| content.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn audit_log_is_bounded_by_retention() {
        let (dir, store) = store();
        let store = store.with_audit_retention(3);

        for _ in 0..7 {
            store.append_audit(cleared(EnforcedStatus::Paused)).unwrap();
        }

        let ids: Vec<_> = store
            .recent_audits(100)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![7, 6, 5]);

        assert_eq!(line_count(&dir.path().join(AUDIT_FILE)), 1);
        assert_eq!(line_count(&dir.path().join(AUDIT_ROTATED_FILE)), 3);
    }

    #[test]
    fn audit_ids_continue_without_counter_file() {
        let (dir, store) = store();
        for _ in 0..2 {
            store.append_audit(cleared(EnforcedStatus::Unpaused)).unwrap();
        }
        fs::remove_file(dir.path().join(AUDIT_SEQ_FILE)).unwrap();

        store.append_audit(cleared(EnforcedStatus::Paused)).unwrap();
        assert_eq!(store.recent_audits(1).unwrap()[0].id, 3);
    }
}
