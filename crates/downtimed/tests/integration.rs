//! Integration tests for downtimed
//!
//! These tests drive the engine with the real TCP dispatcher against
//! loopback listeners standing in for clients.

use chrono::{DateTime, Local, TimeZone, Utc};
use downtime_api::{
    Command, DispatchOutcome, DispatchTarget, EnforcedStatus, EnforcementState, ManualTarget,
    TimeoutPhase,
};
use downtime_config::EnforcementConfig;
use downtime_core::{CycleReport, EnforcementEngine};
use downtime_dispatch::{Dispatcher, TcpDispatcher, TcpDispatcherConfig};
use downtime_store::{JsonFileStore, SqliteStore, StateStore};
use downtime_util::{ClientName, ScheduleWindow, WallClock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const ACK_HOST: &str = "127.0.0.1";
const SILENT_HOST: &str = "127.0.0.2";
const MUTE_HOST: &str = "127.0.0.3";
const ABSENT_HOST: &str = "127.0.0.4";

fn at(hour: u32, minute: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 12, 25, hour, minute, 0).unwrap()
}

fn evening_window() -> ScheduleWindow {
    ScheduleWindow::new(WallClock::new(22, 0).unwrap(), WallClock::new(6, 0).unwrap())
}

fn dispatcher(port: u16) -> TcpDispatcher {
    TcpDispatcher::new(TcpDispatcherConfig {
        port,
        connect_timeout: Duration::from_secs(1),
        read_timeout: Duration::from_millis(400),
        max_response_bytes: 1024,
    })
}

/// Client that replies ACK and reports every token it receives
async fn spawn_ack_client(host: &str, port: u16) -> mpsc::UnboundedReceiver<String> {
    let listener = TcpListener::bind((host, port)).await.unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let _ = tx.send(String::from_utf8_lossy(&buf[..n]).to_string());
                let _ = socket.write_all(b"ACK").await;
            });
        }
    });
    rx
}

/// Client that accepts and never answers
async fn spawn_silent_client(host: &str, port: u16) {
    let listener = TcpListener::bind((host, port)).await.unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                drop(socket);
            });
        }
    });
}

/// Client that reads the command and hangs up without a reply
async fn spawn_mute_client(host: &str, port: u16) {
    let listener = TcpListener::bind((host, port)).await.unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
        }
    });
}

/// Pick a port that is free on 127.0.0.1, and bind the ACK client to it
async fn ack_client_on_free_port() -> (u16, mpsc::UnboundedReceiver<String>) {
    let scratch = TcpListener::bind((ACK_HOST, 0)).await.unwrap();
    let port = scratch.local_addr().unwrap().port();
    drop(scratch);
    let rx = spawn_ack_client(ACK_HOST, port).await;
    (port, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut tokens = Vec::new();
    while let Ok(token) = rx.try_recv() {
        tokens.push(token);
    }
    tokens
}

#[tokio::test]
async fn test_cycle_against_mixed_clients() {
    let (port, mut acks) = ack_client_on_free_port().await;
    spawn_silent_client(SILENT_HOST, port).await;
    spawn_mute_client(MUTE_HOST, port).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("downtime.db")).unwrap());
    let engine = EnforcementEngine::new(
        store.clone(),
        Arc::new(dispatcher(port)),
        EnforcementConfig::default(),
    );

    let now = at(23, 30);
    engine.update_schedule(evening_window()).unwrap();
    for (name, host) in [
        ("ack", ACK_HOST),
        ("silent", SILENT_HOST),
        ("mute", MUTE_HOST),
        ("absent", ABSENT_HOST),
    ] {
        engine
            .record_heartbeat(ClientName::new(name), host, now.with_timezone(&Utc))
            .unwrap();
    }

    let report = engine.run_cycle(now).await;

    let CycleReport::Enforced {
        desired,
        broadcast,
        reconciled,
        state_persisted,
        ..
    } = &report
    else {
        panic!("expected enforced cycle");
    };
    assert_eq!(*desired, EnforcedStatus::Paused);
    assert!(*state_persisted);
    assert_eq!(broadcast.len(), 4);
    assert_eq!(reconciled.len(), 4);

    let outcome = |name: &str| {
        broadcast
            .iter()
            .find(|r| r.client_name.as_str() == name)
            .map(|r| r.outcome.clone())
            .unwrap()
    };
    assert_eq!(
        outcome("ack"),
        DispatchOutcome::Delivered {
            response: "ACK".into()
        }
    );
    assert_eq!(
        outcome("silent"),
        DispatchOutcome::Timeout {
            phase: TimeoutPhase::Read
        }
    );
    assert_eq!(
        outcome("mute"),
        DispatchOutcome::Delivered {
            response: String::new()
        }
    );
    assert!(matches!(
        outcome("absent"),
        DispatchOutcome::ConnectFailed { .. }
    ));

    // Failures never roll back the decided status
    assert_eq!(
        store.load_state().unwrap(),
        Some(EnforcementState::scheduled(EnforcedStatus::Paused))
    );

    // Broadcast plus reconciliation
    assert_eq!(drain(&mut acks), vec!["pause", "pause"]);
}

#[tokio::test]
async fn test_manual_override_holds_until_resume() {
    let (port, mut acks) = ack_client_on_free_port().await;

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = EnforcementEngine::new(
        store.clone(),
        Arc::new(dispatcher(port)),
        EnforcementConfig::default(),
    );
    engine.update_schedule(evening_window()).unwrap();
    engine
        .record_heartbeat(ClientName::new("ack"), ACK_HOST, at(12, 0).with_timezone(&Utc))
        .unwrap();

    let report = engine
        .apply_manual_command(Command::Unpause, ManualTarget::All)
        .await
        .unwrap();
    assert!(report.results[0].is_delivered());
    assert_eq!(drain(&mut acks), vec!["unpause"]);

    // Inside the window, but the operator said unpause
    assert!(engine.run_cycle(at(23, 30)).await.is_suppressed());
    assert!(drain(&mut acks).is_empty());

    engine.clear_override().unwrap();
    let report = engine.run_cycle(at(23, 30)).await;
    assert!(!report.is_suppressed());
    assert_eq!(drain(&mut acks), vec!["pause"]);
    assert_eq!(
        store.load_state().unwrap(),
        Some(EnforcementState::scheduled(EnforcedStatus::Paused))
    );
}

#[tokio::test]
async fn test_dispatch_all_runs_clients_concurrently() {
    let scratch = TcpListener::bind((SILENT_HOST, 0)).await.unwrap();
    let port = scratch.local_addr().unwrap().port();
    drop(scratch);
    for host in [SILENT_HOST, "127.0.0.5", "127.0.0.6"] {
        spawn_silent_client(host, port).await;
    }

    let targets = vec![
        DispatchTarget::new("a", SILENT_HOST),
        DispatchTarget::new("b", "127.0.0.5"),
        DispatchTarget::new("c", "127.0.0.6"),
    ];

    let started = Instant::now();
    let results = dispatcher(port).dispatch_all(&targets, Command::Pause).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.outcome
        == DispatchOutcome::Timeout {
            phase: TimeoutPhase::Read
        }));
    // Sequential dispatch would take at least three read timeouts
    assert!(elapsed < Duration::from_millis(1100), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_json_store_with_legacy_documents() {
    let (port, mut acks) = ack_client_on_free_port().await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("schedule.json"),
        r#"{"disable_time": "21:00", "enable_time": "07:00"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("status.json"),
        r#"{"status": "unpaused", "manual": false}"#,
    )
    .unwrap();
    let seen = at(12, 0).timestamp();
    std::fs::write(
        dir.path().join("client_ip.json"),
        format!(
            r#"{{"kids-pc": {{"client_ip": "{}", "last_seen": {}}}}}"#,
            ACK_HOST, seen
        ),
    )
    .unwrap();

    let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let engine = EnforcementEngine::new(
        store.clone(),
        Arc::new(dispatcher(port)),
        EnforcementConfig::default(),
    );

    let report = engine.run_cycle(at(21, 15)).await;
    assert!(report.failures().is_empty());
    assert_eq!(drain(&mut acks), vec!["pause"]);

    let raw = std::fs::read_to_string(dir.path().join("status.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value, serde_json::json!({ "status": "paused", "manual": false }));
}
