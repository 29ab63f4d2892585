//! downtimed - schedule-driven downtime enforcement
//!
//! Each invocation performs one operation and exits:
//! - `enforce`: one scheduled cycle, meant to be run by cron or a timer
//! - `heartbeat`: client registration
//! - `pause` / `unpause` / `resume` / `schedule`: operator controls
//! - `status`: read-only snapshot

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use downtime_api::{Command, DispatchResult, ManualTarget};
use downtime_config::{load_config_or_default, Settings, StoreBackend};
use downtime_core::{CycleReport, EnforcementEngine, StatusReport};
use downtime_dispatch::{TcpDispatcher, TcpDispatcherConfig};
use downtime_store::{JsonFileStore, SqliteStore, Store};
use downtime_util::{
    default_config_path, format_datetime_full, format_duration, is_mock_time_active, ClientName,
    ScheduleWindow, WallClock, DOWNTIME_DATA_DIR_ENV,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// downtimed - Pause networked clients during a daily downtime window
#[derive(Parser, Debug)]
#[command(name = "downtimed")]
#[command(about = "Pause networked clients during a daily downtime window", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/downtime/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set DOWNTIME_DATA_DIR env var)
    #[arg(short, long, env = DOWNTIME_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Storage backend override: sqlite or json
    #[arg(long)]
    store: Option<StoreBackend>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run one scheduled enforcement cycle
    Enforce,

    /// Register or refresh a client
    Heartbeat {
        /// Client name (unique key in the registry)
        #[arg(long)]
        name: String,

        /// Client IP address
        #[arg(long)]
        ip: String,
    },

    /// Pause clients now and hold them paused until `resume`
    Pause {
        /// Only this client (default: all registered clients)
        #[arg(long)]
        client: Option<String>,
    },

    /// Unpause clients now and hold them unpaused until `resume`
    Unpause {
        /// Only this client (default: all registered clients)
        #[arg(long)]
        client: Option<String>,
    },

    /// Release a manual override and return to the schedule
    Resume,

    /// Set the daily downtime window
    Schedule {
        /// Start of downtime, HH:MM
        #[arg(long)]
        disable: WallClock,

        /// End of downtime, HH:MM
        #[arg(long)]
        enable: WallClock,
    },

    /// Show state, schedule and clients
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn open_store(settings: &Settings, data_dir: &Path) -> Result<Arc<dyn Store>> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let retention = settings.service.audit_retention;
    let store: Arc<dyn Store> = match settings.service.store {
        StoreBackend::Sqlite => {
            let db_path = data_dir.join("downtime.db");
            let store = SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?
                .with_audit_retention(retention);
            info!(db_path = %db_path.display(), "Store initialized");
            Arc::new(store)
        }
        StoreBackend::Json => {
            let store = JsonFileStore::open(data_dir)
                .with_context(|| format!("Failed to open JSON store in {:?}", data_dir))?
                .with_audit_retention(retention);
            info!(dir = %data_dir.display(), "Store initialized");
            Arc::new(store)
        }
    };

    if !store.is_healthy() {
        anyhow::bail!(
            "{} store in {:?} failed its health check",
            settings.service.store,
            data_dir
        );
    }

    Ok(store)
}

fn build_engine(settings: &Settings, store: Arc<dyn Store>) -> EnforcementEngine {
    let dispatch = &settings.dispatch;
    let dispatcher = TcpDispatcher::new(TcpDispatcherConfig {
        port: dispatch.port,
        connect_timeout: dispatch.connect_timeout,
        read_timeout: dispatch.read_timeout,
        max_response_bytes: dispatch.max_response_bytes,
    });

    EnforcementEngine::new(store, Arc::new(dispatcher), settings.enforcement.clone())
}

fn manual_target(client: Option<String>) -> ManualTarget {
    match client {
        Some(name) => ManualTarget::Client {
            name: ClientName::new(name),
        },
        None => ManualTarget::All,
    }
}

fn print_results(results: &[DispatchResult]) {
    if results.is_empty() {
        println!("No registered clients.");
    }
    for result in results {
        println!(
            "  {} ({}): {} -> {}",
            result.client_name, result.address, result.command, result.outcome
        );
    }
}

fn print_cycle(report: &CycleReport) {
    match report {
        CycleReport::Suppressed { state, .. } => {
            println!("Manual override active ({}), schedule not enforced.", state.status);
        }
        CycleReport::Enforced {
            desired,
            broadcast,
            reconciled,
            state_persisted,
            override_preempted,
            ..
        } => {
            println!("Enforced status: {}", desired);
            print_results(broadcast);
            if !reconciled.is_empty() {
                println!("Reconciled recently active clients:");
                print_results(reconciled);
            }
            if *override_preempted {
                println!("A manual override was set during this cycle; state left unchanged.");
            } else if !state_persisted {
                println!("Warning: enforcement state could not be saved.");
            }
        }
    }
}

fn print_status(status: &StatusReport) {
    let mode = if status.state.manual_override {
        "manual override"
    } else {
        "schedule"
    };
    println!("Now:              {}", format_datetime_full(&status.now));
    println!("Status:           {} ({})", status.state.status, mode);
    println!("Schedule:         {}", status.schedule);
    println!("Schedule says:    {}", status.scheduled_status);
    println!();

    if status.clients.is_empty() {
        println!("No registered clients.");
    } else {
        println!("Clients:");
        for client in &status.clients {
            println!(
                "  {} {:<16} last seen {} ({} ago){}",
                client.record.name,
                client.record.address,
                format_datetime_full(&client.record.last_seen.with_timezone(&Local)),
                format_duration(client.age),
                if client.recently_active { " [active]" } else { "" },
            );
        }
    }

    if !status.recent_events.is_empty() {
        println!();
        println!("Recent activity:");
        for event in &status.recent_events {
            let detail = serde_json::to_string(&event.event).unwrap_or_default();
            println!("  {} {}", format_datetime_full(&event.timestamp), detail);
        }
    }
}

/// Trigger entry point. Never fails: problems are logged and the next
/// trigger tries again.
async fn enforce(settings: &Settings, data_dir: &Path, now: DateTime<Local>) -> Result<()> {
    let store = match open_store(settings, data_dir) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Store unavailable, skipping enforcement");
            return Ok(());
        }
    };

    let engine = build_engine(settings, store);
    let report = engine.run_cycle(now).await;
    print_cycle(&report);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut settings = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(backend) = args.store {
        settings.service.store = backend;
    }
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| settings.service.data_dir.clone());

    let now = downtime_util::now();

    let engine = || -> Result<EnforcementEngine> {
        Ok(build_engine(&settings, open_store(&settings, &data_dir)?))
    };

    match args.command {
        Cmd::Enforce => enforce(&settings, &data_dir, now).await?,
        Cmd::Heartbeat { name, ip } => {
            let record = engine()?
                .record_heartbeat(ClientName::new(name), &ip, now.with_timezone(&Utc))
                .context("Heartbeat rejected")?;
            println!("Registered {} at {}", record.name, record.address);
        }
        Cmd::Pause { client } => {
            let report = engine()?
                .apply_manual_command(Command::Pause, manual_target(client))
                .await?;
            println!("Pause sent to {}:", report.target);
            print_results(&report.results);
        }
        Cmd::Unpause { client } => {
            let report = engine()?
                .apply_manual_command(Command::Unpause, manual_target(client))
                .await?;
            println!("Unpause sent to {}:", report.target);
            print_results(&report.results);
            if !report.state.manual_override {
                println!("Schedule enforcement resumed.");
            }
        }
        Cmd::Resume => {
            let state = engine()?.clear_override()?;
            println!(
                "Manual override cleared (status {}); the next cycle applies the schedule.",
                state.status
            );
        }
        Cmd::Schedule { disable, enable } => {
            let schedule = ScheduleWindow::new(disable, enable);
            engine()?.update_schedule(schedule)?;
            println!("Downtime window set to {}", schedule);
        }
        Cmd::Status { json } => {
            let status = engine()?.status(now);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status).context("Failed to encode status")?
                );
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = ?args.command,
        "downtimed starting"
    );

    if is_mock_time_active() {
        warn!(
            env = downtime_util::MOCK_TIME_ENV_VAR,
            "Mock time is active, schedule decisions use the overridden clock"
        );
    }

    run(args).await
}
