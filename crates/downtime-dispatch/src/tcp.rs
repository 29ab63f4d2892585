//! TCP dispatcher: one connection per command

use async_trait::async_trait;
use downtime_api::{Command, DispatchOutcome, DispatchResult, DispatchTarget, TimeoutPhase};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::Dispatcher;

/// Connection parameters shared by every client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpDispatcherConfig {
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_response_bytes: usize,
}

impl Default for TcpDispatcherConfig {
    fn default() -> Self {
        Self {
            port: 65432,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            max_response_bytes: 1024,
        }
    }
}

/// Sends the command token over a fresh TCP connection, reads a single
/// response and closes.
#[derive(Debug, Clone, Default)]
pub struct TcpDispatcher {
    config: TcpDispatcherConfig,
}

impl TcpDispatcher {
    pub fn new(config: TcpDispatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpDispatcherConfig {
        &self.config
    }

    async fn exchange(&self, address: &str, command: Command) -> DispatchOutcome {
        let connect = TcpStream::connect((address, self.config.port));
        let mut stream = match timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return DispatchOutcome::ConnectFailed {
                    reason: e.to_string(),
                };
            }
            Err(_) => {
                return DispatchOutcome::Timeout {
                    phase: TimeoutPhase::Connect,
                };
            }
        };

        if let Err(e) = stream.write_all(command.wire_token().as_bytes()).await {
            return DispatchOutcome::ConnectFailed {
                reason: format!("write failed: {}", e),
            };
        }

        let mut buf = vec![0u8; self.config.max_response_bytes];
        match timeout(self.config.read_timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) => DispatchOutcome::Delivered {
                response: String::from_utf8_lossy(&buf[..n]).trim().to_string(),
            },
            Ok(Err(e)) => {
                // The command already went out; a broken read only loses the ack
                debug!(address, error = %e, "Read after command failed");
                DispatchOutcome::Delivered {
                    response: String::new(),
                }
            }
            Err(_) => DispatchOutcome::Timeout {
                phase: TimeoutPhase::Read,
            },
        }
    }
}

fn log_result(result: &DispatchResult) {
    match &result.outcome {
        DispatchOutcome::Delivered { .. } => info!(
            client = %result.client_name,
            address = %result.address,
            command = %result.command,
            outcome = %result.outcome,
            "Command delivered"
        ),
        _ => warn!(
            client = %result.client_name,
            address = %result.address,
            command = %result.command,
            outcome = %result.outcome,
            "Command not delivered"
        ),
    }
}

#[async_trait]
impl Dispatcher for TcpDispatcher {
    async fn dispatch(&self, target: &DispatchTarget, command: Command) -> DispatchResult {
        debug!(
            client = %target.client_name,
            address = %target.address,
            port = self.config.port,
            command = %command,
            "Dispatching command"
        );

        let outcome = self.exchange(&target.address, command).await;
        let result = DispatchResult::new(target, command, outcome);
        log_result(&result);
        result
    }

    /// Dispatches to all targets concurrently, so a pass is bounded by one
    /// connect plus one read timeout however many clients there are.
    async fn dispatch_all(
        &self,
        targets: &[DispatchTarget],
        command: Command,
    ) -> Vec<DispatchResult> {
        let mut results: Vec<DispatchResult> = targets
            .iter()
            .map(|target| {
                DispatchResult::new(
                    target,
                    command,
                    DispatchOutcome::ConnectFailed {
                        reason: "dispatch task did not complete".into(),
                    },
                )
            })
            .collect();

        let mut tasks = JoinSet::new();
        for (index, target) in targets.iter().cloned().enumerate() {
            let dispatcher = self.clone();
            tasks.spawn(async move { (index, dispatcher.dispatch(&target, command).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = result,
                Err(e) => warn!(error = %e, "Dispatch task failed"),
            }
        }

        results
    }
}
