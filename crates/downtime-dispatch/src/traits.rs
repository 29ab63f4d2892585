//! Dispatcher trait definition

use async_trait::async_trait;
use downtime_api::{Command, DispatchResult, DispatchTarget};

/// Delivers commands to clients
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send one command to one client. Always produces a result.
    async fn dispatch(&self, target: &DispatchTarget, command: Command) -> DispatchResult;

    /// Send the same command to every target, one result per target in
    /// input order. Each attempt is independent of the others.
    async fn dispatch_all(
        &self,
        targets: &[DispatchTarget],
        command: Command,
    ) -> Vec<DispatchResult> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            results.push(self.dispatch(target, command).await);
        }
        results
    }
}
