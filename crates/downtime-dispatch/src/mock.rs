//! Mock dispatcher for testing

use async_trait::async_trait;
use downtime_api::{Command, DispatchOutcome, DispatchResult, DispatchTarget};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::Dispatcher;

/// One recorded dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub target: DispatchTarget,
    pub command: Command,
}

/// Dispatcher with scripted outcomes per address.
///
/// One-shot outcomes queued with `push_outcome` are used first, then the
/// standing outcome from `set_outcome`. Addresses with neither are
/// delivered with an `ACK` response.
#[derive(Clone, Default)]
pub struct MockDispatcher {
    outcomes: Arc<Mutex<HashMap<String, DispatchOutcome>>>,
    queued: Arc<Mutex<HashMap<String, VecDeque<DispatchOutcome>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for every dispatch to `address`
    pub fn set_outcome(&self, address: impl Into<String>, outcome: DispatchOutcome) {
        self.outcomes.lock().unwrap().insert(address.into(), outcome);
    }

    /// Queue an outcome for the next dispatch to `address` only
    pub fn push_outcome(&self, address: impl Into<String>, outcome: DispatchOutcome) {
        self.queued
            .lock()
            .unwrap()
            .entry(address.into())
            .or_default()
            .push_back(outcome);
    }

    /// Go back to the default outcome for `address`
    pub fn clear_outcome(&self, address: &str) {
        self.outcomes.lock().unwrap().remove(address);
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Addresses that received `command`, in call order
    pub fn addresses_sent(&self, command: Command) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.command == command)
            .map(|c| c.target.address.clone())
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn dispatch(&self, target: &DispatchTarget, command: Command) -> DispatchResult {
        self.calls.lock().unwrap().push(MockCall {
            target: target.clone(),
            command,
        });

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&target.address)
            .and_then(|q| q.pop_front());

        let outcome = queued
            .or_else(|| self.outcomes.lock().unwrap().get(&target.address).cloned())
            .unwrap_or_else(|| DispatchOutcome::Delivered {
                response: "ACK".into(),
            });

        DispatchResult::new(target, command, outcome)
    }
}
