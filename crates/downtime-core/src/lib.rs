//! Enforcement engine for downtimed
//!
//! This crate decides and applies the downtime status:
//! - Scheduled enforcement cycle (broadcast, persist, reconcile)
//! - Manual override and its explicit release
//! - Schedule updates and client heartbeats
//! - Status snapshot for the presentation layer

mod engine;
mod report;

pub use engine::*;
pub use report::*;

use downtime_store::StoreError;
use downtime_util::ClientName;
use thiserror::Error;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown client: {0}")]
    UnknownClient(ClientName),

    #[error("Invalid client address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Client name must not be empty")]
    InvalidClientName,
}

pub type EngineResult<T> = Result<T, EngineError>;
