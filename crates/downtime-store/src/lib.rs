//! Persistence layer for downtimed
//!
//! Provides:
//! - Schedule and enforcement state records
//! - Client registry fed by heartbeats
//! - Audit log (append-only)
//! - SQLite and JSON-document backends behind one `Store` trait

mod audit;
mod json;
mod sqlite;
mod traits;

pub use audit::*;
pub use json::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Audit events a store keeps unless told otherwise
pub const DEFAULT_AUDIT_RETENTION: usize = 5000;
