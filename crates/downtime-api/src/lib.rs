//! Shared types for downtimed
//!
//! This crate defines the data exchanged between the engine, the store,
//! the dispatcher and the operator surface:
//! - Enforcement state (status + manual override)
//! - Client registry records
//! - Wire commands and per-client dispatch results

mod dispatch;
mod types;

pub use dispatch::*;
pub use types::*;
