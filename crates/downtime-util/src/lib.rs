//! Shared utilities for downtimed
//!
//! This crate provides:
//! - Wall-clock time of day and the daily downtime window
//! - A mock-time aware `now()` for development
//! - ID types (ClientName, CycleId)
//! - Error types for time parsing
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod schedule;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use schedule::*;
pub use time::*;
