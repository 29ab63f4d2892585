//! Command dispatcher for downtimed
//!
//! This crate delivers `pause`/`unpause` to clients:
//! - `Dispatcher` trait, the seam the engine depends on
//! - `TcpDispatcher`, one short-lived connection per command
//! - `MockDispatcher` for tests
//!
//! Network failures are reported as `DispatchOutcome` values, never as
//! errors, so one unreachable client cannot affect another.

mod mock;
mod tcp;
mod traits;

pub use mock::*;
pub use tcp::*;
pub use traits::*;
