//! Application-level orchestration.
//!
//! This module owns the operator session (menu dispatch) and the OS shutdown hook. Both drive
//! the same shared supervisor; the supervisor serializes their stop requests.

mod controller;
mod shutdown;

pub(crate) use controller::{run_controller, SessionEnd};
pub(crate) use shutdown::spawn_shutdown_hook;
