//! `gitscheduler-daemon`: lifecycle of the single background scheduler process.
//!
//! - [`pidfile::PidFile`] records which process owns the scheduler.
//! - [`probe::ProcessProbe`] answers whether that process is still alive.
//! - [`manager::DaemonManager`] detects a running daemon and launches a
//!   detached one when there is none.
//! - [`runner::run_daemon`] is the daemon's own main loop.

pub mod error;
pub mod manager;
pub mod pidfile;
pub mod probe;
pub mod runner;

pub use error::{DaemonError, Result};
pub use manager::{DaemonManager, LaunchOutcome};
pub use pidfile::PidFile;
pub use probe::{OsProbe, ProcessProbe};
pub use runner::{run_daemon, run_until, shutdown_signal};
