//! `gitscheduler-core`: types shared by the scheduler, the daemon and the CLI.
//!
//! Nothing in here touches a timer or spawns a process: this crate holds the
//! persisted [`types::Job`] record, the layered configuration, the error
//! taxonomy for malformed input, and the human time-expression parser.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::{GitSchedulerConfig, Paths};
pub use error::{CoreError, Result};
pub use types::{ActionOutcome, Job, JobAction, JobId, JobStatus};
