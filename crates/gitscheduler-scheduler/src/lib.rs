//! `gitscheduler-scheduler`: durable one-shot jobs fired by in-process timers.
//!
//! # Overview
//!
//! Jobs live in a single JSON document (see [`store::JobStore`]) that is read
//! and rewritten whole on every mutation. Two front ends share it:
//!
//! | Type                          | Used by       | Timers |
//! |-------------------------------|---------------|--------|
//! | [`scheduler::Scheduler`]      | the CLI       | none   |
//! | [`engine::SchedulerEngine`]   | the daemon    | one tokio task per armed job |
//!
//! The engine is a single-writer actor: every mutation, including timer
//! fires and executor completions, is processed in order from one queue.
//! When a trigger fires the bound [`executor::ActionExecutor`] runs the job's
//! action; its outcome is written back to the store and appended to the
//! [`audit::AuditLog`].

pub mod audit;
pub mod engine;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod store;

pub use engine::{EngineOptions, SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use executor::{ActionExecutor, GitExecutor};
pub use scheduler::Scheduler;
