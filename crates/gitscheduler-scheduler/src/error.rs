use chrono::{DateTime, Utc};
use gitscheduler_core::{CoreError, JobId};
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed input, e.g. a time expression.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The requested instant is not strictly after now.
    #[error("Schedule time {at} is not in the future")]
    PastSchedule { at: DateTime<Utc> },

    /// No job with the given ID exists in the store.
    #[error("Job #{id} not found")]
    JobNotFound { id: JobId },

    /// The job exists but its state does not allow `operation`.
    #[error("Cannot {operation} job #{id}: {reason}")]
    InvalidState {
        id: JobId,
        operation: &'static str,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The engine task has exited and no longer accepts commands.
    #[error("Scheduler engine is not running")]
    EngineStopped,
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Core(e) => e.code(),
            SchedulerError::PastSchedule { .. } => "PAST_SCHEDULE",
            SchedulerError::JobNotFound { .. } => "NOT_FOUND",
            SchedulerError::InvalidState { .. } => "INVALID_STATE",
            SchedulerError::Io(_) => "IO_ERROR",
            SchedulerError::Serialization(_) => "SERIALIZATION_ERROR",
            SchedulerError::EngineStopped => "ENGINE_STOPPED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
