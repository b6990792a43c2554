use gitscheduler_scheduler::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another live process already owns the pid file.
    #[error("Daemon already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    /// The detached daemon process could not be started.
    #[error("Failed to launch daemon: {0}")]
    Spawn(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl DaemonError {
    pub fn code(&self) -> &'static str {
        match self {
            DaemonError::Io(_) => "IO_ERROR",
            DaemonError::AlreadyRunning { .. } => "ALREADY_RUNNING",
            DaemonError::Spawn(_) => "SPAWN_FAILED",
            DaemonError::Scheduler(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
