use std::future::Future;
use std::sync::Arc;

use gitscheduler_core::GitSchedulerConfig;
use gitscheduler_scheduler::{
    ActionExecutor, EngineOptions, GitExecutor, Scheduler, SchedulerEngine,
};
use tracing::{info, warn};

use crate::error::{DaemonError, Result};
use crate::pidfile::PidFile;
use crate::probe::{OsProbe, ProcessProbe};

/// Run the daemon with the git executor until SIGINT or SIGTERM.
pub async fn run_daemon(config: &GitSchedulerConfig) -> Result<()> {
    // Listen before the pid file exists, so an early SIGTERM still cleans up.
    let shutdown = shutdown_signal()?;
    let executor = Arc::new(GitExecutor::from_config(&config.git));
    run_until(config, executor, shutdown).await
}

/// Daemon main loop, stopping when `shutdown` resolves.
///
/// Claims the pid file, starts the engine and arms every pending future job.
/// On the way out the engine is drained and the pid file released, also when
/// arming failed.
pub async fn run_until<F>(
    config: &GitSchedulerConfig,
    executor: Arc<dyn ActionExecutor>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let paths = config.paths();
    paths.ensure_root()?;

    let pid_file = PidFile::new(&paths.pid);
    let own_pid = std::process::id();
    if let Some(pid) = pid_file.read() {
        if pid != own_pid && OsProbe.is_alive(pid) {
            return Err(DaemonError::AlreadyRunning { pid });
        }
    }

    let scheduler = Scheduler::new(&paths);
    let jobs = scheduler.list_jobs();
    let pending = jobs.iter().filter(|j| j.is_pending()).count();
    info!(jobs = jobs.len(), pending, store = %paths.store.display(), "job store loaded");

    pid_file.record_self()?;
    info!(pid = own_pid, root = %paths.root.display(), "daemon started");

    let (engine, handle) = SchedulerEngine::new(
        scheduler,
        executor,
        EngineOptions::from_config(&config.daemon),
    );
    let engine_task = tokio::spawn(engine.run());

    let result = match handle.arm_pending_triggers().await {
        Ok(armed) => {
            info!(armed, "waiting for triggers");
            shutdown.await;
            info!("shutdown requested");
            Ok(())
        }
        Err(e) => Err(DaemonError::from(e)),
    };

    if let Err(e) = handle.shutdown().await {
        warn!("engine already stopped: {e}");
    }
    if let Err(e) = engine_task.await {
        warn!("engine task ended abnormally: {e}");
    }

    match pid_file.release() {
        Ok(true) => {}
        Ok(false) => warn!(path = %pid_file.path().display(), "pid file no longer ours; left in place"),
        Err(e) => warn!(path = %pid_file.path().display(), "failed to remove pid file: {e}"),
    }
    info!("daemon stopped");
    result
}

/// Install the stop-signal listeners now and return a future that resolves
/// on the first SIGINT or SIGTERM (Ctrl+C elsewhere).
///
/// Signals that arrive between this call and the first poll are not lost.
/// Must be called from within a tokio runtime.
#[cfg(unix)]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    })
}

#[cfg(windows)]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    Ok(async move {
        ctrl_c.recv().await;
    })
}
