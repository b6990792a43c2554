use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gitscheduler_core::{ActionOutcome, GitSchedulerConfig, JobAction, JobStatus};
use gitscheduler_daemon::{run_until, DaemonError, DaemonManager, PidFile};
use gitscheduler_scheduler::{ActionExecutor, Scheduler};
use tokio::sync::oneshot;

struct AlwaysCompletes;

#[async_trait]
impl ActionExecutor for AlwaysCompletes {
    fn name(&self) -> &str {
        "always-completes"
    }
    async fn execute(&self, _target: &Path, _action: &JobAction) -> ActionOutcome {
        ActionOutcome::Completed
    }
}

fn config(root: &Path) -> GitSchedulerConfig {
    GitSchedulerConfig {
        root: root.to_path_buf(),
        ..GitSchedulerConfig::default()
    }
}

fn action() -> JobAction {
    JobAction::GitPush {
        message: "nightly".to_string(),
        branch: "main".to_string(),
    }
}

#[tokio::test]
async fn daemon_fires_stored_jobs_and_releases_its_pid_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let paths = config.paths();

    let scheduler = Scheduler::new(&paths);
    let job = scheduler
        .create_job(
            PathBuf::from("/repo"),
            action(),
            Utc::now() + chrono::Duration::seconds(1),
        )
        .unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let daemon_config = config.clone();
    let daemon = tokio::spawn(async move {
        run_until(&daemon_config, Arc::new(AlwaysCompletes), async move {
            let _ = stop_rx.await;
        })
        .await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let manager = DaemonManager::new(paths.clone(), &config.daemon);
    assert_eq!(manager.running_pid(), Some(std::process::id()));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(scheduler.get_job(job.id).unwrap().status, JobStatus::Completed);

    stop_tx.send(()).unwrap();
    daemon.await.unwrap().unwrap();

    assert!(!paths.pid.exists());
    assert!(!manager.is_running());

    let log = scheduler.audit().read().unwrap().unwrap();
    assert!(log.contains(&format!("#{} COMPLETED", job.id)));
}

#[tokio::test]
async fn past_due_jobs_stay_pending_across_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let scheduler = Scheduler::new(&config.paths());

    let now = Utc::now();
    let job = scheduler
        .create_job_at(
            PathBuf::from("/repo"),
            action(),
            now + chrono::Duration::milliseconds(50),
            now,
        )
        .unwrap();
    // The daemon was down when the job came due.
    tokio::time::sleep(Duration::from_millis(100)).await;

    run_until(&config, Arc::new(AlwaysCompletes), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await
    .unwrap();

    assert_eq!(scheduler.get_job(job.id).unwrap().status, JobStatus::Pending);
}

#[cfg(unix)]
#[tokio::test]
async fn refuses_to_start_beside_a_live_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let mut other = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    let pid_file = PidFile::new(&config.paths().pid);
    pid_file.record(other.id()).unwrap();

    let err = run_until(&config, Arc::new(AlwaysCompletes), async {})
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::AlreadyRunning { pid } if pid == other.id()));
    assert_eq!(pid_file.read(), Some(other.id()));

    other.kill().unwrap();
    other.wait().unwrap();

    // With the owner gone the stale pid file is taken over.
    run_until(&config, Arc::new(AlwaysCompletes), async {})
        .await
        .unwrap();
    assert_eq!(pid_file.read(), None);
}
