//! One function per subcommand. Each builds what it needs from the config
//! and prints its own result.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use gitscheduler_core::time::parse_when;
use gitscheduler_core::{CoreError, GitSchedulerConfig, Job, JobAction, JobId, JobStatus};
use gitscheduler_daemon::{run_daemon, DaemonError, DaemonManager, LaunchOutcome};
use gitscheduler_scheduler::executor::{current_branch, is_work_tree};
use gitscheduler_scheduler::{Scheduler, SchedulerError};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ScheduleArgs {
    pub message: String,
    pub time: String,
    pub branch: Option<String>,
    pub path: PathBuf,
    pub start_daemon: bool,
}

/// Short code for errors raised by the library crates.
pub fn error_code(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(e) = err.downcast_ref::<SchedulerError>() {
        return Some(e.code());
    }
    if let Some(e) = err.downcast_ref::<CoreError>() {
        return Some(e.code());
    }
    err.downcast_ref::<DaemonError>().map(DaemonError::code)
}

fn manager(config: &GitSchedulerConfig) -> DaemonManager {
    DaemonManager::new(config.paths(), &config.daemon)
}

pub async fn schedule(config: &GitSchedulerConfig, args: ScheduleArgs) -> Result<()> {
    let job = create_scheduled_job(config, &args).await?;

    let JobAction::GitPush { message, branch } = &job.parameters;
    println!("✓ Scheduled commit #{}", job.id);
    println!("  Message: {message}");
    println!("  Branch: {branch}");
    println!("  Repository: {}", job.target.display());
    println!(
        "  Time: {}",
        job.scheduled_at.with_timezone(&Local).format(DISPLAY_FORMAT)
    );

    if !args.start_daemon {
        println!("\nRun 'gitscheduler start' to start the scheduler");
        return Ok(());
    }

    // The job is stored either way; a launch problem is reported, not fatal.
    match manager(config).launch_background().await {
        Ok(outcome) => print_launch(outcome),
        Err(e) => eprintln!("⚠ Could not start the daemon: {e}"),
    }
    Ok(())
}

/// Validate the request and persist it. Nothing is written unless the time
/// parses to the future and the path is a git work tree.
async fn create_scheduled_job(config: &GitSchedulerConfig, args: &ScheduleArgs) -> Result<Job> {
    let now = Utc::now();
    let at = parse_when(&args.time, now)?;
    if at <= now {
        return Err(SchedulerError::PastSchedule { at }.into());
    }

    let target = args
        .path
        .canonicalize()
        .with_context(|| format!("Repository path not found: {}", args.path.display()))?;
    if !is_work_tree(&target).await {
        bail!("Not a git repository: {}", target.display());
    }

    let branch = match &args.branch {
        Some(branch) => branch.clone(),
        None => current_branch(&target)
            .await
            .unwrap_or_else(|| config.git.default_branch.clone()),
    };

    let action = JobAction::GitPush {
        message: args.message.clone(),
        branch,
    };
    let job = Scheduler::new(&config.paths()).create_job(target, action, at)?;
    Ok(job)
}

fn print_launch(outcome: LaunchOutcome) {
    match outcome {
        LaunchOutcome::Started { pid } => println!("✓ Daemon started (pid {pid})"),
        LaunchOutcome::AlreadyRunning { pid } => {
            println!("✓ Daemon already running (pid {pid})")
        }
    }
}

pub fn list(config: &GitSchedulerConfig) -> Result<()> {
    let jobs = Scheduler::new(&config.paths()).list_jobs();
    if jobs.is_empty() {
        println!("No scheduled commits");
        return Ok(());
    }
    for job in &jobs {
        println!("{}", format_job(job));
    }
    Ok(())
}

fn format_job(job: &Job) -> String {
    let JobAction::GitPush { message, branch } = &job.parameters;
    let marker = match job.status {
        JobStatus::Pending => "⏳",
        JobStatus::Completed => "✓",
        JobStatus::NoChanges => "⚠",
        JobStatus::Failed => "✗",
    };
    let mut out = format!(
        "{marker} #{} [{}] {}  {branch}  {message}\n    {}",
        job.id,
        job.status.to_string().to_uppercase(),
        job.scheduled_at.with_timezone(&Local).format(DISPLAY_FORMAT),
        job.target.display(),
    );
    if let Some(error) = &job.error {
        out.push_str(&format!("\n    error: {error}"));
    }
    out
}

pub fn cancel(config: &GitSchedulerConfig, id: u64) -> Result<()> {
    let job = Scheduler::new(&config.paths()).cancel_job(JobId(id))?;
    println!("✓ Cancelled scheduled commit #{}", job.id);
    Ok(())
}

pub fn clear(config: &GitSchedulerConfig) -> Result<()> {
    let removed = Scheduler::new(&config.paths()).clear_completed()?;
    println!("✓ Removed {removed} completed/failed schedules");
    Ok(())
}

pub async fn daemon(config: &GitSchedulerConfig, background: bool) -> Result<()> {
    let paths = config.paths();
    if let Some(pid) = manager(config).running_pid() {
        if pid != std::process::id() {
            return Err(DaemonError::AlreadyRunning { pid }.into());
        }
    }

    if !background {
        let pending = Scheduler::new(&paths)
            .list_jobs()
            .iter()
            .filter(|j| j.is_pending())
            .count();
        println!("✓ gitscheduler daemon started");
        println!("  Monitoring {pending} pending schedules");
        println!("  Log file: {}", paths.log.display());
        println!("\nPress Ctrl+C to stop\n");
    }

    run_daemon(config).await?;

    if !background {
        println!("Scheduler stopped");
    }
    Ok(())
}

pub async fn start(config: &GitSchedulerConfig) -> Result<()> {
    let manager = manager(config);
    let outcome = manager.launch_background().await?;
    print_launch(outcome);
    if matches!(outcome, LaunchOutcome::Started { .. }) && !manager.is_running() {
        println!(
            "⚠ The daemon has not reported in yet; check {}",
            config.paths().daemon_out.display()
        );
    }
    Ok(())
}

pub fn status(config: &GitSchedulerConfig) -> Result<()> {
    match manager(config).running_pid() {
        Some(pid) => println!("✓ Daemon is running (pid {pid})"),
        None => {
            println!("⚠ Daemon is not running");
            println!("Run 'gitscheduler start' to start it");
        }
    }
    Ok(())
}

pub fn logs(config: &GitSchedulerConfig) -> Result<()> {
    let scheduler = Scheduler::new(&config.paths());
    let content = scheduler
        .audit()
        .read()
        .with_context(|| format!("cannot read {}", scheduler.audit().path().display()))?;
    match content {
        Some(text) => print!("{text}"),
        None => println!("No logs yet"),
    }
    Ok(())
}
