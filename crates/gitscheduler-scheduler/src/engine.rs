use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gitscheduler_core::config::DaemonConfig;
use gitscheduler_core::{ActionOutcome, Job, JobAction, JobId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    executor::ActionExecutor,
    scheduler::Scheduler,
};

/// Upper bound on how long shutdown waits for in-flight executions.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Re-read the store on this cadence to arm jobs written by other
    /// processes and disarm jobs they removed. `None` arms only on request.
    pub rescan_interval: Option<Duration>,
}

impl EngineOptions {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            rescan_interval: (config.rescan_interval_secs > 0)
                .then(|| Duration::from_secs(config.rescan_interval_secs)),
        }
    }
}

/// Requests sent by [`SchedulerHandle`].
enum Command {
    Create {
        target: PathBuf,
        parameters: JobAction,
        scheduled_at: DateTime<Utc>,
        reply: oneshot::Sender<Result<Job>>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<Result<Job>>,
    },
    ClearCompleted {
        reply: oneshot::Sender<Result<usize>>,
    },
    List {
        reply: oneshot::Sender<Vec<Job>>,
    },
    ArmPending {
        reply: oneshot::Sender<usize>,
    },
    Run {
        id: JobId,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Produced by the engine's own timer and executor tasks.
enum Event {
    /// A trigger armed for the given instant elapsed.
    Fire(JobId, DateTime<Utc>),
    Finished(JobId, ActionOutcome),
}

/// A pending timer and the `scheduled_at` it was armed for.
struct Armed {
    at: DateTime<Utc>,
    timer: JoinHandle<()>,
}

/// Cloneable client for a running [`SchedulerEngine`].
///
/// All methods fail with `EngineStopped` once the engine task has exited.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SchedulerError::EngineStopped)?;
        rx.await.map_err(|_| SchedulerError::EngineStopped)
    }

    /// Persist a new job and arm its trigger.
    pub async fn create_job(
        &self,
        target: PathBuf,
        parameters: JobAction,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Job> {
        self.request(|reply| Command::Create {
            target,
            parameters,
            scheduled_at,
            reply,
        })
        .await?
    }

    /// Disarm and remove a pending job that has not fired yet.
    pub async fn cancel_job(&self, id: JobId) -> Result<Job> {
        self.request(|reply| Command::Cancel { id, reply }).await?
    }

    pub async fn clear_completed(&self) -> Result<usize> {
        self.request(|reply| Command::ClearCompleted { reply }).await?
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.request(|reply| Command::List { reply }).await
    }

    /// Arm every pending job whose time is still ahead. Returns how many
    /// triggers were newly armed; past-due jobs are left pending.
    pub async fn arm_pending_triggers(&self) -> Result<usize> {
        self.request(|reply| Command::ArmPending { reply }).await
    }

    /// Fire a job now, as if its trigger had elapsed.
    pub async fn run_job(&self, id: JobId) -> Result<()> {
        self.tx
            .send(Command::Run { id })
            .await
            .map_err(|_| SchedulerError::EngineStopped)
    }

    /// Disarm all triggers, wait for running jobs to record their outcome,
    /// then stop the engine.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

/// Single-writer scheduler actor.
///
/// Owns the [`Scheduler`], the armed timers and the set of jobs whose
/// executor is running. Commands, timer fires, executor completions and
/// rescans are handled one at a time on the engine task, so every
/// load → mutate → save on the store runs without interleaving.
pub struct SchedulerEngine {
    scheduler: Scheduler,
    executor: Arc<dyn ActionExecutor>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedReceiver<Event>,
    events_tx: mpsc::UnboundedSender<Event>,
    armed: HashMap<JobId, Armed>,
    running: HashSet<JobId>,
    options: EngineOptions,
}

impl SchedulerEngine {
    pub fn new(
        scheduler: Scheduler,
        executor: Arc<dyn ActionExecutor>,
        options: EngineOptions,
    ) -> (Self, SchedulerHandle) {
        let (tx, commands) = mpsc::channel(64);
        let (events_tx, events) = mpsc::unbounded_channel();
        let engine = Self {
            scheduler,
            executor,
            commands,
            events,
            events_tx,
            armed: HashMap::new(),
            running: HashSet::new(),
            options,
        };
        (engine, SchedulerHandle { tx })
    }

    /// Main event loop. Runs until `shutdown` is requested or every handle is dropped.
    pub async fn run(mut self) {
        info!(executor = self.executor.name(), "scheduler engine started");

        // First rescan one period in; startup arming is requested explicitly.
        let mut rescan = self.options.rescan_interval.map(|every| {
            let start = tokio::time::Instant::now() + every;
            let mut interval = tokio::time::interval_at(start, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let mut shutdown_reply = None;
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                Some(event) = self.events.recv() => self.on_event(event),
                _ = tick(&mut rescan) => {
                    self.sync_with_store(true);
                }
            }
        }

        self.stop().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
        info!("scheduler engine stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Create {
                target,
                parameters,
                scheduled_at,
                reply,
            } => {
                let result = self.scheduler.create_job(target, parameters, scheduled_at);
                if let Ok(job) = &result {
                    self.arm(job, Utc::now());
                }
                let _ = reply.send(result);
            }
            Command::Cancel { id, reply } => {
                let result = if self.running.contains(&id) {
                    Err(SchedulerError::InvalidState {
                        id,
                        operation: "cancel",
                        reason: "it is already running".to_string(),
                    })
                } else {
                    self.scheduler.cancel_job(id)
                };
                if result.is_ok() {
                    self.disarm(id);
                }
                let _ = reply.send(result);
            }
            Command::ClearCompleted { reply } => {
                let _ = reply.send(self.scheduler.clear_completed());
            }
            Command::List { reply } => {
                let _ = reply.send(self.scheduler.list_jobs());
            }
            Command::ArmPending { reply } => {
                let _ = reply.send(self.sync_with_store(false));
            }
            Command::Run { id } => {
                self.disarm(id);
                self.start_run(id, None);
            }
            // Intercepted by the run loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Fire(id, at) => {
                // A timer that was replaced or aborted may still have sent.
                match self.armed.get(&id) {
                    Some(armed) if armed.at == at => {
                        self.armed.remove(&id);
                        self.start_run(id, Some(at));
                    }
                    _ => debug!(job_id = %id, %at, "superseded trigger ignored"),
                }
            }
            Event::Finished(id, outcome) => self.finish_run(id, outcome),
        }
    }

    /// Arm a one-shot trigger for `job` if it is pending, ahead of `now`, and
    /// not running. A trigger already armed for another instant is replaced;
    /// one armed for the same instant is kept and `false` is returned.
    fn arm(&mut self, job: &Job, now: DateTime<Utc>) -> bool {
        if !job.is_pending() || job.scheduled_at <= now || self.running.contains(&job.id) {
            return false;
        }
        match self.armed.get(&job.id) {
            Some(armed) if armed.at == job.scheduled_at => return false,
            Some(armed) => {
                info!(
                    job_id = %job.id,
                    from = %armed.at,
                    to = %job.scheduled_at,
                    "job rescheduled"
                );
                self.disarm(job.id);
            }
            None => {}
        }

        let delay = (job.scheduled_at - now).to_std().unwrap_or_default();
        let id = job.id;
        let at = job.scheduled_at;
        let events = self.events_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::Fire(id, at));
        });
        self.armed.insert(id, Armed { at, timer });

        debug!(job_id = %id, %at, "trigger armed");
        true
    }

    fn disarm(&mut self, id: JobId) {
        if let Some(armed) = self.armed.remove(&id) {
            armed.timer.abort();
            debug!(job_id = %id, "trigger disarmed");
        }
    }

    /// Reconcile armed triggers with the store: arm pending future jobs that
    /// are not armed yet and drop triggers whose job is gone or finished.
    /// Returns how many triggers were newly armed.
    fn sync_with_store(&mut self, quiet: bool) -> usize {
        let jobs = self.scheduler.list_jobs();
        let now = Utc::now();

        let pending: HashSet<JobId> = jobs
            .iter()
            .filter(|j| j.is_pending())
            .map(|j| j.id)
            .collect();
        let stale: Vec<JobId> = self
            .armed
            .keys()
            .filter(|id| !pending.contains(id))
            .copied()
            .collect();
        for id in stale {
            info!(job_id = %id, "job left the store; trigger dropped");
            self.disarm(id);
        }

        let mut newly_armed = 0;
        let mut past_due = 0;
        for job in jobs.iter().filter(|j| j.is_pending()) {
            if self.arm(job, now) {
                newly_armed += 1;
            } else if job.scheduled_at <= now && !self.running.contains(&job.id) {
                past_due += 1;
            }
        }

        if !quiet || newly_armed > 0 {
            info!(armed = newly_armed, total_armed = self.armed.len(), "pending jobs armed");
        }
        if !quiet && past_due > 0 {
            warn!(count = past_due, "pending jobs are past due and will not run");
        }
        newly_armed
    }

    /// Execute job `id`. `armed_at` is the instant its trigger was armed
    /// for, or `None` when the run was requested directly.
    fn start_run(&mut self, id: JobId, armed_at: Option<DateTime<Utc>>) {
        if self.running.contains(&id) {
            warn!(job_id = %id, "job is already running; fire ignored");
            return;
        }

        // Re-read from disk: another process may have cancelled or finished it.
        let job = match self.scheduler.get_job(id) {
            Ok(job) => job,
            Err(_) => {
                warn!(job_id = %id, "fired job not found in the store; skipping");
                self.scheduler
                    .log(&format!("#{id} fired but is no longer scheduled"));
                return;
            }
        };
        if !job.is_pending() {
            warn!(job_id = %id, status = %job.status, "fired job is no longer pending; skipping");
            return;
        }
        // The id now names a job due at another time: replaced or rescheduled on disk.
        if let Some(at) = armed_at.filter(|at| *at != job.scheduled_at) {
            warn!(
                job_id = %id,
                armed_for = %at,
                scheduled_at = %job.scheduled_at,
                "stored job no longer matches its trigger; re-arming"
            );
            self.arm(&job, Utc::now());
            return;
        }

        info!(
            job_id = %id,
            target = %job.target.display(),
            action = %job.parameters.summary(),
            "executing job"
        );
        self.running.insert(id);

        let executor = Arc::clone(&self.executor);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let Job {
                target, parameters, ..
            } = job;
            // A panic inside the executor surfaces as a JoinError here.
            let outcome = match tokio::spawn(async move {
                executor.execute(&target, &parameters).await
            })
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => ActionOutcome::Failed(format!("executor crashed: {e}")),
            };
            let _ = events.send(Event::Finished(id, outcome));
        });
    }

    fn finish_run(&mut self, id: JobId, outcome: ActionOutcome) {
        self.running.remove(&id);
        match self.scheduler.record_outcome(id, &outcome, Utc::now()) {
            Ok(Some(job)) => match &outcome {
                ActionOutcome::Failed(reason) => {
                    warn!(job_id = %id, status = %job.status, %reason, "job failed")
                }
                _ => info!(job_id = %id, status = %job.status, "job finished"),
            },
            Ok(None) => {}
            Err(e) => error!(job_id = %id, "failed to persist job outcome: {e}"),
        }
    }

    /// Abort unfired triggers, then give running executions a bounded window
    /// to report back so their outcome is persisted.
    async fn stop(&mut self) {
        let ids: Vec<JobId> = self.armed.keys().copied().collect();
        for id in ids {
            self.disarm(id);
        }

        if self.running.is_empty() {
            return;
        }
        info!(count = self.running.len(), "waiting for running jobs");
        let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while !self.running.is_empty() {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(Event::Finished(id, outcome))) => self.finish_run(id, outcome),
                Ok(Some(Event::Fire(..))) => {}
                Ok(None) | Err(_) => {
                    warn!(count = self.running.len(), "shutdown with jobs still running");
                    break;
                }
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
