use std::path::PathBuf;

use chrono::{DateTime, Utc};
use gitscheduler_core::{ActionOutcome, Job, JobAction, JobId, Paths};
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::error::{Result, SchedulerError};
use crate::store::JobStore;

/// Job operations against the on-disk store, without any timers.
///
/// Every call is a fresh load → mutate → save, so it is safe to build one of
/// these per command. The daemon wraps the same type inside
/// [`crate::engine::SchedulerEngine`].
#[derive(Debug, Clone)]
pub struct Scheduler {
    store: JobStore,
    audit: AuditLog,
}

impl Scheduler {
    pub fn new(paths: &Paths) -> Self {
        Self {
            store: JobStore::new(&paths.store),
            audit: AuditLog::new(&paths.log),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Persist a new pending job. Fails with `PastSchedule` unless
    /// `scheduled_at` is strictly after now.
    pub fn create_job(
        &self,
        target: PathBuf,
        parameters: JobAction,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Job> {
        self.create_job_at(target, parameters, scheduled_at, Utc::now())
    }

    pub fn create_job_at(
        &self,
        target: PathBuf,
        parameters: JobAction,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Job> {
        if scheduled_at <= now {
            return Err(SchedulerError::PastSchedule { at: scheduled_at });
        }

        let mut jobs = self.store.load();
        let id = self.store.allocate_id(&jobs)?;
        let job = Job::new(id, target, parameters, scheduled_at, now);
        jobs.push(job.clone());
        self.store.save(&jobs)?;

        info!(job_id = %id, target = %job.target.display(), at = %scheduled_at, "job created");
        Ok(job)
    }

    pub fn get_job(&self, id: JobId) -> Result<Job> {
        self.store
            .load()
            .into_iter()
            .find(|j| j.id == id)
            .ok_or(SchedulerError::JobNotFound { id })
    }

    /// Remove a pending job. Returns the removed record.
    pub fn cancel_job(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.store.load();
        let pos = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(SchedulerError::JobNotFound { id })?;

        if !jobs[pos].is_pending() {
            return Err(SchedulerError::InvalidState {
                id,
                operation: "cancel",
                reason: format!("it is already {}", jobs[pos].status),
            });
        }

        let job = jobs.remove(pos);
        self.store.save(&jobs)?;
        info!(job_id = %id, "job cancelled");
        Ok(job)
    }

    /// Drop every job that has left `pending`. Returns how many were removed.
    pub fn clear_completed(&self) -> Result<usize> {
        let mut jobs = self.store.load();
        let before = jobs.len();
        jobs.retain(Job::is_pending);
        let removed = before - jobs.len();

        if removed > 0 {
            self.store.save(&jobs)?;
            info!(count = removed, "terminal jobs cleared");
        }
        Ok(removed)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.store.load()
    }

    /// Write an executor outcome back to the job and the audit log.
    ///
    /// Returns the updated job, or `None` when the job is gone or was already
    /// finished (another process may have removed or completed it).
    pub fn record_outcome(
        &self,
        id: JobId,
        outcome: &ActionOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let mut jobs = self.store.load();
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            warn!(job_id = %id, "finished job no longer in the store; outcome dropped");
            self.log(&format!("#{id} finished but is no longer scheduled"));
            return Ok(None);
        };
        if !job.finish(outcome, at) {
            warn!(job_id = %id, status = %job.status, "job already finished; outcome dropped");
            return Ok(None);
        }
        let job = job.clone();
        self.store.save(&jobs)?;

        self.log(&outcome_line(&job, outcome));
        Ok(Some(job))
    }

    /// Append to the audit log. Failures are reported through tracing only.
    pub fn log(&self, message: &str) {
        if let Err(e) = self.audit.append(message) {
            warn!(path = %self.audit.path().display(), "audit log write failed: {e}");
        }
    }
}

/// Audit line describing how a job ended.
pub fn outcome_line(job: &Job, outcome: &ActionOutcome) -> String {
    match (outcome, &job.parameters) {
        (ActionOutcome::Completed, JobAction::GitPush { message, branch }) => {
            format!("#{} COMPLETED pushed to {branch}: {message}", job.id)
        }
        (ActionOutcome::NoChanges, _) => format!(
            "#{} NO_CHANGES nothing to commit in {}",
            job.id,
            job.target.display()
        ),
        (ActionOutcome::Failed(reason), _) => format!("#{} FAILED {reason}", job.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gitscheduler_core::JobStatus;

    fn setup() -> (tempfile::TempDir, Scheduler) {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(&Paths::new(dir.path()));
        (dir, scheduler)
    }

    fn action(message: &str) -> JobAction {
        JobAction::GitPush {
            message: message.to_string(),
            branch: "main".to_string(),
        }
    }

    fn create(scheduler: &Scheduler, message: &str) -> Job {
        scheduler
            .create_job(
                PathBuf::from("/repo"),
                action(message),
                Utc::now() + Duration::hours(1),
            )
            .unwrap()
    }

    #[test]
    fn past_schedule_is_rejected_and_nothing_is_stored() {
        let (_dir, scheduler) = setup();
        let now = Utc::now();

        for at in [now - Duration::minutes(1), now] {
            let err = scheduler
                .create_job_at(PathBuf::from("/repo"), action("late"), at, now)
                .unwrap_err();
            assert!(matches!(err, SchedulerError::PastSchedule { .. }));
        }
        assert!(scheduler.list_jobs().is_empty());
    }

    #[test]
    fn ids_increase_and_are_never_reused() {
        let (_dir, scheduler) = setup();
        let a = create(&scheduler, "a");
        let b = create(&scheduler, "b");
        let c = create(&scheduler, "c");
        scheduler.cancel_job(b.id).unwrap();
        let d = create(&scheduler, "d");
        let e = create(&scheduler, "e");

        let ids: Vec<u64> = [a, c, d, e].iter().map(|j| j.id.0).collect();
        assert_eq!(ids, vec![1, 3, 4, 5]);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn cancelling_the_newest_job_does_not_free_its_id() {
        let (_dir, scheduler) = setup();
        create(&scheduler, "a");
        let newest = create(&scheduler, "b");
        scheduler.cancel_job(newest.id).unwrap();

        let next = create(&scheduler, "c");
        assert_eq!(next.id, JobId(3));
        assert!(scheduler.get_job(newest.id).is_err());
    }

    #[test]
    fn clearing_the_newest_job_does_not_free_its_id() {
        let (_dir, scheduler) = setup();
        create(&scheduler, "a");
        let newest = create(&scheduler, "b");
        scheduler
            .record_outcome(newest.id, &ActionOutcome::Completed, Utc::now())
            .unwrap();
        assert_eq!(scheduler.clear_completed().unwrap(), 1);

        assert_eq!(create(&scheduler, "c").id, JobId(3));
    }

    #[test]
    fn emptied_store_keeps_counting() {
        let (_dir, scheduler) = setup();
        let only = create(&scheduler, "a");
        scheduler.cancel_job(only.id).unwrap();
        assert!(scheduler.list_jobs().is_empty());

        assert_eq!(create(&scheduler, "b").id, JobId(2));
    }

    #[test]
    fn cancel_pending_removes_it() {
        let (_dir, scheduler) = setup();
        let keep = create(&scheduler, "keep");
        let gone = create(&scheduler, "gone");

        let removed = scheduler.cancel_job(gone.id).unwrap();
        assert_eq!(removed.id, gone.id);

        let ids: Vec<JobId> = scheduler.list_jobs().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![keep.id]);
    }

    #[test]
    fn cancel_missing_is_not_found() {
        let (_dir, scheduler) = setup();
        let err = scheduler.cancel_job(JobId(42)).unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound { id } if id == JobId(42)));
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn cancel_completed_is_invalid_state() {
        let (_dir, scheduler) = setup();
        let job = create(&scheduler, "done");
        scheduler
            .record_outcome(job.id, &ActionOutcome::Completed, Utc::now())
            .unwrap();

        let err = scheduler.cancel_job(job.id).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidState { .. }));
        assert_eq!(err.to_string(), "Cannot cancel job #1: it is already completed");
        assert_eq!(scheduler.list_jobs().len(), 1);
    }

    #[test]
    fn clear_removes_exactly_the_terminal_jobs() {
        let (_dir, scheduler) = setup();
        let jobs: Vec<Job> = (0..5).map(|i| create(&scheduler, &format!("j{i}"))).collect();
        let now = Utc::now();
        scheduler
            .record_outcome(jobs[0].id, &ActionOutcome::Completed, now)
            .unwrap();
        scheduler
            .record_outcome(jobs[2].id, &ActionOutcome::NoChanges, now)
            .unwrap();
        scheduler
            .record_outcome(jobs[4].id, &ActionOutcome::Failed("x".to_string()), now)
            .unwrap();

        assert_eq!(scheduler.clear_completed().unwrap(), 3);
        let left: Vec<JobId> = scheduler.list_jobs().iter().map(|j| j.id).collect();
        assert_eq!(left, vec![jobs[1].id, jobs[3].id]);
        assert!(scheduler.list_jobs().iter().all(Job::is_pending));

        assert_eq!(scheduler.clear_completed().unwrap(), 0);
    }

    #[test]
    fn record_outcome_updates_store_and_audit_log() {
        let (_dir, scheduler) = setup();
        let job = create(&scheduler, "ship it");

        let updated = scheduler
            .record_outcome(job.id, &ActionOutcome::Failed("boom".to_string()), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, JobStatus::Failed);

        let stored = scheduler.get_job(job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert!(stored.completed_at.is_some());

        let log = scheduler.audit().read().unwrap().unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("#1 FAILED boom"));
    }

    #[test]
    fn record_outcome_for_removed_or_finished_job_is_dropped() {
        let (_dir, scheduler) = setup();
        assert!(scheduler
            .record_outcome(JobId(9), &ActionOutcome::Completed, Utc::now())
            .unwrap()
            .is_none());

        let job = create(&scheduler, "once");
        scheduler
            .record_outcome(job.id, &ActionOutcome::NoChanges, Utc::now())
            .unwrap();
        assert!(scheduler
            .record_outcome(job.id, &ActionOutcome::Completed, Utc::now())
            .unwrap()
            .is_none());
        assert_eq!(scheduler.get_job(job.id).unwrap().status, JobStatus::NoChanges);
    }

    #[test]
    fn outcome_lines_name_the_job() {
        let (_dir, scheduler) = setup();
        let job = create(&scheduler, "msg");
        assert_eq!(
            outcome_line(&job, &ActionOutcome::Completed),
            "#1 COMPLETED pushed to main: msg"
        );
        assert_eq!(
            outcome_line(&job, &ActionOutcome::NoChanges),
            "#1 NO_CHANGES nothing to commit in /repo"
        );
    }
}
