use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric job identifier, unique within one store.
///
/// Allocated by the job store from a persisted high-water mark, so an id is
/// never handed out twice even after the job that held it was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// The id that follows the highest id in `existing` (1 for an empty store).
    ///
    /// Only a lower bound: ids of removed jobs are not visible here.
    pub fn next_after<'a>(existing: impl IntoIterator<Item = &'a Job>) -> Self {
        let max = existing.into_iter().map(|j| j.id.0).max().unwrap_or(0);
        Self(max + 1)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a job does when its trigger fires.
///
/// Stored under `parameters` in the job record. New action kinds get a new
/// variant here and a matching arm in the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobAction {
    /// Stage everything, commit with `message`, push `branch`.
    GitPush { message: String, branch: String },
}

impl JobAction {
    /// One-line summary used in audit log entries and listings.
    pub fn summary(&self) -> String {
        match self {
            JobAction::GitPush { message, branch } => format!("{branch}: {message}"),
        }
    }
}

/// Lifecycle state of a job. Everything except `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `scheduled_at`.
    Pending,
    /// The action ran and did its work.
    Completed,
    /// The action ran but found nothing to do.
    NoChanges,
    /// The action ran and failed; see `Job::error`.
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::NoChanges => "no_changes",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Result reported by an action executor for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    NoChanges,
    Failed(String),
}

impl ActionOutcome {
    /// The terminal status a job takes after this outcome.
    pub fn status(&self) -> JobStatus {
        match self {
            ActionOutcome::Completed => JobStatus::Completed,
            ActionOutcome::NoChanges => JobStatus::NoChanges,
            ActionOutcome::Failed(_) => JobStatus::Failed,
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Repository the action operates on.
    pub target: PathBuf,
    pub parameters: JobAction,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Set only when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set once the job has left `pending`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a fresh `pending` job.
    pub fn new(
        id: JobId,
        target: PathBuf,
        parameters: JobAction,
        scheduled_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target,
            parameters,
            scheduled_at,
            created_at,
            status: JobStatus::Pending,
            error: None,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    /// Move a pending job into the terminal state matching `outcome`.
    ///
    /// Returns `false` and leaves the job untouched if it already left
    /// `pending`; transitions are one-way.
    pub fn finish(&mut self, outcome: &ActionOutcome, at: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = outcome.status();
        self.error = match outcome {
            ActionOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        self.completed_at = Some(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job(id: u64) -> Job {
        let now = Utc::now();
        Job::new(
            JobId(id),
            PathBuf::from("/tmp/repo"),
            JobAction::GitPush {
                message: "wip".to_string(),
                branch: "main".to_string(),
            },
            now + Duration::minutes(5),
            now,
        )
    }

    #[test]
    fn next_id_is_max_plus_one() {
        assert_eq!(JobId::next_after(&Vec::<Job>::new()), JobId(1));
        // A gap left by a cancelled job must not be refilled.
        let jobs = vec![job(1), job(3)];
        assert_eq!(JobId::next_after(&jobs), JobId(4));
    }

    #[test]
    fn finish_records_error_only_on_failure() {
        let mut failed = job(1);
        let at = Utc::now();
        assert!(failed.finish(&ActionOutcome::Failed("boom".to_string()), at));
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.completed_at, Some(at));

        let mut done = job(2);
        assert!(done.finish(&ActionOutcome::NoChanges, at));
        assert_eq!(done.status, JobStatus::NoChanges);
        assert!(done.error.is_none());
    }

    #[test]
    fn finish_is_one_way() {
        let mut j = job(1);
        assert!(j.finish(&ActionOutcome::Completed, Utc::now()));
        assert!(!j.finish(&ActionOutcome::Failed("late".to_string()), Utc::now()));
        assert_eq!(j.status, JobStatus::Completed);
        assert!(j.error.is_none());
    }

    #[test]
    fn wire_shape() {
        let j = job(7);
        let value = serde_json::to_value(&j).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["status"], "pending");
        assert_eq!(value["parameters"]["kind"], "git_push");
        assert_eq!(value["parameters"]["branch"], "main");
        // Optional fields are absent until the job finishes.
        assert!(value.get("error").is_none());
        assert!(value.get("completed_at").is_none());
    }
}
