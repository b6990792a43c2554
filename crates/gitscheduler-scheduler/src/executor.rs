//! Action executors: the side-effecting work a job performs when it fires.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use gitscheduler_core::config::GitConfig;
use gitscheduler_core::{ActionOutcome, JobAction};
use tracing::{debug, info};

/// Runs a job's action against its target.
///
/// Called at most once per fired trigger. Implementations report failure
/// through [`ActionOutcome::Failed`]; the engine also turns a panic into a
/// failed outcome, so nothing an executor does can take the daemon down.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, target: &Path, action: &JobAction) -> ActionOutcome;
}

/// Stages, commits and pushes a repository by shelling out to `git`.
#[derive(Debug, Clone)]
pub struct GitExecutor {
    remote: String,
}

impl GitExecutor {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
        }
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self::new(config.remote.clone())
    }

    async fn commit_and_push(
        &self,
        repo: &Path,
        message: &str,
        branch: &str,
    ) -> Result<ActionOutcome, String> {
        // Untracked files count as changes, same as `git add -A` will see them.
        let status = git(repo, &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            debug!(repo = %repo.display(), "working tree clean");
            return Ok(ActionOutcome::NoChanges);
        }

        git(repo, &["add", "-A"]).await?;
        git(repo, &["commit", "-m", message]).await?;
        git(repo, &["push", &self.remote, branch]).await?;

        info!(repo = %repo.display(), remote = %self.remote, %branch, "pushed");
        Ok(ActionOutcome::Completed)
    }
}

#[async_trait]
impl ActionExecutor for GitExecutor {
    fn name(&self) -> &str {
        "git"
    }

    async fn execute(&self, target: &Path, action: &JobAction) -> ActionOutcome {
        match action {
            JobAction::GitPush { message, branch } => self
                .commit_and_push(target, message, branch)
                .await
                .unwrap_or_else(ActionOutcome::Failed),
        }
    }
}

/// True when `path` is inside a git work tree.
pub async fn is_work_tree(path: &Path) -> bool {
    matches!(
        git(path, &["rev-parse", "--is-inside-work-tree"]).await,
        Ok(out) if out.trim() == "true"
    )
}

/// Name of the checked-out branch, or `None` on a detached HEAD or error.
///
/// Also answers for a fresh repository whose branch has no commits yet.
pub async fn current_branch(path: &Path) -> Option<String> {
    let out = git(path, &["symbolic-ref", "--short", "-q", "HEAD"]).await.ok()?;
    let name = out.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Run `git <args>` in `repo`, returning stdout or a one-line failure reason.
async fn git(repo: &Path, args: &[&str]) -> Result<String, String> {
    let step = args.first().copied().unwrap_or("");
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("failed to run git {step}: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        // `git commit` reports some failures on stdout only.
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(format!("git {step} failed: {detail}"));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
