use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use gitscheduler_core::{Job, JobId};
use tracing::warn;

use crate::error::Result;

/// Whole-file JSON persistence for the job list.
///
/// There is no locking: two processes that each load, mutate and save will
/// silently drop whichever update landed first.
#[derive(Debug, Clone)]
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every job. Returns an empty list when the file is missing or unreadable.
    pub fn load(&self) -> Vec<Job> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), "job store unreadable, treating as empty: {e}");
                return Vec::new();
            }
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str(&raw) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(path = %self.path.display(), "job store corrupt, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    /// Replace the stored list with `jobs`.
    ///
    /// Writes a sibling temp file and renames it into place, so a crash leaves
    /// either the old document or the new one.
    pub fn save(&self, jobs: &[Job]) -> Result<()> {
        let mut json = serde_json::to_string_pretty(jobs)?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())
    }

    /// Reserve the id for a job about to be appended to `jobs`.
    ///
    /// The last issued id is kept next to the store (`schedules.seq`), so
    /// removing the newest job does not hand its id out again. The id is one
    /// past the larger of that mark and the highest id still stored.
    pub fn allocate_id(&self, jobs: &[Job]) -> Result<JobId> {
        let id = JobId::next_after(jobs).max(JobId(self.last_issued_id() + 1));
        write_atomic(&self.seq_path(), id.to_string().as_bytes())?;
        Ok(id)
    }

    fn last_issued_id(&self) -> u64 {
        let path = self.seq_path();
        match fs::read_to_string(&path) {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
                warn!(path = %path.display(), "id counter corrupt, using stored ids only: {e}");
                0
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(path = %path.display(), "id counter unreadable, using stored ids only: {e}");
                0
            }
        }
    }

    fn seq_path(&self) -> PathBuf {
        self.path.with_extension("seq")
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
