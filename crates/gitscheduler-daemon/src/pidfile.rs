use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Plain-text file holding the pid of the running daemon.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded pid, or `None` if the file is missing or does not hold a number.
    pub fn read(&self) -> Option<u32> {
        let raw = fs::read_to_string(&self.path).ok()?;
        raw.trim().parse().ok()
    }

    pub fn record(&self, pid: u32) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, pid.to_string())?;
        debug!(pid, path = %self.path.display(), "pid file written");
        Ok(())
    }

    pub fn record_self(&self) -> io::Result<()> {
        self.record(std::process::id())
    }

    /// Remove the file if it still names this process.
    ///
    /// Returns whether a file was removed. A pid file that was since taken
    /// over by another daemon is left alone.
    pub fn release(&self) -> io::Result<bool> {
        if self.read() != Some(std::process::id()) {
            return Ok(false);
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
