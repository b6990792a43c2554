use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use gitscheduler_core::config::DaemonConfig;
use gitscheduler_core::Paths;
use tracing::{info, warn};

use crate::error::{DaemonError, Result};
use crate::pidfile::PidFile;
use crate::probe::{OsProbe, ProcessProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A detached daemon was spawned with this pid.
    Started { pid: u32 },
    /// A live daemon already owns the pid file; nothing was spawned.
    AlreadyRunning { pid: u32 },
}

/// Detects the running daemon and launches a detached one on demand.
pub struct DaemonManager {
    paths: Paths,
    pid_file: PidFile,
    probe: Box<dyn ProcessProbe>,
    launch_grace: Duration,
    launch_command: Option<(PathBuf, Vec<OsString>)>,
}

impl DaemonManager {
    pub fn new(paths: Paths, config: &DaemonConfig) -> Self {
        Self {
            pid_file: PidFile::new(&paths.pid),
            paths,
            probe: Box::new(OsProbe),
            launch_grace: Duration::from_millis(config.launch_grace_ms),
            launch_command: None,
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Launch `program args..` instead of `<current exe> daemon --background`.
    pub fn with_launch_command(mut self, program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        self.launch_command = Some((program.into(), args));
        self
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// Pid of the live daemon, if any.
    pub fn running_pid(&self) -> Option<u32> {
        self.pid_file.read().filter(|&pid| self.probe.is_alive(pid))
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// Spawn a detached daemon unless one is already alive.
    ///
    /// Waits the configured grace period after spawning so the child can
    /// write its pid file; that wait is the only readiness signal.
    pub async fn launch_background(&self) -> Result<LaunchOutcome> {
        if let Some(pid) = self.running_pid() {
            info!(pid, "daemon already running");
            return Ok(LaunchOutcome::AlreadyRunning { pid });
        }

        self.paths.ensure_root()?;
        let (program, args) = match &self.launch_command {
            Some((program, args)) => (program.clone(), args.clone()),
            None => self.default_command()?,
        };

        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.daemon_out)?;
        let err = out.try_clone()?;

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err));
        detach(&mut cmd);

        let child = cmd
            .spawn()
            .map_err(|e| DaemonError::Spawn(format!("{}: {e}", program.display())))?;
        let pid = child.id();
        // The daemon outlives this process; it is never waited on.
        drop(child);

        info!(pid, log = %self.paths.daemon_out.display(), "daemon launched");
        tokio::time::sleep(self.launch_grace).await;

        if !self.probe.is_alive(pid) {
            warn!(pid, "daemon exited during startup; see daemon.out");
        }
        Ok(LaunchOutcome::Started { pid })
    }

    fn default_command(&self) -> Result<(PathBuf, Vec<OsString>)> {
        let exe = std::env::current_exe()?;
        let args = vec![
            OsString::from("daemon"),
            OsString::from("--background"),
            OsString::from("--root"),
            self.paths.root.clone().into_os_string(),
        ];
        Ok((exe, args))
    }
}

/// Run the child in its own session so it survives the launching terminal.
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // Safety: setsid is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}
