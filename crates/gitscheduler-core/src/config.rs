use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR_NAME: &str = ".gitscheduler";
pub const CONFIG_FILE: &str = "gitscheduler.toml";
pub const STORE_FILE: &str = "schedules.json";
pub const LOG_FILE: &str = "scheduler.log";
pub const PID_FILE: &str = "daemon.pid";
pub const DAEMON_OUT_FILE: &str = "daemon.out";

pub const DEFAULT_LAUNCH_GRACE_MS: u64 = 1_000; // wait for the child to write its pid
pub const DEFAULT_RESCAN_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";

/// Top-level config (gitscheduler.toml + GITSCHEDULER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSchedulerConfig {
    /// Directory holding the job store, audit log and pid file.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub git: GitConfig,
}

impl Default for GitSchedulerConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            daemon: DaemonConfig::default(),
            git: GitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// How long `start` waits after spawning the daemon before returning.
    #[serde(default = "default_launch_grace_ms")]
    pub launch_grace_ms: u64,
    /// How often the daemon re-reads the store to pick up jobs added by other
    /// processes. 0 disables rescanning.
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            launch_grace_ms: DEFAULT_LAUNCH_GRACE_MS,
            rescan_interval_secs: DEFAULT_RESCAN_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Remote that scheduled pushes go to.
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Branch used when the repository has no current branch to default to.
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            default_branch: default_branch(),
        }
    }
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}
fn default_launch_grace_ms() -> u64 {
    DEFAULT_LAUNCH_GRACE_MS
}
fn default_rescan_interval_secs() -> u64 {
    DEFAULT_RESCAN_INTERVAL_SECS
}
fn default_remote() -> String {
    DEFAULT_REMOTE.to_string()
}
fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

impl GitSchedulerConfig {
    /// Load config from a TOML file with GITSCHEDULER_* env var overrides.
    ///
    /// The file is taken from, in order:
    ///   1. the explicit `config_path`
    ///   2. `<root_override>/gitscheduler.toml`
    ///   3. `~/.gitscheduler/gitscheduler.toml`
    ///
    /// A missing file is not an error. `root_override` (the `--root` flag)
    /// wins over whatever the file or environment say.
    pub fn load(
        config_path: Option<&Path>,
        root_override: Option<&Path>,
    ) -> crate::error::Result<Self> {
        let path = match (config_path, root_override) {
            (Some(p), _) => p.to_path_buf(),
            (None, Some(root)) => root.join(CONFIG_FILE),
            (None, None) => default_root().join(CONFIG_FILE),
        };

        tracing::debug!(path = %path.display(), exists = path.exists(), "loading config");
        let mut config: GitSchedulerConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("GITSCHEDULER_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        if let Some(root) = root_override {
            config.root = root.to_path_buf();
        }
        Ok(config)
    }

    pub fn paths(&self) -> Paths {
        Paths::new(&self.root)
    }
}

/// Every file location the system uses, derived from one root directory.
///
/// Passed explicitly to constructors so tests can point everything at a
/// temporary directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
    pub store: PathBuf,
    pub log: PathBuf,
    pub pid: PathBuf,
    pub daemon_out: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            store: root.join(STORE_FILE),
            log: root.join(LOG_FILE),
            pid: root.join(PID_FILE),
            daemon_out: root.join(DAEMON_OUT_FILE),
            root,
        }
    }

    /// Create the root directory if it does not exist yet.
    pub fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}
