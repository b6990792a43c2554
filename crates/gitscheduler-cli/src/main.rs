use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gitscheduler_core::GitSchedulerConfig;
use tracing_subscriber::EnvFilter;

mod commands;

/// Schedule git commits and pushes for later, carried out by a background daemon.
#[derive(Parser)]
#[command(name = "gitscheduler", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the job store, log and pid file (default ~/.gitscheduler).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule a commit and push.
    Schedule {
        /// Commit message.
        #[arg(short, long)]
        message: String,

        /// When to run: "30m", "2h" or "YYYY-MM-DD HH:MM" (local time).
        #[arg(short, long)]
        time: String,

        /// Branch to push (default: the repository's current branch).
        #[arg(short, long)]
        branch: Option<String>,

        /// Repository path.
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Do not start the daemon after scheduling.
        #[arg(long)]
        no_start: bool,
    },

    /// List all scheduled commits.
    List,

    /// Cancel a pending scheduled commit.
    Cancel {
        /// Job id as shown by `list`.
        id: u64,
    },

    /// Remove completed, no-change and failed jobs.
    Clear,

    /// Run the scheduler daemon in the foreground.
    Daemon {
        /// Set when launched detached by `start`.
        #[arg(long, hide = true)]
        background: bool,
    },

    /// Start the daemon in the background.
    Start,

    /// Show whether the daemon is running.
    Status,

    /// Print the scheduler log.
    Logs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The daemon reports its progress; one-shot commands only warn.
    let default_filter = match cli.command {
        Command::Daemon { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli);

    let result = match cli.command {
        Command::Schedule {
            message,
            time,
            branch,
            path,
            no_start,
        } => {
            let args = commands::ScheduleArgs {
                message,
                time,
                branch,
                path,
                start_daemon: !no_start,
            };
            commands::schedule(&config, args).await
        }
        Command::List => commands::list(&config),
        Command::Cancel { id } => commands::cancel(&config, id),
        Command::Clear => commands::clear(&config),
        Command::Daemon { background } => commands::daemon(&config, background).await,
        Command::Start => commands::start(&config).await,
        Command::Status => commands::status(&config),
        Command::Logs => commands::logs(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match commands::error_code(&e) {
                Some(code) => eprintln!("✗ {e} [{code}]"),
                None => eprintln!("✗ {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// explicit --config > <root>/gitscheduler.toml > ~/.gitscheduler/gitscheduler.toml
fn load_config(cli: &Cli) -> GitSchedulerConfig {
    GitSchedulerConfig::load(cli.config.as_deref(), cli.root.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        let mut config = GitSchedulerConfig::default();
        if let Some(root) = &cli.root {
            config.root = root.clone();
        }
        config
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn schedule_flags() {
        let cli = Cli::try_parse_from([
            "gitscheduler",
            "schedule",
            "-m",
            "nightly sync",
            "-t",
            "30m",
            "-b",
            "dev",
            "-p",
            "/work/repo",
            "--no-start",
        ])
        .unwrap();
        match cli.command {
            Command::Schedule {
                message,
                time,
                branch,
                path,
                no_start,
            } => {
                assert_eq!(message, "nightly sync");
                assert_eq!(time, "30m");
                assert_eq!(branch.as_deref(), Some("dev"));
                assert_eq!(path, PathBuf::from("/work/repo"));
                assert!(no_start);
            }
            _ => panic!("expected schedule"),
        }
    }

    #[test]
    fn schedule_defaults() {
        let cli =
            Cli::try_parse_from(["gitscheduler", "schedule", "-m", "x", "-t", "2h"]).unwrap();
        match cli.command {
            Command::Schedule {
                branch,
                path,
                no_start,
                ..
            } => {
                assert_eq!(branch, None);
                assert_eq!(path, PathBuf::from("."));
                assert!(!no_start);
            }
            _ => panic!("expected schedule"),
        }
    }

    #[test]
    fn schedule_requires_message_and_time() {
        assert!(Cli::try_parse_from(["gitscheduler", "schedule", "-t", "5m"]).is_err());
        assert!(Cli::try_parse_from(["gitscheduler", "schedule", "-m", "x"]).is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "gitscheduler",
            "daemon",
            "--background",
            "--root",
            "/tmp/gs",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/gs")));
        assert!(matches!(cli.command, Command::Daemon { background: true }));
    }

    #[test]
    fn cancel_takes_a_numeric_id() {
        let cli = Cli::try_parse_from(["gitscheduler", "cancel", "7"]).unwrap();
        assert!(matches!(cli.command, Command::Cancel { id: 7 }));
        assert!(Cli::try_parse_from(["gitscheduler", "cancel", "seven"]).is_err());
    }

    #[test]
    fn bad_config_file_falls_back_to_defaults_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.toml");
        std::fs::write(&bad, "daemon = [[[").unwrap();

        let cli = Cli::try_parse_from([
            OsStr::new("gitscheduler"),
            OsStr::new("status"),
            OsStr::new("--config"),
            bad.as_os_str(),
            OsStr::new("--root"),
            dir.path().as_os_str(),
        ])
        .unwrap();
        let config = load_config(&cli);
        assert_eq!(config.root, dir.path());
        assert_eq!(config.git.remote, "origin");
    }
}
