use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Timestamp format of every audit line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only, human-readable record of job outcomes.
///
/// One line per entry: `[YYYY-MM-DD HH:MM:SS] <message>` in local time.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> io::Result<()> {
        self.append_at(Local::now(), message)
    }

    pub fn append_at(&self, at: DateTime<Local>, message: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", format_line(at, message))
    }

    /// Full log contents, or `None` when nothing has been logged yet.
    pub fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) if s.is_empty() => Ok(None),
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Render one entry. Line breaks inside `message` are flattened so each
/// entry stays on a single line.
pub fn format_line(at: DateTime<Local>, message: &str) -> String {
    let flat: String = message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    format!("[{}] {}", at.format(TIMESTAMP_FORMAT), flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn line_format() {
        let at = Local.with_ymd_and_hms(2025, 11, 1, 18, 30, 5).unwrap();
        assert_eq!(
            format_line(at, "#3 COMPLETED"),
            "[2025-11-01 18:30:05] #3 COMPLETED"
        );
    }

    #[test]
    fn multiline_messages_stay_on_one_line() {
        let at = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let line = format_line(at, "#1 FAILED git push failed:\n  rejected\n\n  hint: pull first\n");
        assert_eq!(
            line,
            "[2025-01-02 03:04:05] #1 FAILED git push failed: | rejected | hint: pull first"
        );
    }

    #[test]
    fn append_accumulates_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("scheduler.log"));
        assert!(log.read().unwrap().is_none());

        log.append("first").unwrap();
        log.append("second").unwrap();

        let text = log.read().unwrap().unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
    }
}
