//! Append-only event log and the overwritten JSON status snapshot.
//!
//! Event log lines look like `2025-01-31 14:02:11 | INFO  | STATUS {...}`.
//! A session is bracketed by `NETWATCH START` / `NETWATCH STOP` markers, so a
//! file without a stop marker belongs to a run that died.

use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::models::{CycleState, DowntimeInterval};
use crate::utils::format_hms;

pub const LOG_PREFIX: &str = "runlog_";
pub const STOP_MARKER: &str = "NETWATCH STOP";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Creates the log directory and names a fresh per-run file inside it.
    pub fn create_in(log_dir: &Path) -> MonitorResult<Self> {
        fs::create_dir_all(log_dir).map_err(|e| {
            MonitorError::Startup(format!("cannot create log directory {}: {}", log_dir.display(), e))
        })?;
        let name = format!("{}{}.log", LOG_PREFIX, Local::now().format("%d.%m.%y_%H-%M-%S"));
        Ok(Self::at(log_dir.join(name)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, level: Level, message: &str) -> MonitorResult<()> {
        let line = format_line(Local::now(), level, message);
        append(&self.path, &line).map_err(|e| MonitorError::sink("event log", e))
    }

    pub fn status(&self, state: &CycleState) -> MonitorResult<()> {
        let payload = serde_json::to_string(state)?;
        self.write(Level::INFO, &format!("STATUS {}", payload))
    }

    pub fn downtime(&self, interval: &DowntimeInterval) -> MonitorResult<()> {
        self.write(Level::WARN, &format!("DOWNTIME {}", format_hms(interval.duration())))
    }

    pub fn error(&self, message: &str) -> MonitorResult<()> {
        self.write(Level::ERROR, message)
    }

    /// Writes the start markers. The returned guard writes the stop marker
    /// exactly once, on `finish` or when dropped.
    pub fn begin_session(&self, config: &MonitorConfig) -> MonitorResult<SessionGuard> {
        self.write(Level::INFO, &format!("=== NETWATCH START {} ===", Local::now().to_rfc3339()))?;
        // From here on an early return drops the guard, which closes the session.
        let guard = SessionGuard {
            log: self.clone(),
            finished: false,
        };
        self.write(Level::INFO, &format!("LOG FILE: {}", self.path.display()))?;
        self.write(Level::INFO, &format!("ARGS {}", serde_json::to_string(config)?))?;
        Ok(guard)
    }
}

fn format_line(ts: DateTime<Local>, level: Level, message: &str) -> String {
    format!("{} | {:<5} | {}\n", ts.format(TIMESTAMP_FORMAT), level.as_str(), message)
}

fn append(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

#[derive(Debug)]
pub struct SessionGuard {
    log: EventLog,
    finished: bool,
}

impl SessionGuard {
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn finish(mut self) {
        self.write_stop();
    }

    fn write_stop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let marker = format!("=== {} {} ===", STOP_MARKER, Local::now().to_rfc3339());
        if let Err(e) = self.log.write(Level::INFO, &marker) {
            warn!("Could not write session stop marker: {}", e);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.write_stop();
    }
}

/// True when the log carries a stop marker.
pub fn session_completed(path: &Path) -> io::Result<bool> {
    Ok(fs::read_to_string(path)?.contains(STOP_MARKER))
}

/// Finds the newest `runlog_*` file and, if its session never wrote a stop
/// marker, appends one stamped with the file's modification time.
/// Best effort: any I/O problem just skips the check.
pub fn mark_incomplete_previous_run(log_dir: &Path) -> Option<PathBuf> {
    let latest = fs::read_dir(log_dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(LOG_PREFIX))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            meta.is_file().then_some((meta.modified().ok()?, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)?;

    let (modified, path) = latest;
    if session_completed(&path).ok()? {
        return None;
    }
    let mtime: DateTime<Local> = modified.into();
    let marker = format!("=== {} (previous run incomplete) {} ===", STOP_MARKER, mtime.to_rfc3339());
    append(&path, &format_line(mtime, Level::WARN, &marker)).ok()?;
    Some(path)
}

/// Point-in-time JSON copy of the latest cycle, replaced atomically.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, state: &CycleState) -> MonitorResult<()> {
        let payload = serde_json::to_vec_pretty(state)?;
        let io_err = |e| MonitorError::sink("status snapshot", e);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, payload).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrimaryTarget;
    use crate::models::Classification;
    use chrono::TimeZone;

    fn sample_state() -> CycleState {
        CycleState {
            timestamp: Local::now(),
            primary: PrimaryTarget::default(),
            cycle: 1,
            checks: None,
            classification: Classification::InternalError,
            summary: "Problem: internal cycle error".into(),
            uptime_seconds: 3,
            downtime_seconds: 0,
            error: Some("boom".into()),
            closed_downtime: None,
        }
    }

    #[test]
    fn line_format_pads_level() {
        let ts = Local.with_ymd_and_hms(2025, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_line(ts, Level::INFO, "hello"), "2025-03-09 07:05:01 | INFO  | hello\n");
        assert_eq!(format_line(ts, Level::ERROR, "x"), "2025-03-09 07:05:01 | ERROR | x\n");
    }

    #[test]
    fn session_guard_writes_stop_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::create_in(dir.path()).unwrap();
        let guard = log.begin_session(&MonitorConfig::default()).unwrap();
        guard.finish();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.matches("NETWATCH START").count(), 1);
        assert_eq!(content.matches(STOP_MARKER).count(), 1);
        assert!(content.contains("| INFO  | ARGS {"));
    }

    #[test]
    fn dropped_guard_still_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::create_in(dir.path()).unwrap();
        {
            let _guard = log.begin_session(&MonitorConfig::default()).unwrap();
        }
        assert!(session_completed(log.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn failed_header_still_closes_session() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::create_in(dir.path()).unwrap();
        // Non-UTF-8 paths cannot be serialized, so the ARGS line fails after START.
        let config = MonitorConfig {
            log_dir: PathBuf::from(OsStr::from_bytes(b"logs-\xff")),
            ..Default::default()
        };

        let err = log.begin_session(&config).unwrap_err();
        assert!(matches!(err, MonitorError::Json(_)));
        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.matches("NETWATCH START").count(), 1);
        assert_eq!(content.matches(STOP_MARKER).count(), 1);
        assert!(!content.contains("ARGS"));
    }

    #[test]
    fn incomplete_previous_run_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        let old = EventLog::at(dir.path().join("runlog_01.01.25_10-00-00.log"));
        old.write(Level::INFO, "=== NETWATCH START 2025-01-01T10:00:00+00:00 ===").unwrap();
        fs::write(dir.path().join("unrelated.txt"), "x").unwrap();

        let marked = mark_incomplete_previous_run(dir.path());
        assert_eq!(marked.as_deref(), Some(old.path()));
        let content = fs::read_to_string(old.path()).unwrap();
        assert!(content.contains("NETWATCH STOP (previous run incomplete)"));

        // Already closed now, so a second pass leaves it alone.
        assert!(mark_incomplete_previous_run(dir.path()).is_none());
    }

    #[test]
    fn snapshot_is_overwritten_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("nested").join("last_status.json"));
        let mut state = sample_state();
        snapshot.write(&state).unwrap();
        state.cycle = 2;
        snapshot.write(&state).unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(snapshot.path()).unwrap()).unwrap();
        assert_eq!(written["cycle"], 2);
        assert_eq!(written["classification"], "internal_error");
        assert!(!dir.path().join("nested").join("last_status.json.tmp").exists());
    }

    #[test]
    fn snapshot_failure_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squatting on the target path makes the rename fail.
        let target = dir.path().join("last_status.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();

        let err = SnapshotFile::new(&target).write(&sample_state()).unwrap_err();
        assert!(matches!(err, MonitorError::Sink { sink: "status snapshot", .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn unusable_log_dir_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();
        let err = EventLog::create_in(&file.join("logs")).unwrap_err();
        assert!(err.is_fatal());
    }
}
