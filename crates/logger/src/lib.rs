/// Adjutant — Logger
/// JSONL audit stream, one file per UTC day

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct NotificationSentEvent {
    pub ts:          String,
    pub event:       &'static str,   // "NOTIFICATION_SENT"
    pub user_id:     String,
    pub event_id:    String,
    pub title:       String,
    pub starts_at:   String,
    pub lead_minutes: u32,
}

#[derive(Serialize, Debug)]
pub struct NotificationFailedEvent {
    pub ts:       String,
    pub event:    &'static str,      // "NOTIFICATION_FAILED"
    pub user_id:  String,
    pub event_id: String,
    pub error:    String,
}

#[derive(Serialize, Debug)]
pub struct CalendarRefreshEvent {
    pub ts:          String,
    pub event:       &'static str,   // "CALENDAR_REFRESH"
    pub source:      String,
    pub ok:          bool,
    pub items:       usize,
    pub message:     String,
}

#[derive(Serialize, Debug)]
pub struct DedupClearedEvent {
    pub ts:            String,
    pub event:         &'static str, // "DEDUP_CLEARED"
    pub window:        String,
    pub cleared_pairs: usize,
}

#[derive(Serialize, Debug)]
pub struct CommandEvent {
    pub ts:      String,
    pub event:   &'static str,       // "COMMAND"
    pub user_id: String,
    pub command: String,
    pub ok:      bool,
}

#[derive(Serialize, Debug)]
pub struct SystemHeartbeatEvent {
    pub ts:              String,
    pub event:           &'static str, // "SYSTEM_HEARTBEAT"
    pub users:           usize,
    pub notifiable_users: usize,
    pub cached_events:   usize,
    pub sent_this_window: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(dir.path().join("nested"));

        for ok in [true, false] {
            logger
                .log(&CommandEvent {
                    ts: now_iso(),
                    event: "COMMAND",
                    user_id: "42".to_string(),
                    command: "opt_in".to_string(),
                    ok,
                })
                .unwrap();
        }

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let contents = fs::read_to_string(dir.path().join("nested").join(format!("{date}.jsonl"))).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "COMMAND");
        assert_eq!(first["ok"], true);
    }
}
