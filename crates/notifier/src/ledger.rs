use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// (user, event) pairs already notified in the current window.
///
/// A window is one UTC day starting at `clear_hour`. When a backing file is
/// configured every recorded pair is appended as `window|user|event`, so a
/// restart inside the same window does not re-notify; lines of older windows
/// are ignored on load.
pub struct SentLedger {
    sent:       HashSet<(String, String)>,
    window:     NaiveDate,
    clear_hour: u32,
    path:       Option<PathBuf>,
}

fn window_of(now: DateTime<Utc>, clear_hour: u32) -> NaiveDate {
    (now - Duration::hours(clear_hour as i64)).date_naive()
}

impl SentLedger {
    pub fn in_memory(clear_hour: u32, now: DateTime<Utc>) -> Self {
        let clear_hour = clear_hour.min(23);
        Self {
            sent: HashSet::new(),
            window: window_of(now, clear_hour),
            clear_hour,
            path: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>, clear_hour: u32, now: DateTime<Utc>) -> Result<Self> {
        let mut ledger = Self::in_memory(clear_hour, now);
        let path = path.into();

        match fs::read_to_string(&path) {
            Ok(contents) => {
                let window = ledger.window.to_string();
                for line in contents.lines() {
                    let mut parts = line.splitn(3, '|');
                    if let (Some(w), Some(user), Some(event)) = (parts.next(), parts.next(), parts.next()) {
                        if w == window {
                            ledger.sent.insert((user.to_string(), event.to_string()));
                        }
                    }
                }
                info!("📋 Loaded {} sent notifications for window {}", ledger.sent.len(), window);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("read sent ledger {:?}", path)),
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create ledger dir {:?}", parent))?;
        }
        ledger.path = Some(path);
        Ok(ledger)
    }

    pub fn window(&self) -> NaiveDate {
        self.window
    }

    pub fn contains(&self, user_id: &str, event_id: &str) -> bool {
        self.sent.contains(&(user_id.to_string(), event_id.to_string()))
    }

    /// Returns false when the pair was already recorded.
    pub fn record(&mut self, user_id: &str, event_id: &str) -> bool {
        if !self.sent.insert((user_id.to_string(), event_id.to_string())) {
            return false;
        }
        if let Some(path) = &self.path {
            let line = format!("{}|{}|{}", self.window, user_id, event_id);
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut f| writeln!(f, "{line}"));
            if let Err(e) = written {
                warn!("Failed to persist sent notification {}: {}", line, e);
            }
        }
        true
    }

    /// Empties the set unconditionally and starts the window containing `now`.
    /// Returns how many pairs were dropped.
    pub fn clear(&mut self, now: DateTime<Utc>) -> usize {
        let cleared = self.sent.len();
        self.sent.clear();
        self.window = window_of(now, self.clear_hour);
        if let Some(path) = &self.path {
            if let Err(e) = fs::write(path, "") {
                warn!("Failed to truncate sent ledger {:?}: {}", path, e);
            }
        }
        cleared
    }

    /// Clears when `now` belongs to a later window than the current one.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> Option<usize> {
        if window_of(now, self.clear_hour) == self.window {
            return None;
        }
        Some(self.clear(now))
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn records_each_pair_once() {
        let mut ledger = SentLedger::in_memory(0, at("2024-06-01T10:00:00Z"));
        assert!(ledger.record("u1", "e1"));
        assert!(!ledger.record("u1", "e1"));
        assert!(ledger.record("u2", "e1"));
        assert!(ledger.contains("u1", "e1"));
        assert!(!ledger.contains("u1", "e2"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn clear_leaves_ledger_empty() {
        let mut ledger = SentLedger::in_memory(0, at("2024-06-01T10:00:00Z"));
        ledger.record("u1", "e1");
        ledger.record("u1", "e2");
        assert_eq!(ledger.clear(at("2024-06-01T10:05:00Z")), 2);
        assert!(ledger.is_empty());
        assert!(!ledger.contains("u1", "e1"));
    }

    #[test]
    fn rolls_over_at_clear_hour() {
        let mut ledger = SentLedger::in_memory(6, at("2024-06-01T10:00:00Z"));
        ledger.record("u1", "e1");

        assert_eq!(ledger.roll_over(at("2024-06-02T05:59:00Z")), None);
        assert_eq!(ledger.len(), 1);

        assert_eq!(ledger.roll_over(at("2024-06-02T06:00:00Z")), Some(1));
        assert!(ledger.is_empty());
        assert_eq!(ledger.window().to_string(), "2024-06-02");
    }

    #[test]
    fn survives_restart_within_window_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("sent.txt");

        let mut ledger = SentLedger::open(&path, 0, at("2024-06-01T10:00:00Z")).unwrap();
        ledger.record("u1", "e1");
        ledger.record("u2", "e9");
        drop(ledger);

        let reopened = SentLedger::open(&path, 0, at("2024-06-01T23:00:00Z")).unwrap();
        assert!(reopened.contains("u1", "e1"));
        assert!(reopened.contains("u2", "e9"));

        let next_day = SentLedger::open(&path, 0, at("2024-06-02T00:30:00Z")).unwrap();
        assert!(next_day.is_empty());
    }

    #[test]
    fn clear_truncates_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.txt");

        let mut ledger = SentLedger::open(&path, 0, at("2024-06-01T10:00:00Z")).unwrap();
        ledger.record("u1", "e1");
        ledger.clear(at("2024-06-01T11:00:00Z"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        let reopened = SentLedger::open(&path, 0, at("2024-06-01T12:00:00Z")).unwrap();
        assert!(reopened.is_empty());
    }
}
