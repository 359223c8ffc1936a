use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Where upcoming events come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventsLocation {
    Http { url: String, api_key: Option<String> },
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token:        String,
    pub owner_id:              Option<String>,
    pub users_file:            PathBuf,
    pub sent_ledger_file:      PathBuf,
    pub log_dir:               PathBuf,
    pub events:                EventsLocation,
    pub notify_interval_secs:  u64,
    pub refresh_interval_secs: u64,
    pub refresh_max_results:   usize,
    pub list_events_max:       usize,
    pub dedup_clear_hour_utc:  u32,
    pub command_poll_secs:     u64,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Variable lookup with blanks treated as unset.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, name: &str, default: T) -> T {
        self.get(name).and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
    }

    fn path(&self, name: &str, default: &str) -> PathBuf {
        self.get(name).map(PathBuf::from).unwrap_or_else(|| default.into())
    }

    fn events_location(&self) -> Result<EventsLocation> {
        match (self.get("CALENDAR_EVENTS_URL"), self.get("CALENDAR_EVENTS_FILE")) {
            (Some(url), None) => Ok(EventsLocation::Http {
                url,
                api_key: self.get("CALENDAR_API_KEY"),
            }),
            (None, Some(path)) => Ok(EventsLocation::File(PathBuf::from(path))),
            (Some(_), Some(_)) => bail!("set only one of CALENDAR_EVENTS_URL and CALENDAR_EVENTS_FILE"),
            (None, None) => bail!("CALENDAR_EVENTS_URL or CALENDAR_EVENTS_FILE must be set"),
        }
    }
}

/// Calendar source alone, so tools that never talk to Telegram can share it.
pub fn events_location_from_env() -> Result<EventsLocation> {
    Vars(var).events_location()
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(var)
    }

    /// Same rules as [`BotConfig::from_env`] over any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(lookup);
        let telegram_token = vars.get("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN is not set")?;

        Ok(Self {
            telegram_token,
            owner_id: vars.get("BOT_OWNER_ID"),
            users_file: vars.path("USERS_FILE", "userslist.json"),
            sent_ledger_file: vars.path("SENT_LEDGER_FILE", "data/sent_notifications.txt"),
            log_dir: vars.path("LOG_DIR", "logs"),
            events: vars.events_location()?,
            notify_interval_secs: vars.parsed("NOTIFY_INTERVAL_SECS", 180u64).max(1),
            refresh_interval_secs: vars.parsed("REFRESH_INTERVAL_SECS", 3600u64).max(1),
            refresh_max_results: vars.parsed("REFRESH_MAX_RESULTS", 50usize).max(1),
            list_events_max: vars.parsed("LIST_EVENTS_MAX", 7usize).max(1),
            dedup_clear_hour_utc: vars.parsed("DEDUP_CLEAR_HOUR_UTC", 0u32).min(23),
            command_poll_secs: vars.parsed("COMMAND_POLL_SECS", 2u64).max(1),
        })
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
    }
}
