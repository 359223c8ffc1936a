/// Adjutant — User Settings
///
/// Per-user notification preferences:
///   - lead time in minutes (validated to 5 min – 5 days at write time)
///   - time zone picked from a fixed menu, defaulted when absent
///   - skill range used to filter tier-tagged tournaments
///
/// Persisted as one flat JSON object (user id → record), rewritten in full
/// on every mutation.

mod record;
mod store;

pub use record::{
    parse_menu_time_zone, validate_lead_time, SkillRange, UserSettings, DEFAULT_TIME_ZONE,
    MAX_LEAD_MINUTES, MIN_LEAD_MINUTES, SKILL_RANGE_MENU, TIME_ZONE_MENU,
};
pub use store::SettingsStore;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("user is already opted in")]
    AlreadyOptedIn,
    #[error("user is not opted in")]
    NotOptedIn,
    #[error("lead time {0} is outside 5..=7200 minutes")]
    LeadTimeOutOfRange(i64),
    #[error("unknown time zone choice: {0}")]
    UnknownTimeZone(String),
    #[error("unknown skill range: {0}")]
    UnknownSkillRange(String),
    #[error("settings file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file json: {0}")]
    Json(#[from] serde_json::Error),
}
