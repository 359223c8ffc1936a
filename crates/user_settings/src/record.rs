use crate::SettingsError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_LEAD_MINUTES: u32 = 5;
pub const MAX_LEAD_MINUTES: u32 = 5 * 24 * 60;

/// Zone used when a user never picked one (or the stored one no longer parses)
pub const DEFAULT_TIME_ZONE: &str = "America/Indiana/Tell_City";

/// (zone id, label); order is the numbering shown to users
pub const TIME_ZONE_MENU: [(&str, &str); 10] = [
    ("America/Los_Angeles", "Pacific Time"),
    ("America/Denver", "Mountain Time"),
    ("America/Chicago", "Central Time"),
    ("America/New_York", "Eastern Time"),
    ("Europe/London", "Greenwich Mean Time"),
    ("Europe/Paris", "Central European Time"),
    ("Asia/Dubai", "United Arab Emirates Time"),
    ("Asia/Tokyo", "Japan Standard Time"),
    ("Asia/Kolkata", "India Standard Time"),
    ("Australia/Sydney", "Australian Eastern Time"),
];

/// Tournament tier a user wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillRange {
    #[serde(rename = "basic")]
    Basic,
    #[serde(rename = "minor")]
    Minor,
    #[serde(rename = "major")]
    Major,
    #[serde(rename = "Open/GM")]
    OpenGm,
}

pub const SKILL_RANGE_MENU: [(SkillRange, &str); 4] = [
    (SkillRange::Basic, "Basic/Diamond and below"),
    (SkillRange::Minor, "Minor/High diamond/Masters"),
    (SkillRange::Major, "Major/Masters and Up"),
    (SkillRange::OpenGm, "Open/GM"),
];

impl SkillRange {
    pub fn label(self) -> &'static str {
        SKILL_RANGE_MENU
            .iter()
            .find(|(range, _)| *range == self)
            .map(|(_, label)| *label)
            .unwrap_or("")
    }
}

impl fmt::Display for SkillRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkillRange::Basic => "basic",
            SkillRange::Minor => "minor",
            SkillRange::Major => "major",
            SkillRange::OpenGm => "Open/GM",
        };
        f.write_str(s)
    }
}

impl FromStr for SkillRange {
    type Err = SettingsError;

    /// Accepts the stored name, the short keywords and the 1-based menu index.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        if let Ok(idx) = normalized.parse::<usize>() {
            return idx
                .checked_sub(1)
                .and_then(|i| SKILL_RANGE_MENU.get(i))
                .map(|(range, _)| *range)
                .ok_or_else(|| SettingsError::UnknownSkillRange(input.to_string()));
        }
        match normalized.as_str() {
            "basic" => Ok(SkillRange::Basic),
            "minor" => Ok(SkillRange::Minor),
            "major" => Ok(SkillRange::Major),
            "open" | "gm" | "open/gm" | "opengm" => Ok(SkillRange::OpenGm),
            _ => Err(SettingsError::UnknownSkillRange(input.to_string())),
        }
    }
}

/// One user's record. Field names match the on-disk format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Minutes before start; `None` means opted in but not yet configured
    pub notification_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mmr_range: Option<SkillRange>,
}

impl UserSettings {
    pub fn tz(&self) -> Tz {
        self.time_zone
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(chrono_tz::America::Indiana::Tell_City)
    }
}

pub fn validate_lead_time(minutes: i64) -> Result<u32, SettingsError> {
    if minutes < MIN_LEAD_MINUTES as i64 || minutes > MAX_LEAD_MINUTES as i64 {
        return Err(SettingsError::LeadTimeOutOfRange(minutes));
    }
    Ok(minutes as u32)
}

/// Resolves a menu choice: either a listed zone id (any case) or its 1-based number.
pub fn parse_menu_time_zone(input: &str) -> Result<&'static str, SettingsError> {
    let trimmed = input.trim();
    if let Ok(idx) = trimmed.parse::<usize>() {
        return idx
            .checked_sub(1)
            .and_then(|i| TIME_ZONE_MENU.get(i))
            .map(|(zone, _)| *zone)
            .ok_or_else(|| SettingsError::UnknownTimeZone(input.to_string()));
    }
    TIME_ZONE_MENU
        .iter()
        .find(|(zone, _)| zone.eq_ignore_ascii_case(trimmed))
        .map(|(zone, _)| *zone)
        .ok_or_else(|| SettingsError::UnknownTimeZone(input.to_string()))
}
