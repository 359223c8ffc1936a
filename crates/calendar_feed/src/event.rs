use crate::html::html_to_text;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use user_settings::SkillRange;

/// Start or end of an event. Timed events carry `dateTime`, all-day events `date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    /// May contain HTML
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: Option<EventTime>,
    #[serde(default)]
    pub html_link: Option<String>,
}

/// Response of the events list call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsPage {
    #[serde(default)]
    pub items: Vec<CalendarEvent>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EventTimeError {
    #[error("all-day event has no start time")]
    AllDay,
    #[error("event has no start")]
    Missing,
    #[error("malformed start time {value:?}: {reason}")]
    Malformed { value: String, reason: String },
}

impl CalendarEvent {
    pub fn has_title(&self) -> bool {
        self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Placeholder for untitled events, which only ever appear in listings.
    pub fn title(&self) -> &str {
        match self.summary.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => "(untitled)",
        }
    }

    /// Description with markup stripped
    pub fn details_text(&self) -> String {
        self.description.as_deref().map(html_to_text).unwrap_or_default()
    }

    pub fn is_all_day(&self) -> bool {
        self.start.date_time.is_none() && self.start.date.is_some()
    }

    /// Absolute start of a timed event.
    ///
    /// RFC 3339 values carry their own offset. A value without offset is read in
    /// the event's `timeZone`, or UTC when that is missing or unknown.
    pub fn start_instant(&self) -> Result<DateTime<Utc>, EventTimeError> {
        let raw = match (&self.start.date_time, &self.start.date) {
            (Some(dt), _) => dt.trim(),
            (None, Some(_)) => return Err(EventTimeError::AllDay),
            (None, None) => return Err(EventTimeError::Missing),
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }

        let naive: NaiveDateTime = raw.parse().map_err(|e: chrono::ParseError| EventTimeError::Malformed {
            value: raw.to_string(),
            reason: e.to_string(),
        })?;

        let tz: Tz = self
            .start
            .time_zone
            .as_deref()
            .and_then(|z| z.parse().ok())
            .unwrap_or(chrono_tz::UTC);

        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| EventTimeError::Malformed {
                value: raw.to_string(),
                reason: format!("does not exist in {}", tz.name()),
            })
    }

    /// Ordering key: the start instant, or midnight UTC for all-day events.
    pub fn sort_instant(&self) -> Option<DateTime<Utc>> {
        match self.start_instant() {
            Ok(dt) => Some(dt),
            Err(EventTimeError::AllDay) => self
                .start
                .date
                .as_deref()
                .and_then(|d| d.parse::<NaiveDate>().ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc()),
            Err(_) => None,
        }
    }

    /// Tier keyword of the tournament: title first, then description.
    pub fn skill_tag(&self) -> Option<SkillRange> {
        let re = tier_regex();
        let from_text = |text: &str| {
            re.captures(text).and_then(|c| match c[1].to_lowercase().as_str() {
                "basic" => Some(SkillRange::Basic),
                "minor" => Some(SkillRange::Minor),
                "major" => Some(SkillRange::Major),
                "open" | "gm" => Some(SkillRange::OpenGm),
                _ => None,
            })
        };
        self.summary
            .as_deref()
            .and_then(from_text)
            .or_else(|| from_text(&self.details_text()))
    }
}

fn tier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(basic|minor|major|open|gm)\b").expect("static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(raw: &str, tz: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            id: "e1".to_string(),
            summary: Some("Weekly Cup".to_string()),
            start: EventTime {
                date_time: Some(raw.to_string()),
                time_zone: tz.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn parses_offset_start() {
        let ev = timed("2024-03-02T18:00:00-08:00", Some("America/Los_Angeles"));
        assert_eq!(ev.start_instant().unwrap().to_rfc3339(), "2024-03-03T02:00:00+00:00");
    }

    #[test]
    fn naive_start_uses_event_zone() {
        let ev = timed("2024-07-01T12:00:00", Some("Europe/Paris"));
        assert_eq!(ev.start_instant().unwrap().to_rfc3339(), "2024-07-01T10:00:00+00:00");

        let ev = timed("2024-07-01T12:00:00", None);
        assert_eq!(ev.start_instant().unwrap().to_rfc3339(), "2024-07-01T12:00:00+00:00");
    }

    #[test]
    fn all_day_and_garbage() {
        let mut ev = CalendarEvent::default();
        assert_eq!(ev.start_instant(), Err(EventTimeError::Missing));

        ev.start.date = Some("2024-05-01".to_string());
        assert_eq!(ev.start_instant(), Err(EventTimeError::AllDay));
        assert!(ev.is_all_day());
        assert_eq!(ev.sort_instant().unwrap().to_rfc3339(), "2024-05-01T00:00:00+00:00");

        let ev = timed("next tuesday", None);
        assert!(matches!(ev.start_instant(), Err(EventTimeError::Malformed { .. })));
        assert!(ev.sort_instant().is_none());
    }

    #[test]
    fn skill_tag_from_title_or_description() {
        let mut ev = timed("2024-07-01T12:00:00Z", None);
        assert_eq!(ev.skill_tag(), None);

        ev.summary = Some("Cranky Ducklings Minor #12".to_string());
        assert_eq!(ev.skill_tag(), Some(SkillRange::Minor));

        ev.summary = Some("AM League".to_string());
        ev.description = Some("<p>Major StarCraft II Tournament</p>".to_string());
        assert_eq!(ev.skill_tag(), Some(SkillRange::Major));

        // substrings do not count
        ev.summary = Some("Minority Report Reopening".to_string());
        ev.description = None;
        assert_eq!(ev.skill_tag(), None);
    }

    #[test]
    fn decodes_calendar_json() {
        let raw = r#"{
            "items": [{
                "id": "abc",
                "summary": "ESL Open Cup",
                "description": "<a href=\"https://play.eslgaming.com\">bracket</a>",
                "htmlLink": "https://calendar.example/abc",
                "start": {"dateTime": "2024-03-02T18:00:00Z", "timeZone": "America/Los_Angeles"},
                "end": {"dateTime": "2024-03-02T19:00:00Z"}
            }]
        }"#;
        let page: EventsPage = serde_json::from_str(raw).unwrap();
        let ev = &page.items[0];
        assert_eq!(ev.title(), "ESL Open Cup");
        assert_eq!(ev.details_text(), "bracket");
        assert_eq!(ev.html_link.as_deref(), Some("https://calendar.example/abc"));
        assert_eq!(ev.skill_tag(), Some(SkillRange::OpenGm));
    }
}
