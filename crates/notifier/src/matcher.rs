use crate::ledger::SentLedger;
use calendar_feed::{CalendarEvent, EventTimeError};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};
use user_settings::{SkillRange, UserSettings};

/// One direct message that should go out now.
#[derive(Debug, Clone)]
pub struct DueNotification<'a> {
    pub user_id:      String,
    pub event:        &'a CalendarEvent,
    pub starts_at:    DateTime<Utc>,
    pub tz:           Tz,
    pub lead_minutes: u32,
}

#[derive(Debug, Default)]
pub struct MatchOutcome<'a> {
    pub due: Vec<DueNotification<'a>>,
    /// Ids of events with no title or an unreadable start
    pub malformed: Vec<&'a str>,
}

fn skill_allows(tag: Option<SkillRange>, user_range: Option<SkillRange>) -> bool {
    match tag {
        None => true,
        Some(tag) => user_range == Some(tag),
    }
}

/// Pairs every configured user with the events starting in `(now, now + lead]`.
///
/// All-day events never match. An event without a title or with an unreadable
/// start is skipped and reported; the rest of the batch is still evaluated.
pub fn find_due<'a, 'u>(
    users:  impl IntoIterator<Item = (&'u str, &'u UserSettings)>,
    events: &'a [CalendarEvent],
    now:    DateTime<Utc>,
    ledger: &SentLedger,
) -> MatchOutcome<'a> {
    let mut outcome = MatchOutcome::default();

    let mut timed: Vec<(DateTime<Utc>, &CalendarEvent, Option<SkillRange>)> = Vec::with_capacity(events.len());
    for ev in events {
        if !ev.has_title() {
            warn!("Skipping untitled event {}", ev.id);
            outcome.malformed.push(ev.id.as_str());
            continue;
        }
        match ev.start_instant() {
            Ok(at) => timed.push((at, ev, ev.skill_tag())),
            Err(EventTimeError::AllDay) => debug!("Event {} is all-day, not notifiable", ev.id),
            Err(e) => {
                warn!("Skipping event {} ({}): {}", ev.id, ev.title(), e);
                outcome.malformed.push(ev.id.as_str());
            }
        }
    }
    timed.sort_by_key(|(at, _, _)| *at);

    for (user_id, settings) in users {
        let Some(lead) = settings.notification_time else {
            continue;
        };
        let cutoff = now + Duration::minutes(lead as i64);
        let tz = settings.tz();

        for (starts_at, ev, tag) in &timed {
            if *starts_at <= now || *starts_at > cutoff {
                continue;
            }
            if !skill_allows(*tag, settings.mmr_range) {
                continue;
            }
            if ledger.contains(user_id, &ev.id) {
                continue;
            }
            outcome.due.push(DueNotification {
                user_id: user_id.to_string(),
                event: *ev,
                starts_at: *starts_at,
                tz,
                lead_minutes: lead,
            });
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_feed::EventTime;

    fn now() -> DateTime<Utc> {
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    fn event(id: &str, title: &str, start: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: Some(title.to_string()),
            start: EventTime {
                date_time: Some(start.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn user(lead: Option<u32>, range: Option<SkillRange>) -> UserSettings {
        UserSettings {
            notification_time: lead,
            time_zone: None,
            mmr_range: range,
        }
    }

    fn due_pairs(outcome: &MatchOutcome<'_>) -> Vec<(String, String)> {
        outcome
            .due
            .iter()
            .map(|d| (d.user_id.clone(), d.event.id.clone()))
            .collect()
    }

    #[test]
    fn users_without_lead_time_are_skipped() {
        let events = vec![event("e1", "Weekly", "2024-06-01T12:10:00Z")];
        let users = [("idle", user(None, None)), ("busy", user(Some(30), None))];
        let ledger = SentLedger::in_memory(0, now());

        let outcome = find_due(users.iter().map(|(id, s)| (*id, s)), &events, now(), &ledger);
        assert_eq!(due_pairs(&outcome), vec![("busy".to_string(), "e1".to_string())]);
    }

    #[test]
    fn window_is_open_at_now_and_closed_at_cutoff() {
        let events = vec![
            event("started", "Now", "2024-06-01T12:00:00Z"),
            event("edge", "Edge", "2024-06-01T12:30:00Z"),
            event("beyond", "Beyond", "2024-06-01T12:30:01Z"),
            event("past", "Past", "2024-06-01T11:00:00Z"),
        ];
        let users = [("u", user(Some(30), None))];
        let ledger = SentLedger::in_memory(0, now());

        let outcome = find_due(users.iter().map(|(id, s)| (*id, s)), &events, now(), &ledger);
        assert_eq!(due_pairs(&outcome), vec![("u".to_string(), "edge".to_string())]);
    }

    #[test]
    fn offsets_are_compared_as_instants() {
        // 08:20 in New York is 12:20 UTC
        let events = vec![event("ny", "Cup", "2024-06-01T08:20:00-04:00")];
        let mut settings = user(Some(30), None);
        settings.time_zone = Some("Asia/Tokyo".to_string());
        let users = [("u", settings)];
        let ledger = SentLedger::in_memory(0, now());

        let outcome = find_due(users.iter().map(|(id, s)| (*id, s)), &events, now(), &ledger);
        assert_eq!(outcome.due.len(), 1);
        assert_eq!(outcome.due[0].tz, chrono_tz::Asia::Tokyo);
        assert_eq!(outcome.due[0].starts_at.to_rfc3339(), "2024-06-01T12:20:00+00:00");
    }

    #[test]
    fn already_sent_pairs_are_not_repeated() {
        let events = vec![event("e1", "Weekly", "2024-06-01T12:10:00Z")];
        let users = [("a", user(Some(30), None)), ("b", user(Some(30), None))];
        let mut ledger = SentLedger::in_memory(0, now());
        ledger.record("a", "e1");

        let outcome = find_due(users.iter().map(|(id, s)| (*id, s)), &events, now(), &ledger);
        assert_eq!(due_pairs(&outcome), vec![("b".to_string(), "e1".to_string())]);
    }

    #[test]
    fn tagged_events_need_matching_skill_range() {
        let events = vec![
            event("minor", "Cranky Minor Cup", "2024-06-01T12:10:00Z"),
            event("plain", "Community Night", "2024-06-01T12:20:00Z"),
        ];
        let users = [
            ("none", user(Some(60), None)),
            ("minor", user(Some(60), Some(SkillRange::Minor))),
            ("major", user(Some(60), Some(SkillRange::Major))),
        ];
        let ledger = SentLedger::in_memory(0, now());

        let outcome = find_due(users.iter().map(|(id, s)| (*id, s)), &events, now(), &ledger);
        let pairs = due_pairs(&outcome);
        assert!(pairs.contains(&("minor".to_string(), "minor".to_string())));
        assert!(!pairs.contains(&("major".to_string(), "minor".to_string())));
        assert!(!pairs.contains(&("none".to_string(), "minor".to_string())));
        assert_eq!(pairs.iter().filter(|(_, e)| e == "plain").count(), 3);
    }

    #[test]
    fn malformed_event_does_not_drop_the_batch() {
        let events = vec![
            event("bad", "Broken", "tomorrow-ish"),
            event("good", "Fine", "2024-06-01T12:05:00Z"),
        ];
        let mut all_day = event("allday", "Finals weekend", "");
        all_day.start = EventTime {
            date: Some("2024-06-01".to_string()),
            ..Default::default()
        };
        let events: Vec<_> = events.into_iter().chain([all_day]).collect();

        let users = [("u", user(Some(7200), None))];
        let ledger = SentLedger::in_memory(0, now());

        let outcome = find_due(users.iter().map(|(id, s)| (*id, s)), &events, now(), &ledger);
        assert_eq!(due_pairs(&outcome), vec![("u".to_string(), "good".to_string())]);
        assert_eq!(outcome.malformed, vec!["bad"]);
    }

    #[test]
    fn untitled_event_is_reported_not_sent() {
        let mut missing = event("missing", "", "2024-06-01T12:10:00Z");
        missing.summary = None;
        let events = vec![
            missing,
            event("blank", "   ", "2024-06-01T12:10:00Z"),
            event("named", "Weekly Cup #41", "2024-06-01T12:10:00Z"),
        ];
        let users = [("u", user(Some(30), None))];
        let ledger = SentLedger::in_memory(0, now());

        let outcome = find_due(users.iter().map(|(id, s)| (*id, s)), &events, now(), &ledger);
        assert_eq!(due_pairs(&outcome), vec![("u".to_string(), "named".to_string())]);
        assert_eq!(outcome.malformed, vec!["missing", "blank"]);
    }
}
