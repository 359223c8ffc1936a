use calendar_feed::{CalendarEvent, EventTimeError};
use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::error;
use user_settings::{SettingsError, SettingsStore, SkillRange, SKILL_RANGE_MENU, TIME_ZONE_MENU};

pub const HELP_TEXT: &str = "Adjutant — esports event reminders\n\n\
Step 1. /opt_in\n\
Step 2. /set_notification <minutes>\n\
This is the amount of time prior to an event in which you'd like to be notified. \
It must be within a range of 5 minutes to 5 days.\n\n\
Other commands\n\
/set_timezone - pick the time zone used in your reminders\n\
/set_mmr_range - only hear about tournaments for your skill range\n\
/list_events - show the next upcoming events\n\
/opt_out - remove yourself from the notification list";

const OWNER_ONLY: &str = "Sorry, only the bot owner can execute this command.";
const NOT_OPTED_IN: &str = "You need to opt in first!";
const SAVE_FAILED: &str = "Sorry, your settings could not be saved. Please try again later.";
const INVALID_LEAD_TIME: &str = "Invalid notification time. Must be between 5 minutes and 5 days.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    OptIn,
    OptOut,
    SetNotification(Option<String>),
    SetTimezone(Option<String>),
    SetMmrRange(Option<String>),
    ListEvents,
    Sync,
    Crawl,
}

impl Command {
    /// `None` for plain text, unknown commands and commands addressed to another bot.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, arg) = match rest.split_once(char::is_whitespace) {
            Some((head, arg)) => (head, Some(arg.trim())),
            None => (rest, None),
        };
        let arg = arg.filter(|a| !a.is_empty()).map(str::to_string);

        let name = match head.split_once('@') {
            Some((name, target)) => {
                if let Some(me) = bot_username {
                    if !target.eq_ignore_ascii_case(me) {
                        return None;
                    }
                }
                name
            }
            None => head,
        };

        let cmd = match name.to_lowercase().as_str() {
            "start" => Command::Start,
            "help" | "usage" | "embed" => Command::Help,
            "opt_in" => Command::OptIn,
            "opt_out" => Command::OptOut,
            "set_notification" => Command::SetNotification(arg),
            "set_timezone" | "set_time_zone" => Command::SetTimezone(arg),
            "set_mmr_range" => Command::SetMmrRange(arg),
            "list_events" => Command::ListEvents,
            "sync" => Command::Sync,
            "crawl" => Command::Crawl,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::OptIn => "opt_in",
            Command::OptOut => "opt_out",
            Command::SetNotification(_) => "set_notification",
            Command::SetTimezone(_) => "set_timezone",
            Command::SetMmrRange(_) => "set_mmr_range",
            Command::ListEvents => "list_events",
            Command::Sync => "sync",
            Command::Crawl => "crawl",
        }
    }
}

/// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Done; send this text back. `ok` is false for rejected requests.
    Reply { text: String, ok: bool },
    /// Fetch the next events and render them for the caller
    ListEvents,
    /// Refresh the calendar cache; `notify` also runs a pass right after
    Refresh { notify: bool },
}

impl Outcome {
    fn ok(text: impl Into<String>) -> Self {
        Outcome::Reply { text: text.into(), ok: true }
    }

    fn rejected(text: impl Into<String>) -> Self {
        Outcome::Reply { text: text.into(), ok: false }
    }
}

pub fn time_zone_menu() -> String {
    let mut out = String::from("Please select your time zone:\n");
    for (i, (zone, label)) in TIME_ZONE_MENU.iter().enumerate() {
        out.push_str(&format!("{}. {} ({})\n", i + 1, zone, label));
    }
    out.push_str("Reply with /set_timezone <number>");
    out
}

pub fn skill_range_menu() -> String {
    let mut out = String::from("Select your MMR range:\n");
    for (i, (_, label)) in SKILL_RANGE_MENU.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, label));
    }
    out.push_str("Reply with /set_mmr_range <number>");
    out
}

fn skill_range_reply(range: SkillRange) -> &'static str {
    match range {
        SkillRange::Basic => "MMR range set to Platinum",
        SkillRange::Minor => "MMR range set to Diamond",
        SkillRange::Major => "MMR range set to Masters+",
        SkillRange::OpenGm => "MMR range set to Open/GM",
    }
}

fn zone_label(zone: &str) -> &'static str {
    TIME_ZONE_MENU
        .iter()
        .find(|(z, _)| *z == zone)
        .map(|(_, label)| *label)
        .unwrap_or("")
}

fn storage_failure(user_id: &str, e: SettingsError) -> Outcome {
    error!("Saving settings for {} failed: {}", user_id, e);
    Outcome::rejected(SAVE_FAILED)
}

/// Applies a command to the settings store. Anything needing the network is
/// returned as an [`Outcome`] for the caller to carry out.
pub fn handle(store: &mut SettingsStore, user_id: &str, is_owner: bool, cmd: &Command) -> Outcome {
    match cmd {
        Command::Start | Command::Help => Outcome::ok(HELP_TEXT),

        Command::OptIn => match store.opt_in(user_id) {
            Ok(()) => Outcome::ok("You are now opted in for notifications!"),
            Err(SettingsError::AlreadyOptedIn) => Outcome::rejected("You are already opted in!"),
            Err(e) => storage_failure(user_id, e),
        },

        Command::OptOut => match store.opt_out(user_id) {
            Ok(()) => Outcome::ok("You are now opted out from notifications!"),
            Err(SettingsError::NotOptedIn) => Outcome::rejected("You are already opted out!"),
            Err(e) => storage_failure(user_id, e),
        },

        Command::SetNotification(arg) => {
            if !store.is_opted_in(user_id) {
                return Outcome::rejected(NOT_OPTED_IN);
            }
            let Some(minutes) = arg.as_deref().and_then(|a| a.parse::<i64>().ok()) else {
                return Outcome::rejected(format!("{INVALID_LEAD_TIME}\nUsage: /set_notification <minutes>"));
            };
            match store.set_lead_time(user_id, minutes) {
                Ok(m) => Outcome::ok(format!("Notification time set to {m} minutes.\n\n{}", time_zone_menu())),
                Err(SettingsError::LeadTimeOutOfRange(_)) => Outcome::rejected(INVALID_LEAD_TIME),
                Err(e) => storage_failure(user_id, e),
            }
        }

        Command::SetTimezone(arg) => {
            if !store.is_opted_in(user_id) {
                return Outcome::rejected(NOT_OPTED_IN);
            }
            let Some(choice) = arg else {
                return Outcome::ok(time_zone_menu());
            };
            match store.set_time_zone(user_id, choice) {
                Ok(zone) => Outcome::ok(format!("Your time zone is set to {}.", zone_label(zone))),
                Err(SettingsError::UnknownTimeZone(_)) => {
                    Outcome::rejected(format!("Unknown time zone.\n{}", time_zone_menu()))
                }
                Err(e) => storage_failure(user_id, e),
            }
        }

        Command::SetMmrRange(arg) => {
            if !store.is_opted_in(user_id) {
                return Outcome::rejected(NOT_OPTED_IN);
            }
            let Some(choice) = arg else {
                return Outcome::ok(skill_range_menu());
            };
            match store.set_skill_range(user_id, choice) {
                Ok(range) => Outcome::ok(skill_range_reply(range)),
                Err(SettingsError::UnknownSkillRange(_)) => {
                    Outcome::rejected(format!("Unknown MMR range.\n{}", skill_range_menu()))
                }
                Err(e) => storage_failure(user_id, e),
            }
        }

        Command::ListEvents => Outcome::ListEvents,

        Command::Sync | Command::Crawl if !is_owner => Outcome::rejected(OWNER_ONLY),
        Command::Sync => Outcome::Refresh { notify: false },
        Command::Crawl => Outcome::Refresh { notify: true },
    }
}

/// Event listing in the reader's zone.
pub fn render_event_list<'a>(events: impl IntoIterator<Item = &'a CalendarEvent>, tz: Tz) -> String {
    let mut out = String::from("Upcoming Events\n");
    let mut count = 0;

    for ev in events {
        let when = match ev.start_instant() {
            Ok(at) => at.with_timezone(&tz).format("%B %d %Y at %I:%M %p").to_string(),
            Err(EventTimeError::AllDay) => ev
                .start
                .date
                .as_deref()
                .and_then(|d| d.parse::<NaiveDate>().ok())
                .map(|d| format!("{} (all day)", d.format("%B %d %Y")))
                .unwrap_or_else(|| "all day".to_string()),
            Err(_) => continue,
        };
        count += 1;
        out.push_str(&format!("\n{}\n{}\n", ev.title(), when));
        let details = ev.details_text();
        if !details.is_empty() {
            out.push_str(&details);
            out.push('\n');
        }
    }

    if count == 0 {
        return "No upcoming events found.".to_string();
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_feed::EventTime;
    use user_settings::UserSettings;

    fn reply_text(outcome: Outcome) -> String {
        match outcome {
            Outcome::Reply { text, .. } => text,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(Command::parse("/opt_in", None), Some(Command::OptIn));
        assert_eq!(
            Command::parse("  /set_notification   45 ", None),
            Some(Command::SetNotification(Some("45".to_string())))
        );
        assert_eq!(Command::parse("/set_timezone", None), Some(Command::SetTimezone(None)));
        assert_eq!(Command::parse("/LIST_EVENTS", None), Some(Command::ListEvents));
        assert_eq!(Command::parse("/embed", None), Some(Command::Help));
        assert_eq!(Command::parse("hello", None), None);
        assert_eq!(Command::parse("/dance", None), None);
    }

    #[test]
    fn bot_suffix_must_name_this_bot() {
        assert_eq!(Command::parse("/sync@adjutant_bot", Some("Adjutant_Bot")), Some(Command::Sync));
        assert_eq!(Command::parse("/sync@other_bot", Some("adjutant_bot")), None);
        assert_eq!(Command::parse("/crawl@anything", None), Some(Command::Crawl));
    }

    #[test]
    fn opt_in_and_out_replies() {
        let mut store = SettingsStore::ephemeral([]);
        assert_eq!(reply_text(handle(&mut store, "1", false, &Command::OptIn)), "You are now opted in for notifications!");
        assert_eq!(reply_text(handle(&mut store, "1", false, &Command::OptIn)), "You are already opted in!");
        assert_eq!(reply_text(handle(&mut store, "1", false, &Command::OptOut)), "You are now opted out from notifications!");
        assert_eq!(reply_text(handle(&mut store, "1", false, &Command::OptOut)), "You are already opted out!");
        assert!(store.is_empty());
    }

    #[test]
    fn set_notification_validates_and_offers_zone_menu() {
        let mut store = SettingsStore::ephemeral([]);
        let set = |m: &str| Command::SetNotification(Some(m.to_string()));

        assert_eq!(reply_text(handle(&mut store, "1", false, &set("30"))), NOT_OPTED_IN);

        handle(&mut store, "1", false, &Command::OptIn);
        let outcome = handle(&mut store, "1", false, &set("4"));
        assert_eq!(outcome, Outcome::Reply { text: INVALID_LEAD_TIME.to_string(), ok: false });
        assert_eq!(store.get("1").unwrap().notification_time, None);

        let text = reply_text(handle(&mut store, "1", false, &set("7200")));
        assert!(text.starts_with("Notification time set to 7200 minutes."));
        assert!(text.contains("1. America/Los_Angeles (Pacific Time)"));
        assert_eq!(store.get("1").unwrap().notification_time, Some(7200));

        let text = reply_text(handle(&mut store, "1", false, &Command::SetNotification(Some("soon".to_string()))));
        assert!(text.contains("Usage: /set_notification"));
    }

    #[test]
    fn time_zone_menu_and_choice() {
        let mut store = SettingsStore::ephemeral([("1".to_string(), UserSettings::default())]);

        let menu = reply_text(handle(&mut store, "1", false, &Command::SetTimezone(None)));
        assert!(menu.contains("10. Australia/Sydney (Australian Eastern Time)"));

        let text = reply_text(handle(&mut store, "1", false, &Command::SetTimezone(Some("4".to_string()))));
        assert_eq!(text, "Your time zone is set to Eastern Time.");
        assert_eq!(store.get("1").unwrap().time_zone.as_deref(), Some("America/New_York"));

        let outcome = handle(&mut store, "1", false, &Command::SetTimezone(Some("Mars".to_string())));
        assert!(matches!(outcome, Outcome::Reply { ok: false, .. }));
        assert_eq!(store.get("1").unwrap().time_zone.as_deref(), Some("America/New_York"));
    }

    #[test]
    fn mmr_range_choice() {
        let mut store = SettingsStore::ephemeral([("1".to_string(), UserSettings::default())]);
        let menu = reply_text(handle(&mut store, "1", false, &Command::SetMmrRange(None)));
        assert!(menu.contains("2. Minor/High diamond/Masters"));

        let text = reply_text(handle(&mut store, "1", false, &Command::SetMmrRange(Some("major".to_string()))));
        assert_eq!(text, "MMR range set to Masters+");
        assert_eq!(store.get("1").unwrap().mmr_range, Some(SkillRange::Major));
    }

    #[test]
    fn sync_and_crawl_are_owner_only() {
        let mut store = SettingsStore::ephemeral([]);
        assert_eq!(reply_text(handle(&mut store, "5", false, &Command::Sync)), OWNER_ONLY);
        assert_eq!(reply_text(handle(&mut store, "5", false, &Command::Crawl)), OWNER_ONLY);
        assert_eq!(handle(&mut store, "5", true, &Command::Sync), Outcome::Refresh { notify: false });
        assert_eq!(handle(&mut store, "5", true, &Command::Crawl), Outcome::Refresh { notify: true });
        assert_eq!(handle(&mut store, "5", false, &Command::ListEvents), Outcome::ListEvents);
    }

    #[test]
    fn event_list_uses_reader_zone_and_strips_markup() {
        let events = vec![
            CalendarEvent {
                id: "a".to_string(),
                summary: Some("Major Qualifier".to_string()),
                description: Some("<p>Sign up</p><p>Bo1</p>".to_string()),
                start: EventTime {
                    date_time: Some("2024-06-01T18:00:00Z".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            CalendarEvent {
                id: "b".to_string(),
                summary: Some("Community Day".to_string()),
                start: EventTime {
                    date: Some("2024-06-02".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        let text = render_event_list(&events, chrono_tz::Asia::Tokyo);
        assert_eq!(
            text,
            "Upcoming Events\n\nMajor Qualifier\nJune 02 2024 at 03:00 AM\nSign up\nBo1\n\nCommunity Day\nJune 02 2024 (all day)"
        );

        assert_eq!(render_event_list(Vec::<&CalendarEvent>::new(), chrono_tz::UTC), "No upcoming events found.");
    }
}
