/// Adjutant — Notifier
///
/// Decides who hears about which event, and when:
///   1. every opted-in user with a lead time is checked against the cached events
///   2. an event is due when it starts within (now, now + lead]
///   3. tier-tagged events only go to users with the matching skill range
///   4. each (user, event) pair is sent at most once per daily window

mod clock;
mod ledger;
mod matcher;
mod pass;

pub use clock::{Clock, SystemClock};
pub use ledger::SentLedger;
pub use matcher::{find_due, DueNotification, MatchOutcome};
pub use pass::{format_notification, DirectMessenger, Notifier, PassReport};
