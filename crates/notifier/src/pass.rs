use crate::clock::Clock;
use crate::ledger::SentLedger;
use crate::matcher::{find_due, DueNotification};
use anyhow::Result;
use async_trait::async_trait;
use calendar_feed::CalendarEvent;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use logger::{now_iso, DedupClearedEvent, EventLogger, NotificationFailedEvent, NotificationSentEvent};
use std::sync::Arc;
use tracing::{info, warn};
use user_settings::SettingsStore;

/// Outbound direct messages to a single user.
#[async_trait]
pub trait DirectMessenger: Send + Sync {
    async fn send_direct(&self, user_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub due:       usize,
    pub sent:      usize,
    pub failed:    usize,
    pub malformed: usize,
    /// Pairs dropped because this pass started a new dedup window
    pub cleared:   Option<usize>,
}

pub fn format_notification(event: &CalendarEvent, starts_at: DateTime<Utc>, tz: Tz) -> String {
    let start = starts_at.with_timezone(&tz).format("%B %d %Y at %I:%M %p");
    format!(
        "Event Title: {} at {}\nEvent Details: {}",
        event.title(),
        start,
        event.details_text()
    )
}

pub struct Notifier {
    clock:  Arc<dyn Clock>,
    logger: EventLogger,
}

impl Notifier {
    pub fn new(clock: Arc<dyn Clock>, logger: EventLogger) -> Self {
        Self { clock, logger }
    }

    /// Starts the window containing the clock's `now` if the ledger is behind.
    pub fn roll_window(&self, ledger: &mut SentLedger) -> Option<usize> {
        let cleared = ledger.roll_over(self.clock.now())?;
        info!("🧹 Dedup window rolled to {}: cleared {} sent pairs", ledger.window(), cleared);
        let _ = self.logger.log(&DedupClearedEvent {
            ts: now_iso(),
            event: "DEDUP_CLEARED",
            window: ledger.window().to_string(),
            cleared_pairs: cleared,
        });
        Some(cleared)
    }

    /// One scan: roll the window, match, send, record. A failed send is logged
    /// and left unrecorded so the next pass retries it while the event is
    /// still ahead.
    pub async fn run_pass(
        &self,
        store:     &SettingsStore,
        events:    &[CalendarEvent],
        ledger:    &mut SentLedger,
        messenger: &dyn DirectMessenger,
    ) -> PassReport {
        let cleared = self.roll_window(ledger);
        let now = self.clock.now();
        let outcome = find_due(store.notifiable(), events, now, ledger);

        let mut report = PassReport {
            due: outcome.due.len(),
            malformed: outcome.malformed.len(),
            cleared,
            ..Default::default()
        };

        for due in &outcome.due {
            let text = format_notification(due.event, due.starts_at, due.tz);
            match messenger.send_direct(&due.user_id, &text).await {
                Ok(()) => {
                    ledger.record(&due.user_id, &due.event.id);
                    report.sent += 1;
                    self.log_sent(due);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Notification for {} about {} failed: {:#}", due.user_id, due.event.id, e);
                    let _ = self.logger.log(&NotificationFailedEvent {
                        ts: now_iso(),
                        event: "NOTIFICATION_FAILED",
                        user_id: due.user_id.clone(),
                        event_id: due.event.id.clone(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        if report.due > 0 || report.malformed > 0 {
            info!(
                "Notification pass: {} due, {} sent, {} failed, {} malformed events",
                report.due, report.sent, report.failed, report.malformed
            );
        }
        report
    }

    fn log_sent(&self, due: &DueNotification<'_>) {
        info!("Notified {} about '{}' ({} min lead)", due.user_id, due.event.title(), due.lead_minutes);
        let _ = self.logger.log(&NotificationSentEvent {
            ts: now_iso(),
            event: "NOTIFICATION_SENT",
            user_id: due.user_id.clone(),
            event_id: due.event.id.clone(),
            title: due.event.title().to_string(),
            starts_at: due.starts_at.to_rfc3339(),
            lead_minutes: due.lead_minutes,
        });
    }
}
