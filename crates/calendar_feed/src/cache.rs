use crate::event::CalendarEvent;
use crate::source::EventSource;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Latest snapshot of upcoming events.
#[derive(Debug, Default)]
pub struct CalendarCache {
    events: Vec<CalendarEvent>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl CalendarCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot with the source's next `max_results` events.
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&mut self, source: &dyn EventSource, now: DateTime<Utc>, max_results: usize) -> Result<usize> {
        match source.upcoming(now, max_results).await {
            Ok(events) => {
                info!("Calendar cache refreshed from {}: {} events (was {})", source.name(), events.len(), self.events.len());
                self.events = events;
                self.refreshed_at = Some(now);
                Ok(self.events.len())
            }
            Err(e) => {
                warn!("Calendar refresh from {} failed, keeping {} cached events: {:#}", source.name(), self.events.len(), e);
                Err(e)
            }
        }
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Cached events not yet started at `now`, in start order.
    pub fn upcoming(&self, now: DateTime<Utc>, limit: usize) -> Vec<&CalendarEvent> {
        let mut keyed: Vec<_> = self
            .events
            .iter()
            .filter_map(|ev| ev.sort_instant().map(|at| (at, ev)))
            .filter(|(at, _)| *at >= now)
            .collect();
        keyed.sort_by_key(|(at, _)| *at);
        keyed.into_iter().take(limit).map(|(_, ev)| ev).collect()
    }
}
