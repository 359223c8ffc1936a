/// Adjutant — Calendar Feed
///
/// Upcoming esports events from the shared tournament calendar:
///   - `CalendarEvent` mirrors the calendar's JSON event resource
///   - `EventSource` lists upcoming single-instance events (HTTP or JSON file)
///   - `CalendarCache` holds the latest snapshot, replaced wholesale on refresh

mod cache;
mod event;
mod html;
mod source;

pub use cache::CalendarCache;
pub use event::{CalendarEvent, EventTime, EventTimeError, EventsPage};
pub use html::html_to_text;
pub use source::{EventSource, FileEventSource, HttpEventSource};
