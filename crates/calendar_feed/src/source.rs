use crate::event::{CalendarEvent, EventsPage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Lists upcoming events: starting at or after `from`, ordered by start,
/// recurring events expanded, at most `max_results`.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    async fn upcoming(&self, from: DateTime<Utc>, max_results: usize) -> Result<Vec<CalendarEvent>>;
}

// ── HTTP ─────────────────────────────────────────────────────────────────────

/// Calendar events list endpoint (`.../calendars/<id>/events`).
pub struct HttpEventSource {
    client:  reqwest::Client,
    url:     String,
    api_key: Option<String>,
}

impl HttpEventSource {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("adjutant/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn upcoming(&self, from: DateTime<Utc>, max_results: usize) -> Result<Vec<CalendarEvent>> {
        let mut query = vec![
            ("timeMin", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }

        let resp = self.client.get(&self.url)
            .query(&query)
            .send().await.context("calendar events request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("calendar HTTP {}: {}", status, snippet(&body));
        }

        let body = resp.text().await?;
        let page: EventsPage = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse events list: {}", snippet(&body)))?;

        debug!("calendar returned {} events", page.items.len());
        Ok(page.items)
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

// ── File ─────────────────────────────────────────────────────────────────────

/// Events list JSON on disk, same shape as the HTTP response.
pub struct FileEventSource {
    path: PathBuf,
}

impl FileEventSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSource for FileEventSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn upcoming(&self, from: DateTime<Utc>, max_results: usize) -> Result<Vec<CalendarEvent>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read events file {:?}", self.path))?;
        let page: EventsPage = serde_json::from_str(&raw)
            .with_context(|| format!("parse events file {:?}", self.path))?;

        let mut keyed = Vec::with_capacity(page.items.len());
        for ev in page.items {
            match ev.sort_instant() {
                Some(at) if at >= from => keyed.push((at, ev)),
                Some(_) => {}
                None => warn!("Skipping event {} with unreadable start {:?}", ev.id, ev.start),
            }
        }
        keyed.sort_by_key(|(at, _)| *at);
        keyed.truncate(max_results);
        Ok(keyed.into_iter().map(|(_, ev)| ev).collect())
    }
}
