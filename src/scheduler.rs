use crate::commands::{self, Command, Outcome};
use crate::config::{BotConfig, EventsLocation};
use crate::telegram::{IncomingText, TelegramClient, TgUpdatesResponse};
use anyhow::Result;
use async_trait::async_trait;
use calendar_feed::{CalendarCache, EventSource, FileEventSource, HttpEventSource};
use logger::{now_iso, CalendarRefreshEvent, CommandEvent, EventLogger, SystemHeartbeatEvent};
use notifier::{Clock, DirectMessenger, Notifier, SentLedger};
use std::sync::Arc;
use tokio::time::{interval, interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use user_settings::{SettingsStore, UserSettings};

const DEDUP_CHECK_SECS: u64 = 60;
const HEARTBEAT_SECS: u64 = 600;

pub fn event_source(location: &EventsLocation) -> Box<dyn EventSource> {
    match location {
        EventsLocation::Http { url, api_key } => Box::new(HttpEventSource::new(url.clone(), api_key.clone())),
        EventsLocation::File(path) => Box::new(FileEventSource::new(path.clone())),
    }
}

/// Chat side of the bot: command updates in, replies and reminders out.
#[async_trait]
pub trait ChatTransport: DirectMessenger {
    async fn bot_username(&self) -> Result<Option<String>>;

    async fn updates(&self, offset: i64) -> Result<TgUpdatesResponse>;

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Owns every piece of state; one task, no locks.
pub struct Bot<T: ChatTransport = TelegramClient> {
    config:       BotConfig,
    clock:        Arc<dyn Clock>,
    store:        SettingsStore,
    cache:        CalendarCache,
    source:       Box<dyn EventSource>,
    ledger:       SentLedger,
    notifier:     Notifier,
    chat:         T,
    logger:       EventLogger,
    bot_username: Option<String>,
    offset:       i64,
}

impl<T: ChatTransport> Bot<T> {
    pub fn new(config: BotConfig, clock: Arc<dyn Clock>, store: SettingsStore, ledger: SentLedger, chat: T) -> Self {
        let source = event_source(&config.events);
        Self::with_source(config, clock, store, ledger, chat, source)
    }

    pub fn with_source(
        config: BotConfig,
        clock: Arc<dyn Clock>,
        store: SettingsStore,
        ledger: SentLedger,
        chat: T,
        source: Box<dyn EventSource>,
    ) -> Self {
        Self {
            notifier: Notifier::new(clock.clone(), EventLogger::new(&config.log_dir)),
            logger: EventLogger::new(&config.log_dir),
            cache: CalendarCache::new(),
            clock,
            store,
            source,
            ledger,
            chat,
            config,
            bot_username: None,
            offset: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        match self.chat.bot_username().await {
            Ok(name) => {
                info!("Telegram bot: @{}", name.as_deref().unwrap_or("?"));
                self.bot_username = name;
            }
            Err(e) => warn!("getMe failed, accepting any /command@suffix: {:#}", e),
        }

        self.refresh_calendar().await;

        let refresh_period = Duration::from_secs(self.config.refresh_interval_secs);
        let mut notify_ticker = interval(Duration::from_secs(self.config.notify_interval_secs));
        let mut refresh_ticker = interval_at(Instant::now() + refresh_period, refresh_period);
        let mut dedup_ticker = interval(Duration::from_secs(DEDUP_CHECK_SECS));
        let mut command_ticker = interval(Duration::from_secs(self.config.command_poll_secs));
        let mut heartbeat_ticker = interval(Duration::from_secs(HEARTBEAT_SECS));
        command_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        notify_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Adjutant running: notify every {}s, refresh every {}s, {} users",
            self.config.notify_interval_secs,
            self.config.refresh_interval_secs,
            self.store.len()
        );

        loop {
            tokio::select! {
                _ = notify_ticker.tick() => self.notify_pass().await,
                _ = refresh_ticker.tick() => { self.refresh_calendar().await; }
                _ = dedup_ticker.tick() => self.roll_dedup_window(),
                _ = command_ticker.tick() => self.poll_commands().await,
                _ = heartbeat_ticker.tick() => self.heartbeat(),
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// False when the source failed and the previous snapshot was kept.
    async fn refresh_calendar(&mut self) -> bool {
        let now = self.clock.now();
        let result = self.cache.refresh(self.source.as_ref(), now, self.config.refresh_max_results).await;
        let (ok, message) = match &result {
            Ok(_) => (true, String::new()),
            Err(e) => (false, format!("{e:#}")),
        };
        let _ = self.logger.log(&CalendarRefreshEvent {
            ts: now_iso(),
            event: "CALENDAR_REFRESH",
            source: self.source.name().to_string(),
            ok,
            items: self.cache.len(),
            message,
        });
        ok
    }

    async fn notify_pass(&mut self) {
        self.notifier
            .run_pass(&self.store, self.cache.events(), &mut self.ledger, &self.chat)
            .await;
    }

    fn roll_dedup_window(&mut self) {
        self.notifier.roll_window(&mut self.ledger);
    }

    fn heartbeat(&self) {
        let notifiable = self.store.notifiable().count();
        info!(
            "💓 {} users ({} notifiable), {} cached events, {} sent this window",
            self.store.len(),
            notifiable,
            self.cache.len(),
            self.ledger.len()
        );
        let _ = self.logger.log(&SystemHeartbeatEvent {
            ts: now_iso(),
            event: "SYSTEM_HEARTBEAT",
            users: self.store.len(),
            notifiable_users: notifiable,
            cached_events: self.cache.len(),
            sent_this_window: self.ledger.len(),
        });
    }

    async fn poll_commands(&mut self) {
        let updates = match self.chat.updates(self.offset).await {
            Ok(u) => u,
            Err(e) => {
                warn!("getUpdates error: {:#}", e);
                return;
            }
        };
        self.offset = updates.next_offset(self.offset);

        for msg in updates.texts() {
            let Some(cmd) = Command::parse(&msg.text, self.bot_username.as_deref()) else {
                continue;
            };
            self.execute(&msg, &cmd).await;
        }
    }

    async fn execute(&mut self, msg: &IncomingText, cmd: &Command) {
        let is_owner = self.config.is_owner(&msg.user_id);
        let (reply, ok) = match commands::handle(&mut self.store, &msg.user_id, is_owner, cmd) {
            Outcome::Reply { text, ok } => (text, ok),
            Outcome::ListEvents => (self.list_events(&msg.user_id).await, true),
            Outcome::Refresh { notify } => {
                let refreshed = self.refresh_calendar().await;
                let items = self.cache.len();
                if notify {
                    self.notify_pass().await;
                }
                match (refreshed, notify) {
                    (true, false) => (format!("Synced! {items} upcoming events cached."), true),
                    (true, true) => (format!("Crawled! {items} upcoming events cached, notifications checked."), true),
                    (false, _) => (format!("Calendar refresh failed, keeping {items} cached events."), false),
                }
            }
        };

        info!("/{} from {} → {}", cmd.name(), msg.user_id, if ok { "ok" } else { "rejected" });
        let _ = self.logger.log(&CommandEvent {
            ts: now_iso(),
            event: "COMMAND",
            user_id: msg.user_id.clone(),
            command: cmd.name().to_string(),
            ok,
        });

        if let Err(e) = self.chat.reply(msg.chat_id, &reply).await {
            error!("Reply to {} failed: {:#}", msg.chat_id, e);
        }
    }

    /// Fresh fetch so the listing is current; the cache covers a failed fetch.
    async fn list_events(&self, user_id: &str) -> String {
        let tz = self
            .store
            .get(user_id)
            .map(UserSettings::tz)
            .unwrap_or_else(|| UserSettings::default().tz());
        let now = self.clock.now();
        let max = self.config.list_events_max;

        match self.source.upcoming(now, max).await {
            Ok(events) => commands::render_event_list(&events, tz),
            Err(e) => {
                warn!("list_events fetch failed, using cache: {:#}", e);
                commands::render_event_list(self.cache.upcoming(now, max), tz)
            }
        }
    }
}
