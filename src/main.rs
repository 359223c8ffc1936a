/// Adjutant — notification bot
///
/// Run:
///   TELEGRAM_BOT_TOKEN=... CALENDAR_EVENTS_URL=... cargo run --bin adjutant

use adjutant::config::BotConfig;
use adjutant::scheduler::Bot;
use adjutant::telegram::TelegramClient;
use anyhow::{Context, Result};
use dotenv::dotenv;
use notifier::{Clock, SentLedger, SystemClock};
use std::env;
use std::fs::File;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use user_settings::SettingsStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Single instance lock
    let lock_file_path = env::temp_dir().join("adjutant_bot.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of adjutant is already running! Exiting.");
            return Ok(());
        }
    };

    let config = BotConfig::from_env()?;
    info!("=== Adjutant ===");
    info!("Users file: {:?}", config.users_file);
    info!("Events: {:?}", config.events);
    info!("Logs: {:?}", config.log_dir);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = SettingsStore::load(&config.users_file)
        .with_context(|| format!("load user settings from {:?}", config.users_file))?;
    let ledger = SentLedger::open(&config.sent_ledger_file, config.dedup_clear_hour_utc, clock.now())?;
    info!("Dedup window {}: {} pairs already sent", ledger.window(), ledger.len());

    let telegram = TelegramClient::new(config.telegram_token.clone());

    Bot::new(config, clock, store, ledger, telegram).run().await
}
