//! Prints the next upcoming events from the configured calendar source.
//!
//! Usage:
//!   cargo run --bin adjutant-events -- [count] [time zone]

use adjutant::commands::render_event_list;
use adjutant::config::events_location_from_env;
use adjutant::scheduler::event_source;
use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use dotenv::dotenv;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};
use user_settings::DEFAULT_TIME_ZONE;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        )
        .init();

    let mut args = env::args().skip(1);
    let count = args
        .next()
        .map(|a| a.parse::<usize>().with_context(|| format!("count must be a number, got {a:?}")))
        .transpose()?
        .unwrap_or(7);
    let zone = args.next().unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());
    let tz: Tz = zone
        .parse()
        .map_err(|e| anyhow::anyhow!("unknown time zone {zone:?}: {e}"))?;

    let source = event_source(&events_location_from_env()?);
    info!("Fetching {} events from {}", count, source.name());

    let events = source.upcoming(Utc::now(), count).await?;
    println!("{}", render_event_list(&events, tz));
    Ok(())
}
