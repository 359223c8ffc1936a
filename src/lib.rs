/// Adjutant — esports event reminders over Telegram
///
/// Runs as one loop:
///   1. Every few minutes matches opted-in users against the cached calendar
///   2. Sends one direct message per (user, event) inside the user's lead time
///   3. Refreshes the calendar cache hourly, rolls the dedup window daily
///   4. Answers chat commands (opt in/out, lead time, time zone, skill range)

pub mod commands;
pub mod config;
pub mod scheduler;
pub mod telegram;
