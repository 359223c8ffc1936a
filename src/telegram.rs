use crate::scheduler::ChatTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use notifier::DirectMessenger;
use serde::Deserialize;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Bot API allows ~30 messages per second across all chats
const SENDS_PER_SECOND: u32 = 25;
/// Bot API hard limit is 4096 UTF-16 units; stay below it in chars
const MAX_MESSAGE_CHARS: usize = 4000;

// ── Bot API payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TgUpdatesResponse {
    pub ok:     bool,
    #[serde(default)]
    pub result: Vec<TgUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    pub message:   Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat:       TgChat,
    pub from:       Option<TgUser>,
    pub text:       Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TgUser {
    pub id:       i64,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgMeResponse {
    result: TgUser,
}

/// A text message addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingText {
    pub chat_id: i64,
    pub user_id: String,
    pub text:    String,
}

impl TgUpdatesResponse {
    /// Offset to acknowledge everything in this batch.
    pub fn next_offset(&self, current: i64) -> i64 {
        self.result.iter().map(|u| u.update_id + 1).fold(current, i64::max)
    }

    pub fn texts(&self) -> Vec<IncomingText> {
        self.result
            .iter()
            .filter_map(|u| u.message.as_ref())
            .filter_map(|m| {
                let text = m.text.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                let user_id = m.from.as_ref().map(|f| f.id).unwrap_or(m.chat.id);
                Some(IncomingText {
                    chat_id: m.chat.id,
                    user_id: user_id.to_string(),
                    text: text.to_string(),
                })
            })
            .collect()
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct TelegramClient {
    client:  reqwest::Client,
    token:   String,
    limiter: DefaultDirectRateLimiter,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(SENDS_PER_SECOND).unwrap_or(NonZeroU32::MIN));
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("adjutant/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            token: token.into(),
            limiter: RateLimiter::direct(quota),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    /// Bot username, used to accept `/command@username`.
    pub async fn get_me(&self) -> Result<Option<String>> {
        let resp = self.client.get(self.url("getMe")).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("getMe HTTP {}: {}", status, snippet(&body));
        }
        let me: TgMeResponse = resp.json().await.context("Failed to parse getMe")?;
        Ok(me.result.username)
    }

    pub async fn get_updates(&self, offset: i64) -> Result<TgUpdatesResponse> {
        let resp = self.client
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "0".to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("getUpdates HTTP {}: {}", status, snippet(&body));
        }
        let parsed: TgUpdatesResponse = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse getUpdates: {}", snippet(&body)))?;
        Ok(parsed)
    }

    /// Long texts go out as several messages; see [`Delivery`].
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Delivery> {
        let delivery = deliver(split_message(text), |chunk| self.post_chunk(chat_id, chunk)).await?;
        debug!("sent {}/{} parts to chat {}", delivery.sent, delivery.total, chat_id);
        Ok(delivery)
    }

    async fn post_chunk(&self, chat_id: i64, chunk: String) -> Result<()> {
        self.limiter.until_ready().await;
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": chunk,
            "disable_web_page_preview": true,
        });
        let resp = self.client.post(self.url("sendMessage")).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage failed: {} — {}", status, snippet(&body));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectMessenger for TelegramClient {
    /// Private chat id equals the user id. A partly delivered text counts as
    /// sent, so a retry never repeats the parts the user already has.
    async fn send_direct(&self, user_id: &str, text: &str) -> Result<()> {
        let chat_id: i64 = user_id
            .parse()
            .with_context(|| format!("user id {user_id:?} is not a Telegram chat id"))?;
        self.send_message(chat_id, text).await.map(|_| ())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn bot_username(&self) -> Result<Option<String>> {
        self.get_me().await
    }

    async fn updates(&self, offset: i64) -> Result<TgUpdatesResponse> {
        self.get_updates(offset).await
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await.map(|_| ())
    }
}

/// How many parts of a split message reached the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub sent:  usize,
    pub total: usize,
}

/// Posts parts in order and stops at the first failure. It is an error only
/// when nothing went out.
async fn deliver<F, Fut>(chunks: Vec<String>, mut post: F) -> Result<Delivery>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let total = chunks.len();
    for (sent, chunk) in chunks.into_iter().enumerate() {
        if let Err(e) = post(chunk).await {
            if sent == 0 {
                return Err(e);
            }
            warn!("Message cut short after {}/{} parts: {:#}", sent, total, e);
            return Ok(Delivery { sent, total });
        }
    }
    Ok(Delivery { sent: total, total })
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Splits on line boundaries where possible.
fn split_message(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > MAX_MESSAGE_CHARS && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > MAX_MESSAGE_CHARS {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(MAX_MESSAGE_CHARS) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}
