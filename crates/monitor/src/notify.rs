//! Claim notifications
//!
//! Each successful claim fans out one message to every configured channel.
//! Delivery is best effort: a failing channel is logged and counted, never
//! surfaced to the polling loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::Secret;
use tracing::{debug, warn};

use crate::client::ClientFuture;
use crate::error::Error;

/// Default Telegram Bot API base URL.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// An outbound notification channel.
pub trait Notifier: Send + Sync {
    /// Channel label for logs and metrics (e.g. "discord", "telegram")
    fn channel(&self) -> &str;

    fn notify<'a>(&'a self, message: &'a str) -> ClientFuture<'a, ()>;
}

/// Text sent when an identifier is claimed.
pub fn claim_message(identifier: &str) -> String {
    format!(
        "\u{1f680} [{}] claimed username: {identifier}",
        Utc::now().format("%H:%M:%S")
    )
}

/// Discord-style incoming webhook: `POST {url}` with `{"content": message}`.
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: Secret<String>,
    timeout: Duration,
}

impl DiscordWebhook {
    pub fn new(client: reqwest::Client, url: Secret<String>, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }
}

impl Notifier for DiscordWebhook {
    fn channel(&self) -> &str {
        "discord"
    }

    fn notify<'a>(&'a self, message: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url.expose().as_str())
                .timeout(self.timeout)
                .json(&serde_json::json!({ "content": message }))
                .send()
                .await
                // The webhook URL embeds its token; keep it out of the error.
                .map_err(|e| Error::Http(e.without_url().to_string()))?;
            check_status("discord webhook", response.status())
        })
    }
}

/// Telegram bot `sendMessage` call with form-encoded `chat_id` and `text`.
pub struct TelegramBot {
    client: reqwest::Client,
    api_base: String,
    token: Secret<String>,
    chat_id: String,
    timeout: Duration,
}

impl TelegramBot {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        token: Secret<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            token,
            chat_id: chat_id.into(),
            timeout,
        }
    }
}

impl Notifier for TelegramBot {
    fn channel(&self) -> &str {
        "telegram"
    }

    fn notify<'a>(&'a self, message: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            let url = format!(
                "{}/bot{}/sendMessage",
                self.api_base.trim_end_matches('/'),
                self.token.expose()
            );
            let response = self
                .client
                .post(url)
                .timeout(self.timeout)
                .form(&[("chat_id", self.chat_id.as_str()), ("text", message)])
                .send()
                .await
                .map_err(|e| Error::Http(e.without_url().to_string()))?;
            check_status("telegram sendMessage", response.status())
        })
    }
}

fn check_status(endpoint: &str, status: reqwest::StatusCode) -> crate::Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

/// All configured channels. An empty set is valid and sends nothing.
#[derive(Clone, Default)]
pub struct NotifierSet {
    channels: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send `message` on every channel, returning how many deliveries succeeded.
    pub async fn notify_all(&self, message: &str) -> usize {
        let mut delivered = 0;
        for channel in &self.channels {
            match channel.notify(message).await {
                Ok(()) => {
                    debug!(channel = channel.channel(), "notification sent");
                    delivered += 1;
                }
                Err(e) => {
                    warn!(channel = channel.channel(), error = %e, "notification failed");
                    metrics::counter!(
                        "turbo_notifications_failed_total",
                        "channel" => channel.channel().to_string()
                    )
                    .increment(1);
                }
            }
        }
        delivered
    }
}
