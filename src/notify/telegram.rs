//! Telegram Bot API client.

use std::time::Duration;

use tracing::debug;

use super::Notifier;
use crate::VolwatchError;
use crate::credentials::RedactedToken;
use crate::models::telegram::{ApiResponse, ChatId, SendMessageRequest, Update};

const API_BASE: &str = "https://api.telegram.org";

/// Timeout for `sendMessage` and short `getUpdates` calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time allowed on top of the long-poll timeout.
const LONG_POLL_GRACE: Duration = Duration::from_secs(5);

/// Sends messages to one destination chat and polls for bot updates.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
    token: RedactedToken,
    chat_id: ChatId,
    topic_id: Option<i64>,
}

impl TelegramClient {
    /// Creates a client that delivers alerts to `chat_id`, inside
    /// `topic_id` when set.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::Http`] if the HTTP client cannot be built.
    pub fn new(
        token: RedactedToken,
        chat_id: ChatId,
        topic_id: Option<i64>,
    ) -> crate::Result<Self> {
        Self::with_api_url(API_BASE, token, chat_id, topic_id)
    }

    /// Like [`new`](Self::new) but against a different API root.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::Http`] if the HTTP client cannot be built.
    pub fn with_api_url(
        api_url: &str,
        token: RedactedToken,
        chat_id: ChatId,
        topic_id: Option<i64>,
    ) -> crate::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
            topic_id,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token.expose())
    }

    /// Sends an HTML message to `chat_id`.
    ///
    /// `topic_id` overrides the client's default topic. With `None` the
    /// default topic is used only when `chat_id` is the alert destination.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::Http`] on transport or status failures and
    /// [`VolwatchError::Telegram`] when the API rejects the message.
    pub async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        topic_id: Option<i64>,
    ) -> crate::Result<()> {
        let topic_id = match topic_id {
            Some(id) => Some(id),
            None if *chat_id == self.chat_id => self.topic_id,
            None => None,
        };
        let request = SendMessageRequest::html(chat_id, text, topic_id);

        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if !body.ok {
            return Err(VolwatchError::Telegram(
                body.description
                    .unwrap_or_else(|| "sendMessage failed".to_string()),
            ));
        }

        debug!(?chat_id, ?topic_id, "message sent");
        Ok(())
    }

    /// Long-polls for updates after `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::Http`] on transport failures and
    /// [`VolwatchError::Telegram`] when the API answers `ok: false`
    /// (for example a conflicting poller).
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> crate::Result<Vec<Update>> {
        let mut query = vec![("timeout", timeout.as_secs().to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .timeout(timeout + LONG_POLL_GRACE)
            .query(&query)
            .send()
            .await?;

        let body: ApiResponse<Vec<Update>> = response.json().await?;
        if !body.ok {
            return Err(VolwatchError::Telegram(
                body.description
                    .unwrap_or_else(|| "getUpdates failed".to_string()),
            ));
        }
        Ok(body.result.unwrap_or_default())
    }
}

impl Notifier for TelegramClient {
    async fn deliver(&self, text: &str) -> crate::Result<()> {
        self.send_message(&self.chat_id, text, None).await
    }
}
