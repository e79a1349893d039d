use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Sender;
use crate::error::SendError;
use crate::store::Deadline;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

#[derive(Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Delivers messages through a Telegram bot into one configured chat. The
/// recipient is named in the message text.
pub struct TelegramSender {
    client: reqwest::Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramSender {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url.trim_end_matches('/'), self.token)
    }
}

#[async_trait]
impl Sender for TelegramSender {
    async fn send(
        &self,
        deadline: &Deadline,
        recipient: &str,
        payload: &str,
    ) -> Result<(), SendError> {
        if deadline.is_expired() {
            return Err(SendError::DeadlineExceeded);
        }

        let body = SendMessage {
            chat_id: &self.chat_id,
            text: format!("{recipient}: {payload}"),
        };
        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(remaining) = deadline.remaining() {
            request = request.timeout(remaining);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SendError::DeadlineExceeded
            } else {
                SendError::Transport(e.without_url().to_string())
            }
        })?;
        let status = response.status();
        let parsed: BotResponse = response
            .json()
            .await
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;

        if !status.is_success() || !parsed.ok {
            let reason = parsed
                .description
                .unwrap_or_else(|| format!("http status {status}"));
            log::warn!("telegram sender: message for {} rejected: {}", recipient, reason);
            return Err(SendError::Rejected(reason));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn endpoint_embeds_the_bot_token() {
        let sender = TelegramSender::new("https://api.telegram.org/", "123:abc", "42");
        assert_eq!(sender.endpoint(), "https://api.telegram.org/bot123:abc/sendMessage");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_skips_the_request() {
        let sender = TelegramSender::new("http://127.0.0.1:9", "t", "42");
        let deadline = Deadline::after(Duration::from_millis(1));
        tokio::time::advance(Duration::from_millis(5)).await;

        assert_eq!(
            sender.send(&deadline, "u@test.local", "hello").await,
            Err(SendError::DeadlineExceeded)
        );
    }
}
