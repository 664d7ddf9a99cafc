//! Telegram notifier.

use crate::error::NotifierError;
use crate::services::{api_error, Notifier};
use log::info;
use reqwest::blocking::Client;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Posts summaries to a chat through a bot.
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(http: Client, bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.bot_token)
    }
}

/// Chat messages have no subject line, so it leads the text.
fn message_text(subject: &str, body: &str) -> String {
    format!("{}\n\n{}", subject, body.trim_end())
}

impl Notifier for TelegramNotifier {
    fn send(&self, subject: &str, body: &str) -> Result<(), NotifierError> {
        let response = self
            .http
            .post(self.send_url())
            .json(&json!({
                "chat_id": self.chat_id,
                "text": message_text(subject, body),
            }))
            .send()?;
        if !response.status().is_success() {
            let (status, message) = api_error(response);
            return Err(NotifierError::Api { status, message });
        }
        info!("posted summary to telegram chat {}", self.chat_id);
        Ok(())
    }
}
