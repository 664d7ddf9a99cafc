//! Gmail notifier.

use crate::error::NotifierError;
use crate::services::google_auth::OAuthToken;
use crate::services::{api_error, Notifier};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use chrono::Utc;
use log::info;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::cell::RefCell;

pub const DEFAULT_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// Sends summaries from the authorized user's mailbox.
///
/// The token is refreshed in memory when it has expired; persisting the
/// refreshed token is the job of the credential refresh run.
pub struct GmailNotifier {
    http: Client,
    send_url: String,
    recipient: String,
    token: RefCell<OAuthToken>,
}

impl GmailNotifier {
    pub fn new(http: Client, token: OAuthToken, recipient: impl Into<String>) -> Self {
        Self {
            http,
            send_url: DEFAULT_SEND_URL.to_string(),
            recipient: recipient.into(),
            token: RefCell::new(token),
        }
    }
}

impl Notifier for GmailNotifier {
    fn send(&self, subject: &str, body: &str) -> Result<(), NotifierError> {
        let access_token = self.token.borrow_mut().access_token(&self.http, Utc::now())?;
        let raw = URL_SAFE.encode(mime_message(&self.recipient, subject, body));

        let response = self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&json!({ "raw": raw }))
            .send()?;
        if !response.status().is_success() {
            let (status, message) = api_error(response);
            return Err(NotifierError::Api { status, message });
        }
        let sent: SentMessage = response.json()?;
        info!("sent summary to {} (message id {})", self.recipient, sent.id);
        Ok(())
    }
}

/// A single-part plain text message.
fn mime_message(to: &str, subject: &str, body: &str) -> String {
    format!(
        "Content-Type: text/plain; charset=\"utf-8\"\r\n\
         MIME-Version: 1.0\r\n\
         Content-Transfer-Encoding: base64\r\n\
         to: {}\r\n\
         subject: {}\r\n\
         \r\n\
         {}\r\n",
        to,
        encode_header(subject),
        wrap_base64(&STANDARD.encode(body)),
    )
}

/// RFC 2047 encoded-word for non-ASCII header values.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?b?{}?=", STANDARD.encode(value))
    }
}

fn wrap_base64(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(76)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n")
}
