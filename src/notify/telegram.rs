//! Telegram Bot API client
//!
//! Covers the three calls the bot needs: `sendMessage`, `getUpdates` and
//! `setWebhook`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::Notifier;

/// Envelope every Bot API response shares
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramClient {
    client: Client,
    bot_url: String,
    default_chat: String,
}

impl TelegramClient {
    /// `timeout` must exceed the long-poll timeout used with `get_updates`
    pub fn new(api_url: &str, token: &str, default_chat: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            bot_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            default_chat: default_chat.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.bot_url, method)
    }

    fn unwrap_response<T>(response: ApiResponse<T>, method: &str) -> Result<T> {
        if !response.ok {
            bail!(
                "{} rejected: {}",
                method,
                response.description.unwrap_or_else(|| "no description".to_string())
            );
        }
        response
            .result
            .with_context(|| format!("{} returned no result", method))
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .context("sendMessage request failed")?
            .json()
            .await
            .context("sendMessage response malformed")?;
        Self::unwrap_response(response, "sendMessage")?;
        debug!(chat_id = %chat_id, "Telegram message sent");
        Ok(())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response: ApiResponse<Vec<Update>> = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
            ])
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("getUpdates response malformed")?;
        Self::unwrap_response(response, "getUpdates")
    }

    pub async fn set_webhook(&self, url: &str) -> Result<()> {
        let response: ApiResponse<bool> = self
            .client
            .post(self.method_url("setWebhook"))
            .query(&[("url", url)])
            .send()
            .await
            .context("setWebhook request failed")?
            .json()
            .await
            .context("setWebhook response malformed")?;
        Self::unwrap_response(response, "setWebhook")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send(&self, text: &str) {
        if let Err(e) = self.send_message(&self.default_chat, text).await {
            warn!(error = %format!("{:#}", e), "Telegram notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_update_batch() {
        let raw = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":1,"chat":{"id":42,"type":"private"},"text":"/status"}},
            {"update_id":11,"edited_message":{"message_id":1,"chat":{"id":42,"type":"private"}}}
        ]}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = TelegramClient::unwrap_response(response, "getUpdates").unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[0].message.as_ref().and_then(|m| m.text.as_deref()),
            Some("/status")
        );
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_rejected_call_is_error() {
        let raw = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let err = TelegramClient::unwrap_response(response, "getUpdates").unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[test]
    fn test_method_urls_embed_token() {
        let client =
            TelegramClient::new("https://api.telegram.org/", "123:abc", "42", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
