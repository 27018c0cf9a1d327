//! Slack Web API client
//!
//! Thin JSON client over the two Slack methods the gateway uses:
//! `conversations.open` to resolve a DM channel and `chat.postMessage` to
//! deliver messages. Calls authenticate with the bot token and are checked
//! against Slack's `ok`/`error` envelope.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::{ChatTransport, MessageAttachment};
use crate::types::{LiaisonError, Result};

#[derive(Debug, Serialize)]
struct OpenChannelRequest<'a> {
    users: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenChannelResponse {
    ok: bool,
    #[serde(default)]
    channel: Option<Channel>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    attachments: &'a [MessageAttachment],
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a Slack-compatible Web API endpoint
pub struct SlackClient {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new(api_url: &str, bot_token: &str, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent("liaison/1.0")
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        }
    }

    /// POST a Web API method and decode its JSON envelope
    async fn call<Req, Resp>(&self, method: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.api_url, method);
        debug!(%method, "Calling chat API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LiaisonError::Delivery(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        Ok(response.json::<Resp>().await?)
    }
}

#[async_trait]
impl ChatTransport for SlackClient {
    async fn open_channel(&self, chat_id: &str) -> Result<String> {
        let request = OpenChannelRequest { users: chat_id };
        let response: OpenChannelResponse = self.call("conversations.open", &request).await?;

        if !response.ok {
            return Err(LiaisonError::Delivery(format!(
                "conversations.open failed: {}",
                response.error.unwrap_or_else(|| "unknown error".into())
            )));
        }

        match response.channel {
            Some(channel) => Ok(channel.id),
            None => Err(LiaisonError::Delivery(
                "conversations.open returned no channel".into(),
            )),
        }
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        attachments: &[MessageAttachment],
    ) -> Result<()> {
        let request = PostMessageRequest {
            channel: channel_id,
            text,
            attachments,
        };
        let response: PostMessageResponse = self.call("chat.postMessage", &request).await?;

        if !response.ok {
            return Err(LiaisonError::Delivery(format!(
                "chat.postMessage failed: {}",
                response.error.unwrap_or_else(|| "unknown error".into())
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_message_request_shape() {
        let attachments = vec![MessageAttachment::new("<https://x|Click here>")];
        let request = PostMessageRequest {
            channel: "D123",
            text: "hello",
            attachments: &attachments,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["channel"], "D123");
        assert_eq!(value["text"], "hello");
        assert_eq!(value["attachments"][0]["text"], "<https://x|Click here>");
    }

    #[test]
    fn test_open_channel_response_ok() {
        let response: OpenChannelResponse =
            serde_json::from_str(r#"{"ok":true,"channel":{"id":"D042"}}"#).unwrap();
        assert!(response.ok);
        assert_eq!(response.channel.unwrap().id, "D042");
    }

    #[test]
    fn test_open_channel_response_error() {
        let response: OpenChannelResponse =
            serde_json::from_str(r#"{"ok":false,"error":"users_not_found"}"#).unwrap();
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("users_not_found"));
    }
}
