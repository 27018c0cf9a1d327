//! Chat delivery transport
//!
//! The linking protocol needs two operations from the chat platform: open a
//! DM channel to a user, and post a message into a channel. `ChatTransport`
//! is that seam; `SlackClient` is the production implementation.

pub mod slack;

pub use slack::SlackClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Result;

/// Link attachment rendered under a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub text: String,
}

impl MessageAttachment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Outbound message delivery to the chat platform
///
/// Failure of either operation is a `Delivery` error.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open (or resolve) a DM channel to the given chat user
    async fn open_channel(&self, chat_id: &str) -> Result<String>;

    /// Post a message into a channel
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        attachments: &[MessageAttachment],
    ) -> Result<()>;
}
