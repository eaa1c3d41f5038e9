//! LINE Messaging API reply support.
//!
//! Only the reply endpoint is used. A reply token is single-use and
//! authorizes exactly one reply call.

pub mod client;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::TenantConfig;

pub use client::LineClient;

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("line request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("line api returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store has no channel access token")]
    MissingAccessToken,
}

/// Body of `POST /v2/bot/message/reply`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub reply_token: String,
    pub messages: Vec<TextMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl TextMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

/// Sends replies on behalf of a store's channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn reply_text(
        &self,
        tenant: &TenantConfig,
        reply_token: &str,
        text: &str,
    ) -> Result<(), LineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_request_shape() {
        let request = ReplyRequest {
            reply_token: "rt-1".to_string(),
            messages: vec![TextMessage::new("hello")],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "replyToken": "rt-1",
                "messages": [{ "type": "text", "text": "hello" }]
            })
        );
    }
}
