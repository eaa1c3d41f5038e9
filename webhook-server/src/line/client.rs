//! HTTP client for the LINE reply endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use super::{LineError, Messenger, ReplyRequest, TextMessage};
use crate::config::TenantConfig;

/// Reply client shared by every store; credentials come from the tenant.
#[derive(Debug, Clone)]
pub struct LineClient {
    client: Client,
    base_url: String,
}

impl LineClient {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, LineError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn reply_url(&self) -> String {
        format!("{}/v2/bot/message/reply", self.base_url)
    }
}

#[async_trait]
impl Messenger for LineClient {
    async fn reply_text(
        &self,
        tenant: &TenantConfig,
        reply_token: &str,
        text: &str,
    ) -> Result<(), LineError> {
        if tenant.channel_access_token.is_empty() {
            return Err(LineError::MissingAccessToken);
        }

        let body = ReplyRequest {
            reply_token: reply_token.to_string(),
            messages: vec![TextMessage::new(text)],
        };

        let response = self
            .client
            .post(self.reply_url())
            .bearer_auth(&tenant.channel_access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status_code = status.as_u16(), "line_reply_rejected");
            return Err(LineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(text_length = text.len(), "line_reply_sent");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tenant(token: &str) -> TenantConfig {
        TenantConfig {
            channel_access_token: token.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reply_url_trims_slash() {
        let client = LineClient::new("https://api.line.me/", 1000).unwrap();
        assert_eq!(client.reply_url(), "https://api.line.me/v2/bot/message/reply");
    }

    #[tokio::test]
    async fn test_reply_text_posts_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .and(header("authorization", "Bearer channel-token"))
            .and(body_json(json!({
                "replyToken": "reply-1",
                "messages": [{ "type": "text", "text": "ok" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = LineClient::new(server.uri(), 2000).unwrap();
        client
            .reply_text(&tenant("channel-token"), "reply-1", "ok")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reply_text_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid reply token"))
            .mount(&server)
            .await;

        let client = LineClient::new(server.uri(), 2000).unwrap();
        let err = client
            .reply_text(&tenant("channel-token"), "expired", "ok")
            .await
            .unwrap_err();

        assert!(matches!(err, LineError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_reply_text_without_token() {
        let client = LineClient::new("http://127.0.0.1:9", 500).unwrap();
        let err = client.reply_text(&tenant(""), "reply-1", "ok").await.unwrap_err();
        assert!(matches!(err, LineError::MissingAccessToken));
    }
}
