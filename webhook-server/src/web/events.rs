//! LINE webhook payload types and per-event dispatch.
//!
//! ## Processing Flow
//!
//! ```text
//! events[] → (message/text only) → trim → == "権限申請" → merge-write → reply
//! ```
//!
//! Every event is its own unit of work. A failure is recorded in the batch
//! outcome and the next event is still processed. Events are decoded one at
//! a time, so an event this service cannot read never sinks its neighbours.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::TenantConfig;
use crate::line::{LineError, Messenger};
use crate::store::{PermissionRequest, PermissionStore, StoreError};

/// Text that triggers a permission request.
pub const PERMISSION_COMMAND: &str = "権限申請";

/// Fixed acknowledgment sent back for a permission request.
pub const PERMISSION_ACK: &str = "権限申請を受け付けました。管理者の承認をお待ちください。";

/// Request body LINE posts to the webhook.
///
/// Events stay raw here and are decoded individually by [`process_events`].
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookEvent {
    /// Trimmed text of a text message event; `None` for anything else.
    pub fn text(&self) -> Option<&str> {
        if self.kind != "message" {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.kind != "text" {
            return None;
        }
        Some(trim_text(message.text.as_deref().unwrap_or("")))
    }

    pub fn is_permission_command(&self) -> bool {
        self.text() == Some(PERMISSION_COMMAND)
    }

    fn user_id(&self) -> Option<&str> {
        self.source
            .as_ref()
            .and_then(|s| s.user_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Strip surrounding whitespace, including a stray byte order mark.
fn trim_text(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("event is missing {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reply(#[from] LineError),
}

/// What happened to a single event.
#[derive(Debug)]
pub enum EventOutcome {
    /// Not a permission command; nothing written, nothing sent.
    Ignored,
    /// Request stored and acknowledged.
    Processed { user_id: String },
    Failed(DispatchError),
}

/// Outcomes of one webhook delivery, in event order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub outcomes: Vec<EventOutcome>,
}

impl BatchOutcome {
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Processed { .. }))
    }

    pub fn ignored(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Ignored))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&EventOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(*o)).count()
    }
}

/// Process every event in order against one store's configuration.
pub async fn process_events(
    tenant: &TenantConfig,
    store: &dyn PermissionStore,
    messenger: &dyn Messenger,
    events: &[Value],
) -> BatchOutcome {
    let mut batch = BatchOutcome::default();

    for (index, raw) in events.iter().enumerate() {
        let event = match WebhookEvent::deserialize(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(event_index = index, error = %e, "line_event_undecodable");
                batch.outcomes.push(EventOutcome::Ignored);
                continue;
            }
        };

        if !event.is_permission_command() {
            debug!(event_index = index, event_type = %event.kind, "line_event_ignored");
            batch.outcomes.push(EventOutcome::Ignored);
            continue;
        }

        let outcome = match handle_permission_request(tenant, store, messenger, &event).await {
            Ok(user_id) => {
                info!(event_index = index, user_id = %user_id, "permission_request_processed");
                EventOutcome::Processed { user_id }
            }
            Err(e) => {
                error!(event_index = index, error = %e, "permission_request_failed");
                EventOutcome::Failed(e)
            }
        };
        batch.outcomes.push(outcome);
    }

    batch
}

/// Store the request, then acknowledge it. No reply is sent if the write fails.
async fn handle_permission_request(
    tenant: &TenantConfig,
    store: &dyn PermissionStore,
    messenger: &dyn Messenger,
    event: &WebhookEvent,
) -> Result<String, DispatchError> {
    let user_id = event
        .user_id()
        .ok_or(DispatchError::MissingField("source.userId"))?;
    let reply_token = event
        .reply_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(DispatchError::MissingField("replyToken"))?;

    store
        .merge_permission_request(user_id, &PermissionRequest::pending_now())
        .await?;

    messenger
        .reply_text(tenant, reply_token, PERMISSION_ACK)
        .await?;

    Ok(user_id.to_string())
}
