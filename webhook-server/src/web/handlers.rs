//! Webhook endpoint handlers.
//!
//! The LINE webhook handler:
//! 1. Resolves the store from the path
//! 2. Verifies `X-Line-Signature` against that store's channel secret
//! 3. Processes events in order
//! 4. Returns 200 with an empty body
//!
//! Per-event failures are logged and never change the response.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PublicTenantConfig;
use crate::line::Messenger;
use crate::store::PermissionStore;
use crate::web::events::{process_events, WebhookPayload};
use crate::web::signature::{verify_line_signature, SIGNATURE_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn PermissionStore>,
    pub messenger: Arc<dyn Messenger>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PermissionStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            messenger,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// LINE Webhook
// =============================================================================

/// LINE webhook endpoint for one store.
pub async fn line_webhook(
    State(state): State<AppState>,
    Path(store_key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(tenant) = state.config.tenant(&store_key) else {
        warn!(store = %store_key, "line_webhook_unknown_store");
        return StatusCode::NOT_FOUND;
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_line_signature(&tenant.channel_secret, &body, signature) {
        warn!(store = %store_key, body_length = body.len(), "line_signature_invalid");
        return StatusCode::UNAUTHORIZED;
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(store = %store_key, error = %e, "line_webhook_invalid_payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    info!(
        store = %store_key,
        destination = ?payload.destination,
        event_count = payload.events.len(),
        "line_webhook_received"
    );

    let batch = process_events(
        tenant,
        state.store.as_ref(),
        state.messenger.as_ref(),
        &payload.events,
    )
    .await;

    info!(
        store = %store_key,
        processed = batch.processed(),
        ignored = batch.ignored(),
        failed = batch.failed(),
        "line_webhook_complete"
    );

    StatusCode::OK
}

// =============================================================================
// LIFF Configuration
// =============================================================================

/// Public configuration the store's LIFF front-end boots from.
pub async fn liff_config(
    State(state): State<AppState>,
    Path(store_key): Path<String>,
) -> Result<Json<PublicTenantConfig>, StatusCode> {
    match state.config.tenant(&store_key) {
        Some(tenant) => Ok(Json(tenant.public_view())),
        None => {
            warn!(store = %store_key, "liff_config_unknown_store");
            Err(StatusCode::NOT_FOUND)
        }
    }
}

// =============================================================================
// Manual Redirect
// =============================================================================

/// Query for the manual redirect. `context` picks a context-specific manual.
#[derive(Debug, Default, Deserialize)]
pub struct ManualQuery {
    #[serde(default)]
    pub context: String,
}

/// Redirect to the store's operation manual for the given context.
pub async fn manual_redirect(
    State(state): State<AppState>,
    Path(store_key): Path<String>,
    Query(query): Query<ManualQuery>,
) -> Result<Redirect, StatusCode> {
    let Some(tenant) = state.config.tenant(&store_key) else {
        warn!(store = %store_key, "manual_unknown_store");
        return Err(StatusCode::NOT_FOUND);
    };

    match tenant.manual_url_for(&query.context) {
        Some(url) => {
            info!(store = %store_key, context = %query.context, "manual_redirect");
            Ok(Redirect::temporary(url))
        }
        None => {
            warn!(store = %store_key, context = %query.context, "manual_not_configured");
            Err(StatusCode::NOT_FOUND)
        }
    }
}
