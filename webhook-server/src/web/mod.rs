//! Web server module for the LINE webhook.
//!
//! Routes:
//! - `GET /health`
//! - `POST /webhooks/line/:store` — signed LINE event deliveries
//! - `GET /stores/:store/liff` — public store config for the LIFF app
//! - `GET /stores/:store/manual?context=` — redirect to the store's manual

pub mod events;
pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use events::{
    process_events, BatchOutcome, DispatchError, EventOutcome, WebhookEvent, WebhookPayload,
    PERMISSION_ACK, PERMISSION_COMMAND,
};
pub use handlers::{
    health, liff_config, line_webhook, manual_redirect, AppState, HealthResponse, ManualQuery,
};
pub use signature::{sign_body, verify_line_signature, SIGNATURE_HEADER};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/line/:store", post(line_webhook))
        .route("/stores/:store/liff", get(liff_config))
        .route("/stores/:store/manual", get(manual_redirect))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
