//! Storebot Web Server - LINE webhook receiver.
//!
//! This binary:
//! - Loads every store's LINE credentials once at startup
//! - Verifies each delivery's signature against its store
//! - Records permission requests in Firestore and replies to the user

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storebot::{router, store, AppState, Config, LineClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    let mut stores: Vec<&str> = config.tenants.keys().map(String::as_str).collect();
    stores.sort_unstable();
    info!(
        port = config.port,
        stores = ?stores,
        firestore_project = %config.firestore.project_id,
        firestore_auth = config.firestore.auth.kind(),
        "config_loaded"
    );
    for (key, tenant) in &config.tenants {
        info!(
            store = %key,
            channel_secret_configured = !tenant.channel_secret.is_empty(),
            access_token_configured = !tenant.channel_access_token.is_empty(),
            "store_loaded"
        );
    }

    let permission_store = store::init_shared(&config.firestore, config.request_timeout_ms)
        .context("Failed to create Firestore client")?;
    let line_client = LineClient::new(config.line_api_base_url.clone(), config.request_timeout_ms)
        .context("Failed to create LINE client")?;
    info!("clients_created");

    let port = config.port;
    let state = AppState::new(config, permission_store, Arc::new(line_client));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "web_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let signal = termination_signal().await;
            info!(signal, "web_server_shutting_down");
        })
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Resolve with the name of the first termination signal delivered.
///
/// A handler that cannot be installed never resolves, so the other one still
/// drives shutdown.
async fn termination_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "sigint_handler_unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
