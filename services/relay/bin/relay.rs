//! Main Entrypoint for the Negotiation Relay
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging and the oracle client.
//! 3. Serving the WebSocket endpoint agents connect and register on.
//! 4. Handling graceful shutdown.

use anyhow::Context;
use dealtalk_core::oracle::ChatOracle;
use dealtalk_relay::{config::RelayConfig, state::AppState, ws};
use std::sync::Arc;
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let oracle = Arc::new(ChatOracle::for_provider(
        config.provider,
        &config.api_key,
        config.model.clone(),
    ));

    info!(
        provider = ?config.provider,
        model = %config.model,
        min_turns = config.limits.min_turns,
        max_turns = config.limits.max_turns,
        bind_address = %config.bind_address,
        "Relay configured. Waiting for agents to connect..."
    );

    let bind_address = config.bind_address;
    let state = Arc::new(AppState::new(config, oracle));
    let app = axum::Router::new()
        .route("/", axum::routing::any(ws::session::ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .context("Failed to bind relay address")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay has shut down.");
    Ok(())
}
