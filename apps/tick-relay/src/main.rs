//! Tick Relay Binary
//!
//! Starts the market data relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tick-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FINNHUB_API_KEY`: Finnhub API key
//!
//! ## Optional
//! - `FINNHUB_WS_URL`: Full upstream endpoint override (default: Finnhub)
//! - `RELAY_SYMBOLS`: Initial symbols, comma-separated (default: AAPL)
//! - `RELAY_PORT`: HTTP/WebSocket port (default: 8080)
//! - `RELAY_OVERFLOW_POLICY`: drop-newest | disconnect (default: drop-newest)
//! - `RELAY_BROADCAST_CAPACITY`, `RELAY_CLIENT_QUEUE_CAPACITY`,
//!   `RELAY_SUBSCRIBE_QUEUE_CAPACITY`, `RELAY_HUB_COMMAND_CAPACITY`
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tick_relay::infrastructure::telemetry;
use tick_relay::{
    GatewayServer, GatewayState, Hub, HubConfig, RelayConfig, StreamClient, StreamClientConfig,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    telemetry::init();

    tracing::info!("Starting tick relay");

    let config = RelayConfig::from_env().context("loading configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Broadcast hub: the only owner of the downstream client set.
    let (hub, hub_handle) = Hub::new(HubConfig {
        command_capacity: config.channels.hub_command_capacity,
        overflow: config.overflow,
    });
    tokio::spawn(hub.run());

    // Upstream relay. A dead feed is not process-fatal: the gateway keeps
    // serving and /readyz reports NOT READY.
    let stream_client = StreamClient::new(
        StreamClientConfig {
            endpoint: config.stream_endpoint(),
            symbols: config.symbols.clone(),
            subscribe_queue_capacity: config.channels.subscribe_queue_capacity,
        },
        shutdown_token.clone(),
    );
    let relay_status = stream_client.status();
    let subscribe_handle = stream_client.subscribe_handle();

    let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(config.channels.broadcast_capacity);
    tokio::spawn(async move {
        if let Err(e) = stream_client.run(output_tx).await {
            tracing::error!(error = %e, "Upstream relay stopped");
        }
    });

    // Relay-to-hub wiring: every upstream frame becomes a broadcast.
    let forward_hub = hub_handle.clone();
    tokio::spawn(async move {
        while let Some(frame) = output_rx.recv().await {
            if forward_hub.broadcast(frame).await.is_err() {
                break;
            }
        }
    });

    // Downstream gateway.
    let gateway_state = Arc::new(GatewayState::new(
        hub_handle,
        subscribe_handle,
        relay_status,
        env!("CARGO_PKG_VERSION").to_string(),
        config.channels.client_queue_capacity,
    ));
    let gateway = GatewayServer::new(config.server.port, gateway_state, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = gateway.run().await {
            tracing::error!(error = %e, "Gateway error");
        }
    });

    tracing::info!("Tick relay ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Tick relay stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        symbols = ?config.symbols,
        port = config.server.port,
        overflow_policy = config.overflow.as_str(),
        broadcast_capacity = config.channels.broadcast_capacity,
        client_queue_capacity = config.channels.client_queue_capacity,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
