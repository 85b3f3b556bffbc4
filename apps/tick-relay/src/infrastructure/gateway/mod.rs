//! Downstream Gateway
//!
//! HTTP server for downstream consumers and orchestrators.
//!
//! # Endpoints
//!
//! - `GET /ws` - WebSocket upgrade; the client receives every broadcast frame
//!   and may send `{"type":"subscribe","symbol":"..."}` requests
//! - `GET /health` - Returns JSON health status including relay state
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (ready while the relay is streaming)
//!
//! Each accepted WebSocket is split in two: a writer task drains the client's
//! bounded hub queue into the socket, and the read side forwards subscription
//! requests to the upstream relay. Closing either side unregisters the client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::relay::{RelayState, RelayStatus};
use crate::infrastructure::finnhub::SubscribeHandle;
use crate::infrastructure::hub::HubHandle;

// =============================================================================
// Gateway State
// =============================================================================

/// Shared state for the gateway handlers.
pub struct GatewayState {
    hub: HubHandle,
    subscribe: SubscribeHandle,
    relay_status: Arc<RelayStatus>,
    version: String,
    started_at: Instant,
    client_queue_capacity: usize,
}

impl GatewayState {
    /// Create new gateway state.
    #[must_use]
    pub fn new(
        hub: HubHandle,
        subscribe: SubscribeHandle,
        relay_status: Arc<RelayStatus>,
        version: String,
        client_queue_capacity: usize,
    ) -> Self {
        Self {
            hub,
            subscribe,
            relay_status,
            version,
            started_at: Instant::now(),
            client_queue_capacity: client_queue_capacity.max(1),
        }
    }
}

// =============================================================================
// Gateway Server
// =============================================================================

/// Gateway HTTP server.
pub struct GatewayServer {
    port: u16,
    state: Arc<GatewayState>,
    cancel: CancellationToken,
}

impl GatewayServer {
    /// Create a new gateway server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<GatewayState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the gateway server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if binding fails or the HTTP server encounters
    /// a fatal error while running.
    pub async fn run(self) -> Result<(), GatewayError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| GatewayError::ServerFailed(e.to_string()))?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Build the gateway router.
#[must_use]
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .with_state(state)
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// WebSocket Handler
// =============================================================================

/// Subscription request sent by downstream clients.
#[derive(Debug, Deserialize)]
struct ClientRequest {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    symbol: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let (queue_tx, mut queue_rx) = mpsc::channel::<Bytes>(state.client_queue_capacity);

    let Ok(client_id) = state.hub.register(queue_tx).await else {
        tracing::warn!("Hub unavailable, dropping connection");
        return;
    };

    let (mut sink, mut stream) = socket.split();

    // Writer: drain the bounded hub queue into the socket. Ends when the hub
    // drops the queue sender (unregister) or the socket write fails.
    let writer = tokio::spawn(async move {
        while let Some(payload) = queue_rx.recv().await {
            let message = match std::str::from_utf8(&payload) {
                Ok(text) => Message::Text(text.to_owned().into()),
                Err(_) => Message::Binary(payload),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: forward subscription requests until the client goes away.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_client_request(&text, &state),
            Message::Close(_) => break,
            _ => {}
        }
    }

    if state.hub.unregister(client_id).await.is_err() {
        writer.abort();
    }
    tracing::debug!(client_id, "Client connection closed");
}

fn handle_client_request(text: &str, state: &GatewayState) {
    let Ok(request) = serde_json::from_str::<ClientRequest>(text) else {
        tracing::debug!("Ignoring malformed client message");
        return;
    };

    if request.msg_type == "subscribe" && !request.symbol.is_empty() {
        tracing::info!(symbol = %request.symbol, "Client requested subscription");
        if let Err(e) = state.subscribe.try_subscribe(request.symbol) {
            tracing::warn!(error = %e, "Subscription request rejected");
        }
    } else {
        tracing::debug!(msg_type = %request.msg_type, "Ignoring unhandled client message");
    }
}

// =============================================================================
// Health Handlers
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream relay status.
    pub relay: RelayInfo,
    /// Active client count.
    pub clients: ClientStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream feed streaming.
    Healthy,
    /// Feed not yet up.
    Degraded,
    /// Feed permanently gone.
    Unhealthy,
}

/// Upstream relay status.
#[derive(Debug, Clone, Serialize)]
pub struct RelayInfo {
    /// Lifecycle state name.
    pub state: String,
    /// Whether the relay is currently streaming.
    pub streaming: bool,
    /// Frames forwarded downstream.
    pub frames_relayed: u64,
    /// Most recent relay error, if any.
    pub last_error: Option<String>,
}

/// Active client information.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    /// Total connected WebSocket clients.
    pub total: usize,
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let clients = state
        .hub
        .stats()
        .await
        .map(|s| s.clients)
        .unwrap_or_default();

    let response = build_health_response(&state, clients);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    if state.relay_status.is_streaming() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

fn build_health_response(state: &GatewayState, clients: usize) -> HealthResponse {
    let relay_state = state.relay_status.state();

    let status = match relay_state {
        RelayState::Streaming => HealthStatus::Healthy,
        RelayState::Disconnected | RelayState::Connecting => HealthStatus::Degraded,
        RelayState::Terminated => HealthStatus::Unhealthy,
    };

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        relay: RelayInfo {
            state: relay_state.as_str().to_string(),
            streaming: relay_state == RelayState::Streaming,
            frames_relayed: state.relay_status.frames_relayed(),
            last_error: state.relay_status.last_error(),
        },
        clients: ClientStatus { total: clients },
    }
}

// =============================================================================
// Tests
// =============================================================================
