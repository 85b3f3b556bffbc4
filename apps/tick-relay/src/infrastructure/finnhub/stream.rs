//! Upstream Stream Client
//!
//! Owns the single long-lived connection to the Finnhub streaming endpoint.
//! On start it sends one subscribe frame per configured symbol (list order),
//! then runs a read loop forwarding every inbound frame as raw bytes to the
//! output channel, and a dispatch loop turning runtime subscription requests
//! into subscribe frames on the same connection.
//!
//! Both the initial subscribe loop and the dispatch loop write to the same
//! connection, so the write half sits behind a mutex; frames are never
//! interleaved on the wire. Reads are uncontended (single reader).
//!
//! The client is one-shot: a dial failure or read error terminates it
//! permanently. There is no reconnect. Loss of the feed degrades the process
//! to "no further broadcasts", surfaced through [`RelayStatus`].
//!
//! The subscription queue is created at construction, before any dial, so
//! subscribing before the dispatch loop is up buffers the request instead of
//! blocking the caller forever.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::domain::relay::{RelayState, RelayStatus, Symbol};

use super::messages::SubscribeFrame;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur in the stream client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Write to the upstream connection failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The upstream closed the connection.
    #[error("connection closed by upstream")]
    ConnectionClosed,

    /// The output channel consumer went away.
    #[error("output channel closed")]
    OutputChannelClosed,
}

/// Errors returned to subscription callers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubscribeError {
    /// The pending-request queue is full.
    #[error("subscription queue full")]
    QueueFull,

    /// The relay has terminated (or was never started).
    #[error("relay is not running")]
    RelayGone,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Full WebSocket endpoint, token included.
    pub endpoint: String,
    /// Symbols subscribed once at startup, in list order.
    pub symbols: Vec<Symbol>,
    /// Capacity of the runtime subscription-request queue.
    pub subscribe_queue_capacity: usize,
}

// =============================================================================
// Subscribe Handle
// =============================================================================

/// Cloneable handle for enqueueing runtime subscription requests.
#[derive(Debug, Clone)]
pub struct SubscribeHandle {
    tx: mpsc::Sender<Symbol>,
}

impl SubscribeHandle {
    /// Enqueue a symbol for upstream subscription without blocking.
    ///
    /// Requests enqueued before the dispatch loop is running are buffered
    /// and sent once the connection is up.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::QueueFull`] if the queue is at capacity and
    /// [`SubscribeError::RelayGone`] if the relay has terminated.
    pub fn try_subscribe(&self, symbol: Symbol) -> Result<(), SubscribeError> {
        self.tx.try_send(symbol).map_err(|e| match e {
            TrySendError::Full(_) => SubscribeError::QueueFull,
            TrySendError::Closed(_) => SubscribeError::RelayGone,
        })
    }

    /// Enqueue a symbol, waiting for queue space.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::RelayGone`] if the relay has terminated.
    pub async fn subscribe(&self, symbol: Symbol) -> Result<(), SubscribeError> {
        self.tx
            .send(symbol)
            .await
            .map_err(|_| SubscribeError::RelayGone)
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// Client owning the single upstream vendor connection.
///
/// The connection handle never leaves this client; external callers only
/// enqueue requests through a [`SubscribeHandle`].
#[derive(Debug)]
pub struct StreamClient {
    config: StreamClientConfig,
    status: Arc<RelayStatus>,
    subscribe_tx: mpsc::Sender<Symbol>,
    subscribe_rx: mpsc::Receiver<Symbol>,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Create a new stream client. The subscription queue exists from this
    /// point on, before any connection attempt.
    #[must_use]
    pub fn new(config: StreamClientConfig, cancel: CancellationToken) -> Self {
        let (subscribe_tx, subscribe_rx) = mpsc::channel(config.subscribe_queue_capacity.max(1));
        Self {
            config,
            status: Arc::new(RelayStatus::new()),
            subscribe_tx,
            subscribe_rx,
            cancel,
        }
    }

    /// Shared status snapshot, for health reporting.
    #[must_use]
    pub fn status(&self) -> Arc<RelayStatus> {
        Arc::clone(&self.status)
    }

    /// Handle for runtime subscription requests.
    #[must_use]
    pub fn subscribe_handle(&self) -> SubscribeHandle {
        SubscribeHandle {
            tx: self.subscribe_tx.clone(),
        }
    }

    /// Connect and relay until cancellation, a read error, or upstream close.
    ///
    /// Every inbound text or binary frame is forwarded verbatim to
    /// `output_tx`; the send awaits queue space, so a slow consumer
    /// backpressures frame ingestion.
    ///
    /// # Errors
    ///
    /// Returns the terminating condition. Whatever the outcome, the client is
    /// `Terminated` afterwards and will never emit another frame.
    pub async fn run(self, output_tx: mpsc::Sender<Bytes>) -> Result<(), StreamClientError> {
        let Self {
            config,
            status,
            subscribe_tx,
            mut subscribe_rx,
            cancel,
        } = self;
        drop(subscribe_tx);

        status.set_state(RelayState::Connecting);
        tracing::info!(symbols = config.symbols.len(), "Connecting to upstream stream");

        let ws_stream = match tokio_tungstenite::connect_async(config.endpoint.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                status.set_error(e.to_string());
                status.set_state(RelayState::Terminated);
                tracing::error!(error = %e, "Upstream connection failed, no live feed");
                return Err(StreamClientError::ConnectFailed(e.to_string()));
            }
        };

        let (write, mut read) = ws_stream.split();
        let write = Arc::new(Mutex::new(write));

        // Initial subscriptions, in configured order. A failed write is
        // logged and skipped, matching the runtime dispatch behavior.
        for symbol in &config.symbols {
            if let Err(e) = send_subscribe(&write, symbol).await {
                tracing::warn!(symbol = %symbol, error = %e, "Initial subscribe failed");
            }
        }

        status.set_state(RelayState::Streaming);
        tracing::info!("Upstream stream established");

        // Dispatch loop: runtime subscription requests become subscribe
        // frames on the shared connection, serialized by the write mutex.
        let dispatch_cancel = cancel.child_token();
        let dispatch_write = Arc::clone(&write);
        let dispatch_token = dispatch_cancel.clone();
        let dispatch = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = dispatch_token.cancelled() => break,
                    request = subscribe_rx.recv() => {
                        let Some(symbol) = request else { break };
                        match send_subscribe(&dispatch_write, &symbol).await {
                            Ok(()) => tracing::info!(symbol = %symbol, "Subscribed"),
                            Err(e) => {
                                tracing::warn!(symbol = %symbol, error = %e, "Subscribe failed");
                            }
                        }
                    }
                }
            }
        });

        // Read loop: forward every inbound frame as raw bytes.
        let result = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Stream client cancelled");
                    break Ok(());
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        status.record_frame();
                        if output_tx.send(Bytes::from(text)).await.is_err() {
                            break Err(StreamClientError::OutputChannelClosed);
                        }
                    }
                    Some(Ok(Message::Binary(payload))) => {
                        status.record_frame();
                        if output_tx.send(payload).await.is_err() {
                            break Err(StreamClientError::OutputChannelClosed);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let mut guard = write.lock().await;
                        if let Err(e) = guard.send(Message::Pong(data)).await {
                            tracing::warn!(error = %e, "Pong failed");
                        }
                    }
                    Some(Ok(_)) => {
                        // Pong and close frames need no action here.
                    }
                    Some(Err(e)) => break Err(e.into()),
                    None => break Err(StreamClientError::ConnectionClosed),
                }
            }
        };

        dispatch_cancel.cancel();
        dispatch.abort();

        if let Err(e) = &result {
            status.set_error(e.to_string());
            tracing::error!(error = %e, "Upstream relay stopped, feed is dead for this process");
        }
        status.set_state(RelayState::Terminated);

        result
    }
}

/// Send one subscribe frame through the shared write half.
async fn send_subscribe<W>(write: &Mutex<W>, symbol: &str) -> Result<(), StreamClientError>
where
    W: SinkExt<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    let json = serde_json::to_string(&SubscribeFrame::new(symbol))
        .map_err(|e| StreamClientError::WriteFailed(format!("serialize subscribe: {e}")))?;

    let mut guard = write.lock().await;
    guard
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| StreamClientError::WriteFailed(e.to_string()))?;

    Ok(())
}
