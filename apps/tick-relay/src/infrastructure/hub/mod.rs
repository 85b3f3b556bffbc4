//! Broadcast Hub
//!
//! Fans inbound frames out to every registered downstream client. The hub is
//! an owning task: the client set is touched only by [`Hub::run`], and all
//! mutations arrive as [`HubCommand`] values over a single command channel,
//! so no lock guards the set itself.
//!
//! Each client registers with its own bounded outbound queue. Delivery into a
//! queue is non-blocking: a closed queue unregisters the client, and a full
//! queue is resolved by the configured [`OverflowPolicy`] so that one slow
//! consumer never stalls delivery to the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a downstream client.
pub type ClientId = u64;

/// Policy applied when a client's outbound queue is full during a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the frame for that client only; later frames supersede it.
    #[default]
    DropNewest,
    /// Unregister and close the lagging client.
    Disconnect,
}

impl OverflowPolicy {
    /// Parse a policy from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "disconnect" => Self::Disconnect,
            _ => Self::DropNewest,
        }
    }

    /// Get the policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DropNewest => "drop-newest",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Hub configuration.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Capacity of the command channel feeding the run loop.
    pub command_capacity: usize,
    /// Policy for clients whose outbound queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            overflow: OverflowPolicy::DropNewest,
        }
    }
}

/// Requests accepted by the hub run loop.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a client to the active set.
    Register {
        /// Identity of the client.
        id: ClientId,
        /// Sender half of the client's bounded outbound queue.
        sender: mpsc::Sender<Bytes>,
    },
    /// Remove a client from the active set and close its queue.
    Unregister {
        /// Identity of the client.
        id: ClientId,
    },
    /// Deliver a payload to every currently registered client.
    Broadcast {
        /// Opaque frame to deliver.
        payload: Bytes,
    },
    /// Query hub statistics.
    Stats {
        /// Reply channel for the snapshot.
        reply: oneshot::Sender<HubStats>,
    },
}

/// Statistics snapshot for the health endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubStats {
    /// Number of registered clients.
    pub clients: usize,
    /// Total broadcast commands processed.
    pub broadcasts: u64,
}

/// Hub errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HubError {
    /// The hub run loop is no longer receiving commands.
    #[error("hub task stopped")]
    Closed,
}

// =============================================================================
// Hub
// =============================================================================

/// The broadcast hub task state.
///
/// Construct with [`Hub::new`], spawn [`Hub::run`], and interact through the
/// returned [`HubHandle`].
#[derive(Debug)]
pub struct Hub {
    clients: HashMap<ClientId, mpsc::Sender<Bytes>>,
    overflow: OverflowPolicy,
    broadcasts: u64,
    cmd_rx: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Create a hub and a cloneable handle to it.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let hub = Self {
            clients: HashMap::new(),
            overflow: config.overflow,
            broadcasts: 0,
            cmd_rx,
        };
        let handle = HubHandle {
            cmd_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (hub, handle)
    }

    /// Run the hub loop until every handle is dropped.
    ///
    /// Commands are processed strictly in arrival order: a broadcast sees
    /// exactly the set of clients registered before it, and never a client
    /// registered after.
    pub async fn run(mut self) {
        while let Some(command) = self.cmd_rx.recv().await {
            match command {
                HubCommand::Register { id, sender } => {
                    if self.clients.insert(id, sender).is_some() {
                        tracing::warn!(client_id = id, "Client id registered twice");
                    }
                    tracing::debug!(client_id = id, clients = self.clients.len(), "Client registered");
                }
                HubCommand::Unregister { id } => {
                    // Dropping the sender closes the client's queue, which
                    // ends its writer task and closes the socket.
                    if self.clients.remove(&id).is_some() {
                        tracing::debug!(
                            client_id = id,
                            clients = self.clients.len(),
                            "Client unregistered"
                        );
                    }
                }
                HubCommand::Broadcast { payload } => {
                    self.broadcasts += 1;
                    self.deliver(&payload);
                }
                HubCommand::Stats { reply } => {
                    let _ = reply.send(HubStats {
                        clients: self.clients.len(),
                        broadcasts: self.broadcasts,
                    });
                }
            }
        }
        tracing::debug!("Hub loop stopped");
    }

    /// Deliver one payload to the current client set.
    fn deliver(&mut self, payload: &Bytes) {
        let mut dead = Vec::new();

        for (&id, sender) in &self.clients {
            match sender.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => match self.overflow {
                    OverflowPolicy::DropNewest => {
                        tracing::debug!(client_id = id, "Client queue full, frame dropped");
                    }
                    OverflowPolicy::Disconnect => {
                        tracing::warn!(client_id = id, "Client queue full, disconnecting");
                        dead.push(id);
                    }
                },
                Err(TrySendError::Closed(_)) => {
                    dead.push(id);
                }
            }
        }

        for id in dead {
            self.clients.remove(&id);
            tracing::debug!(client_id = id, "Client removed during broadcast");
        }
    }
}

// =============================================================================
// Hub Handle
// =============================================================================

/// Cloneable handle to a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    cmd_tx: mpsc::Sender<HubCommand>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Register a client's outbound queue and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn register(&self, sender: mpsc::Sender<Bytes>) -> Result<ClientId, HubError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.cmd_tx
            .send(HubCommand::Register { id, sender })
            .await
            .map_err(|_| HubError::Closed)?;
        Ok(id)
    }

    /// Unregister a client. Safe to call after the client's write path
    /// already failed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn unregister(&self, id: ClientId) -> Result<(), HubError> {
        self.cmd_tx
            .send(HubCommand::Unregister { id })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Enqueue a payload for delivery to the current client set.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn broadcast(&self, payload: Bytes) -> Result<(), HubError> {
        self.cmd_tx
            .send(HubCommand::Broadcast { payload })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Fetch a statistics snapshot from the hub loop.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(HubCommand::Stats { reply })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

// =============================================================================
// Tests
// =============================================================================
