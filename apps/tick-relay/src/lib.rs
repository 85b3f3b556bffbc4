#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Tick Relay - Market Data Fan-Out
//!
//! A relay service that maintains a single connection to the Finnhub
//! streaming WebSocket and fans trade ticks out to multiple downstream
//! WebSocket clients. Downstream clients may request new symbols on the
//! shared upstream feed at runtime.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Relay lifecycle state
//!   - `relay`: State machine and shared status snapshot
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `finnhub`: WebSocket client for the upstream vendor stream
//!   - `hub`: Actor-style broadcast hub with per-client bounded queues
//!   - `gateway`: Downstream WebSocket endpoint and health checks
//!   - `config`: Environment-driven configuration
//!   - `telemetry`: Tracing setup
//!
//! # Data Flow
//!
//! ```text
//!                      ┌─────────────┐     ┌─────────────┐──► Client 1
//! Finnhub WS ─────────►│   Stream    │────►│  Broadcast  │──► Client 2
//!   ▲                  │   Client    │     │     Hub     │──► Client N
//!   │ subscribe frames └─────────────┘     └─────────────┘
//!   └──────────────────── runtime subscription requests ◄─── clients
//! ```
//!
//! Relayed frames are opaque bytes; nothing in this crate parses or mutates
//! tick payloads.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Relay lifecycle types.
pub mod domain;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::relay::{RelayState, RelayStatus, Symbol};

// Infrastructure config
pub use infrastructure::config::{
    ChannelSettings, ConfigError, Credentials, RelayConfig, ServerSettings,
};

// Broadcast hub
pub use infrastructure::hub::{
    ClientId, Hub, HubConfig, HubError, HubHandle, HubStats, OverflowPolicy,
};

// Upstream stream client
pub use infrastructure::finnhub::{
    StreamClient, StreamClientConfig, StreamClientError, SubscribeError, SubscribeHandle,
};

// Gateway
pub use infrastructure::gateway::{GatewayError, GatewayServer, GatewayState};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
