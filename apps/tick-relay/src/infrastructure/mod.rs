//! Infrastructure Layer - Adapters and external integrations.

/// Finnhub WebSocket client adapter (upstream vendor connection).
pub mod finnhub;

/// Downstream WebSocket gateway and health endpoints.
pub mod gateway;

/// Broadcast hub for downstream fan-out.
pub mod hub;

/// Configuration loading.
pub mod config;

/// Tracing initialization.
pub mod telemetry;
