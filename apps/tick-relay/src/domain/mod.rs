//! Domain Layer - Core relay types and state.
//!
//! This layer contains the core domain types for the relay with no
//! dependency on the transport adapters.

/// Upstream relay lifecycle state and shared status.
pub mod relay;
