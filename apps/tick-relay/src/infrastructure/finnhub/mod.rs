//! Finnhub WebSocket Adapter
//!
//! Client for the Finnhub streaming endpoint. Inbound trade frames are
//! opaque to this module and forwarded verbatim; only the outbound
//! subscribe control frames are structured.

pub mod messages;
pub mod stream;

pub use messages::SubscribeFrame;
pub use stream::{
    StreamClient, StreamClientConfig, StreamClientError, SubscribeError, SubscribeHandle,
};
