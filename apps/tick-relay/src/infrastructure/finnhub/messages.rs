//! Control Frame Types
//!
//! Outbound messages for the Finnhub streaming endpoint. Inbound frames
//! (observed shape: `{"type":"trade","data":[...]}`) are never parsed here;
//! the relay passes them through as raw bytes.

use serde::Serialize;

/// Subscribe control frame: `{"type":"subscribe","symbol":"<SYMBOL>"}`.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeFrame {
    /// Always `"subscribe"`.
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    /// Symbol to start streaming.
    pub symbol: String,
}

impl SubscribeFrame {
    /// Create a subscribe frame for a symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            msg_type: "subscribe",
            symbol: symbol.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_wire_shape() {
        let frame = SubscribeFrame::new("AAPL");
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","symbol":"AAPL"}"#);
    }

    #[test]
    fn symbol_is_passed_through_unmodified() {
        let frame = SubscribeFrame::new("BINANCE:BTCUSDT");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""symbol":"BINANCE:BTCUSDT""#));
    }
}
