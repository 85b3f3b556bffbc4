//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use crate::domain::relay::Symbol;
use crate::infrastructure::hub::OverflowPolicy;

/// Default upstream endpoint base; the API token is appended as a query
/// parameter unless `FINNHUB_WS_URL` overrides the endpoint entirely.
const DEFAULT_STREAM_URL: &str = "wss://ws.finnhub.io";

/// Finnhub API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP/WebSocket listen port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Channel capacity settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the relay-to-hub frame channel.
    pub broadcast_capacity: usize,
    /// Capacity of each downstream client's outbound queue.
    pub client_queue_capacity: usize,
    /// Capacity of the runtime subscription-request queue.
    pub subscribe_queue_capacity: usize,
    /// Capacity of the hub command channel.
    pub hub_command_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            broadcast_capacity: 1_024,
            client_queue_capacity: 256,
            subscribe_queue_capacity: 64,
            hub_command_capacity: 64,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Symbols subscribed once at startup.
    pub symbols: Vec<Symbol>,
    /// Server port settings.
    pub server: ServerSettings,
    /// Channel capacity settings.
    pub channels: ChannelSettings,
    /// Policy for downstream clients whose queue is full.
    pub overflow: OverflowPolicy,
    /// Optional full endpoint override (used by tests and proxies).
    pub stream_url_override: Option<String>,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `FINNHUB_API_KEY` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("FINNHUB_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("FINNHUB_API_KEY".to_string()))?;

        if api_key.is_empty() {
            return Err(ConfigError::EmptyValue("FINNHUB_API_KEY".to_string()));
        }

        let symbols = std::env::var("RELAY_SYMBOLS")
            .map(|s| parse_symbols(&s))
            .unwrap_or_else(|_| vec!["AAPL".to_string()]);

        let server = ServerSettings {
            port: parse_env_u16("RELAY_PORT", ServerSettings::default().port),
        };

        let channels = ChannelSettings {
            broadcast_capacity: parse_env_usize(
                "RELAY_BROADCAST_CAPACITY",
                ChannelSettings::default().broadcast_capacity,
            ),
            client_queue_capacity: parse_env_usize(
                "RELAY_CLIENT_QUEUE_CAPACITY",
                ChannelSettings::default().client_queue_capacity,
            ),
            subscribe_queue_capacity: parse_env_usize(
                "RELAY_SUBSCRIBE_QUEUE_CAPACITY",
                ChannelSettings::default().subscribe_queue_capacity,
            ),
            hub_command_capacity: parse_env_usize(
                "RELAY_HUB_COMMAND_CAPACITY",
                ChannelSettings::default().hub_command_capacity,
            ),
        };

        let overflow = std::env::var("RELAY_OVERFLOW_POLICY")
            .map(|s| OverflowPolicy::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let stream_url_override = std::env::var("FINNHUB_WS_URL").ok().filter(|s| !s.is_empty());

        Ok(Self {
            credentials: Credentials::new(api_key),
            symbols,
            server,
            channels,
            overflow,
            stream_url_override,
        })
    }

    /// Get the upstream WebSocket endpoint, token included.
    ///
    /// An explicit `FINNHUB_WS_URL` is used verbatim; otherwise the token is
    /// appended to the default Finnhub endpoint.
    #[must_use]
    pub fn stream_endpoint(&self) -> String {
        self.stream_url_override.clone().unwrap_or_else(|| {
            format!("{DEFAULT_STREAM_URL}?token={}", self.credentials.api_key())
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Parse a comma-separated symbol list, trimming entries and skipping blanks.
fn parse_symbols(raw: &str) -> Vec<Symbol> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn test_config(stream_url_override: Option<String>) -> RelayConfig {
        RelayConfig {
            credentials: Credentials::new("token123".to_string()),
            symbols: vec!["AAPL".to_string()],
            server: ServerSettings::default(),
            channels: ChannelSettings::default(),
            overflow: OverflowPolicy::default(),
            stream_url_override,
        }
    }

    #[test_case("AAPL", &["AAPL"]; "single symbol")]
    #[test_case("AAPL,TSLA", &["AAPL", "TSLA"]; "two symbols")]
    #[test_case(" AAPL , TSLA ", &["AAPL", "TSLA"]; "whitespace trimmed")]
    #[test_case("AAPL,,TSLA,", &["AAPL", "TSLA"]; "blank entries skipped")]
    #[test_case("", &[]; "empty list")]
    fn symbol_list_parsing(raw: &str, expected: &[&str]) {
        assert_eq!(parse_symbols(raw), expected);
    }

    #[test]
    fn default_endpoint_appends_token() {
        let config = test_config(None);
        assert_eq!(
            config.stream_endpoint(),
            "wss://ws.finnhub.io?token=token123"
        );
    }

    #[test]
    fn endpoint_override_is_used_verbatim() {
        let config = test_config(Some("ws://127.0.0.1:9000".to_string()));
        assert_eq!(config.stream_endpoint(), "ws://127.0.0.1:9000");
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("token123".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("token123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn channel_settings_defaults() {
        let settings = ChannelSettings::default();
        assert_eq!(settings.broadcast_capacity, 1_024);
        assert_eq!(settings.client_queue_capacity, 256);
        assert_eq!(settings.subscribe_queue_capacity, 64);
    }

    #[test]
    fn server_settings_defaults() {
        assert_eq!(ServerSettings::default().port, 8080);
    }
}
