//! Tracing Initialization
//!
//! Structured logging via `tracing` with an `EnvFilter`-driven fmt layer.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level directives (default: `tick_relay=info`)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber. Call once at startup.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env().add_directive(
        "tick_relay=info"
            .parse()
            .expect("static directive 'tick_relay=info' is valid"),
    );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
