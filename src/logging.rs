//! Tracing setup for the CLI and embedders
//!
//! Logs go to stderr so stdout stays clean JSON. `RUST_LOG` picks the filter
//! (default `info`); `STRONGBOX_LOG_JSON=1` switches to one JSON object per line.

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_JSON_ENV: &str = "STRONGBOX_LOG_JSON";

pub fn init_logging() { init_logging_with("info") }

/// Same as [`init_logging`] with a caller-chosen fallback filter.
/// A second call is a no-op.
pub fn init_logging_with(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let use_json = std::env::var(LOG_JSON_ENV)
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .pretty()
            .with_writer(std::io::stderr)
            .try_init();
    }
}
