//! Global `tracing` subscriber setup for binaries.

use anyhow::Result;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format (for log aggregation).
    Json,
    /// Human-readable format (for development).
    #[default]
    Human,
}

/// Install a global tracing subscriber.
///
/// `RUST_LOG` overrides `default_directive` when set.
pub fn init_subscriber(format: LogFormat, default_directive: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))?;

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Human => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
