//! Tracing setup for Forgeline consumers.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Newline-delimited JSON, for log aggregation pipelines.
    Json,
}

/// Install the global tracing subscriber for a Forgeline process.
///
/// `level` is the default verbosity; `RUST_LOG` overrides it when set.
/// Returns whether this call installed the subscriber — repeated calls
/// are no-ops because the global subscriber can only be set once per
/// process.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        // First call may or may not win the global slot (other tests
        // race for it); the second call must simply report false.
        let _ = init_tracing(LogFormat::Text, Level::DEBUG);
        assert!(!init_tracing(LogFormat::Json, Level::INFO));
    }
}
