// Logging setup for the CLI
//
// Console-only tracing subscriber with an EnvFilter. Output goes to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "conveyor=info,conveyor_pipeline=info";
const QUIET_FILTER: &str = "warn";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "conveyor_pipeline=debug")
    pub log_filter: Option<String>,
    /// Filter used when `log_filter` is unset or invalid
    pub default_filter: &'static str,
    /// Whether to include the event target in each line
    pub with_target: bool,
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `LOG_TARGETS`: "false" hides event targets
    pub fn from_env(quiet: bool) -> Self {
        Self::from_lookup(quiet, |name| std::env::var(name).ok())
    }

    fn from_lookup(quiet: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            log_filter: lookup("RUST_LOG").or_else(|| lookup("LOG_LEVEL")),
            default_filter: if quiet { QUIET_FILTER } else { DEFAULT_FILTER },
            with_target: lookup("LOG_TARGETS")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(self.default_filter))
    }
}

/// Install the global tracing subscriber
pub fn init_telemetry(config: TelemetryConfig) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_filter(config.filter());

    tracing_subscriber::registry().with(console_layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_takes_precedence() {
        let config = TelemetryConfig::from_lookup(false, |name| match name {
            "RUST_LOG" => Some("debug".into()),
            "LOG_LEVEL" => Some("error".into()),
            _ => None,
        });
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert!(config.with_target);
    }

    #[test]
    fn test_quiet_default_filter() {
        let config = TelemetryConfig::from_lookup(true, |name| match name {
            "LOG_TARGETS" => Some("FALSE".into()),
            _ => None,
        });
        assert_eq!(config.log_filter, None);
        assert_eq!(config.default_filter, QUIET_FILTER);
        assert!(!config.with_target);
    }
}
