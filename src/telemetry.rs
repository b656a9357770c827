//! Tracing subscriber setup for binaries embedding the clients
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the host process. This helper gives hosts the same structured
//! output the clients were written against.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed, or installation failed
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_filter: "info,tee_client=debug,h2=warn,tower=warn,hyper=warn".to_string(),
        }
    }
}

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over `default_filter`.
pub fn init_tracing(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
    });
    let text_layer = (!config.json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::SubscriberInit(e.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_human_readable() {
        let config = TelemetryConfig::default();
        assert!(!config.json);
        assert!(config.default_filter.contains("tee_client=debug"));
    }

    #[test]
    fn second_init_fails() {
        let config = TelemetryConfig {
            json: true,
            ..Default::default()
        };
        // The first call may lose to another test harness subscriber
        let _ = init_tracing(config.clone());

        let err = init_tracing(config).unwrap_err();
        assert!(err.to_string().contains("failed to initialize"));
    }
}
