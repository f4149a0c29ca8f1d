//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Create config with custom log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self, json: bool) -> Self {
        self.json_output = json;
        self
    }
}

impl From<&crate::config::Config> for TracingConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self::default()
            .with_log_level(config.log_level.clone())
            .with_json_output(config.log_json)
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Call once at startup; a second
/// call is ignored.
pub fn init_tracing(config: &TracingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    if result.is_ok() {
        tracing::info!(service = %config.service_name, "Tracing initialized");
    }
}
