// logging.rs - Log Subscriber Configuration

use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log output format
#[derive(Clone, Debug, Default)]
pub enum LogFormat {
    /// Human-readable format (default)
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Configuration for the log subscriber
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "agent_telemetry=debug")
    pub filter: String,

    /// Output format
    pub format: LogFormat,

    /// Include target (module path)
    pub with_target: bool,

    /// ANSI colors (for terminal output)
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,agent_telemetry=debug".into(),
            format: LogFormat::Pretty,
            with_target: true,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Create a production config (JSON, minimal overhead)
    pub fn production() -> Self {
        Self {
            filter: "info".into(),
            format: LogFormat::Json,
            with_target: true,
            with_ansi: false,
        }
    }
}

/// Initialize the log subscriber.
///
/// Should be called once at application startup; later calls are ignored so
/// tests and embedders can call it unconditionally. `RUST_LOG` overrides the
/// configured filter.
pub fn init_logging(config: LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_target(config.with_target)
                .with_ansi(config.with_ansi);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .ok();
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_target(config.with_target);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .ok();
        }
    }

    tracing::info!(
        filter = %config.filter,
        format = ?config.format,
        "logging initialized"
    );
}
