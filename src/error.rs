// error.rs - Telemetry Errors

/// Errors from fallible setup paths.
///
/// The event-handling path itself never returns errors: malformed events
/// are logged and dropped, never surfaced to the runtime delivering them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to install metrics recorder: {0}")]
    RecorderInstall(String),

    #[error("Invalid metrics configuration: {0}")]
    InvalidMetricsConfig(String),
}
