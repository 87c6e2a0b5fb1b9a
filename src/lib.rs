// lib.rs - Agent Runtime Telemetry
//
// Correlates the lifecycle event stream of an autonomous-agent runtime into
// properly nested distributed traces and Prometheus metrics.

#![doc = include_str!("../README.md")]

pub mod config;
pub mod correlate;
pub mod dispatch;
mod error;
pub mod event;
pub mod logging;
pub mod metrics;
pub mod trace;

// Re-export commonly used types
pub use config::ObservabilityConfig;
pub use correlate::{CallKey, SpanLifecycleManager, SpanRegistry, TOOL_LOOP_SPAN_NAME};
pub use dispatch::EventDispatcher;
pub use error::TelemetryError;
pub use event::{AgentEvent, EventKind, TokenUsage};
pub use logging::{LogFormat, LoggingConfig, init_logging};
pub use crate::metrics::{
    MetricsAggregator, MetricsSink, RuntimeSink,
    prometheus::{ExporterConfig, ExporterHandle, install_exporter},
};
pub use trace::{
    FinishedSpan, InMemoryExporter, NoopExporter, SpanContext, SpanExporter, SpanHandle,
    SpanStatus, TagValue,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ObservabilityConfig;
    pub use crate::dispatch::EventDispatcher;
    pub use crate::event::{AgentEvent, EventKind, TokenUsage};
    pub use crate::metrics::{MetricsSink, RuntimeSink};
    pub use crate::trace::{FinishedSpan, SpanExporter, SpanStatus};
}
