// dispatch.rs - Event Dispatcher

//! Single entry point for the runtime's event stream: every event is offered
//! to the span lifecycle manager and the metrics aggregator, which consult
//! their own enable switches independently.

use std::sync::Arc;

use crate::config::ObservabilityConfig;
use crate::correlate::SpanLifecycleManager;
use crate::event::AgentEvent;
use crate::metrics::{MetricsAggregator, MetricsSink, RuntimeSink};
use crate::trace::SpanExporter;

/// Fans each event out to tracing and metrics.
pub struct EventDispatcher {
    lifecycle: SpanLifecycleManager,
    metrics: MetricsAggregator,
}

impl EventDispatcher {
    pub fn new(
        config: ObservabilityConfig,
        exporter: Arc<dyn SpanExporter>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            lifecycle: SpanLifecycleManager::new(config.clone(), exporter),
            metrics: MetricsAggregator::new(config, sink),
        }
    }

    /// Dispatcher that records to the process-global `metrics` recorder.
    pub fn with_runtime_sink(config: ObservabilityConfig, exporter: Arc<dyn SpanExporter>) -> Self {
        Self::new(config, exporter, Arc::new(RuntimeSink))
    }

    /// Process one event. Never fails; malformed events are logged and
    /// dropped inside the consumers.
    pub fn dispatch(&self, event: &AgentEvent) {
        self.lifecycle.handle(event);
        self.metrics.record(event);
    }

    pub fn lifecycle(&self) -> &SpanLifecycleManager {
        &self.lifecycle
    }
}
