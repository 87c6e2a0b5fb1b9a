// metrics/mod.rs - Metric Series

//! Metric series emitted by the aggregator, and the recorder plumbing.
//!
//! Series names are grouped into const-structs so call sites and the
//! Prometheus describe pass share one definition.

mod aggregator;
pub mod prometheus;
mod sink;

pub use aggregator::MetricsAggregator;
pub use sink::{MetricKind, MetricRecord, MetricsSink, RecordingSink, RuntimeSink};

/// Run-level series.
pub struct RunMetrics;

impl RunMetrics {
    /// Gauge: currently executing runs, by agent
    pub const ACTIVE: &'static str = "agent_runs_active";

    /// Histogram: end-to-end run duration, by agent and status
    pub const DURATION_SECONDS: &'static str = "agent_run_duration_seconds";

    /// Counter: failed runs, by agent
    pub const ERRORS_TOTAL: &'static str = "agent_run_errors_total";

    /// Counter: runs that reported being stuck, by agent
    pub const STUCK_TOTAL: &'static str = "agent_runs_stuck_total";
}

/// LLM invocation series.
pub struct LlmMetrics;

impl LlmMetrics {
    /// Counter: model invocations, by agent and model
    pub const REQUESTS_TOTAL: &'static str = "llm_requests_total";

    /// Histogram: model invocation latency, by agent and model
    pub const DURATION_SECONDS: &'static str = "llm_duration_seconds";

    /// Counter: tokens consumed/produced, by agent and direction
    pub const TOKENS_TOTAL: &'static str = "llm_tokens_total";

    /// Counter: spend in millionths of the billing currency, by agent
    pub const COST_TOTAL: &'static str = "llm_cost_micros_total";
}

/// Tool invocation series.
pub struct ToolMetrics;

impl ToolMetrics {
    /// Counter: tool invocations, by agent and tool
    pub const CALLS_TOTAL: &'static str = "tool_calls_total";

    /// Histogram: tool invocation latency, by tool
    pub const DURATION_SECONDS: &'static str = "tool_duration_seconds";

    /// Counter: failed tool invocations, by agent and tool
    pub const ERRORS_TOTAL: &'static str = "tool_errors_total";

    /// Histogram: iterations per tool loop, by agent
    pub const LOOP_ITERATIONS: &'static str = "tool_loop_iterations";
}

/// Planning series.
pub struct PlanningMetrics;

impl PlanningMetrics {
    /// Counter: explicit replan requests, by agent
    pub const REPLANS_TOTAL: &'static str = "planning_replans_total";
}
