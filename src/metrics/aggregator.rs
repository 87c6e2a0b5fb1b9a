// metrics/aggregator.rs - Event-to-Metrics Aggregation

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use crate::config::ObservabilityConfig;
use crate::event::{AgentEvent, TokenUsage};

use super::sink::MetricsSink;
use super::{LlmMetrics, PlanningMetrics, RunMetrics, ToolMetrics};

/// Turns lifecycle events into counter, gauge and histogram observations.
///
/// Completely independent of tracing: it works with tracing disabled and
/// keeps its own run-start clock instead of reading span timestamps. Token
/// and cost observations are only recorded when the event actually carries a
/// nonzero value, so absent provider usage never produces an empty series.
pub struct MetricsAggregator {
    config: Arc<ObservabilityConfig>,
    sink: Arc<dyn MetricsSink>,
    run_starts: DashMap<String, Instant>,
}

impl MetricsAggregator {
    pub fn new(config: Arc<ObservabilityConfig>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            sink,
            run_starts: DashMap::new(),
        }
    }

    /// Record the observations for one event.
    pub fn record(&self, event: &AgentEvent) {
        if !self.config.metrics_enabled {
            return;
        }

        match event {
            AgentEvent::RunStarted { run_id, agent, .. } => {
                self.run_starts.insert(run_id.clone(), Instant::now());
                self.sink
                    .adjust_gauge(RunMetrics::ACTIVE, &agent_labels(agent), 1.0);
            }

            AgentEvent::RunCompleted {
                run_id,
                agent,
                usage,
                cost_micros,
            } => self.run_ended(run_id, agent, "completed", *usage, *cost_micros),

            AgentEvent::RunFailed {
                run_id,
                agent,
                usage,
                cost_micros,
                ..
            } => self.run_ended(run_id, agent, "failed", *usage, *cost_micros),

            AgentEvent::RunKilled { run_id, agent } => {
                self.run_ended(run_id, agent, "killed", None, None)
            }

            AgentEvent::LlmRequested { agent, model, .. } => {
                let labels = [
                    ("agent", agent.clone()),
                    ("model", model.clone()),
                ];
                self.sink
                    .increment_counter(LlmMetrics::REQUESTS_TOTAL, &labels, 1);
            }

            AgentEvent::LlmCompleted {
                agent,
                model,
                duration_ms,
                ..
            } => {
                if let Some(duration) = duration_ms {
                    let labels = [
                        ("agent", agent.clone()),
                        ("model", model.clone()),
                    ];
                    self.sink.record_timer(
                        LlmMetrics::DURATION_SECONDS,
                        &labels,
                        *duration as f64 / 1000.0,
                    );
                }
            }

            AgentEvent::ToolCallRequested { agent, tool, .. } => {
                let labels = [("agent", agent.clone()), ("tool", tool.clone())];
                self.sink
                    .increment_counter(ToolMetrics::CALLS_TOTAL, &labels, 1);
            }

            AgentEvent::ToolCallCompleted {
                agent,
                tool,
                success,
                duration_ms,
                ..
            } => {
                if let Some(duration) = duration_ms {
                    let labels = [("tool", tool.clone())];
                    self.sink.record_timer(
                        ToolMetrics::DURATION_SECONDS,
                        &labels,
                        *duration as f64 / 1000.0,
                    );
                }
                if !success {
                    let labels = [("agent", agent.clone()), ("tool", tool.clone())];
                    self.sink
                        .increment_counter(ToolMetrics::ERRORS_TOTAL, &labels, 1);
                }
            }

            AgentEvent::ToolLoopCompleted {
                agent, iterations, ..
            } => {
                self.sink.record_distribution(
                    ToolMetrics::LOOP_ITERATIONS,
                    &agent_labels(agent),
                    *iterations as f64,
                );
            }

            AgentEvent::ReplanRequested { agent, .. } => {
                self.sink
                    .increment_counter(PlanningMetrics::REPLANS_TOTAL, &agent_labels(agent), 1);
            }

            AgentEvent::RunStuck { agent, .. } => {
                self.sink
                    .increment_counter(RunMetrics::STUCK_TOTAL, &agent_labels(agent), 1);
            }

            // Start-side and purely trace-shaped events carry no metric.
            AgentEvent::ActionStarted { .. }
            | AgentEvent::ActionCompleted { .. }
            | AgentEvent::ToolLoopStarted { .. }
            | AgentEvent::GoalAchieved { .. }
            | AgentEvent::PlanReady { .. }
            | AgentEvent::PlanFormulated { .. }
            | AgentEvent::StateTransition { .. }
            | AgentEvent::RunWaiting { .. }
            | AgentEvent::RagRequested { .. }
            | AgentEvent::RagCompleted { .. }
            | AgentEvent::RankingChoiceMade { .. }
            | AgentEvent::RankingNoChoice { .. }
            | AgentEvent::DynamicAgentCreated { .. } => {}
        }
    }

    fn run_ended(
        &self,
        run_id: &str,
        agent: &str,
        status: &str,
        usage: Option<TokenUsage>,
        cost_micros: Option<u64>,
    ) {
        // A terminal event for a run with no recorded start is a duplicate
        // or a straggler; recording anything for it would drive the active
        // gauge negative and double-count errors.
        let Some((_, started)) = self.run_starts.remove(run_id) else {
            debug!(run_id, status, "run end without recorded start, ignoring");
            return;
        };

        self.sink
            .adjust_gauge(RunMetrics::ACTIVE, &agent_labels(agent), -1.0);
        if status == "failed" {
            self.sink
                .increment_counter(RunMetrics::ERRORS_TOTAL, &agent_labels(agent), 1);
        }

        let labels = [
            ("agent", agent.to_string()),
            ("status", status.to_string()),
        ];
        self.sink.record_timer(
            RunMetrics::DURATION_SECONDS,
            &labels,
            started.elapsed().as_secs_f64(),
        );

        if let Some(usage) = usage {
            self.record_tokens(agent, "input", usage.input_tokens);
            self.record_tokens(agent, "output", usage.output_tokens);
        }
        if let Some(cost) = cost_micros.filter(|c| *c > 0) {
            self.sink
                .increment_counter(LlmMetrics::COST_TOTAL, &agent_labels(agent), cost);
        }
    }

    fn record_tokens(&self, agent: &str, direction: &'static str, count: Option<u64>) {
        // Zero or unreported counts produce no series.
        let Some(count) = count.filter(|c| *c > 0) else {
            return;
        };
        let labels = [
            ("agent", agent.to_string()),
            ("direction", direction.to_string()),
        ];
        self.sink
            .increment_counter(LlmMetrics::TOKENS_TOTAL, &labels, count);
    }
}

fn agent_labels(agent: &str) -> [(&'static str, String); 1] {
    [("agent", agent.to_string())]
}
