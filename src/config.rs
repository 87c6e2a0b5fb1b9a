// config.rs - Observability Configuration

use crate::event::EventKind;

/// Configuration for the telemetry engine.
///
/// Tracing and metrics are independently toggleable, and individual tracing
/// categories can be switched off without affecting the others. The noisier
/// categories (planning, state transitions, lifecycle states, RAG, tool
/// calls) default to off.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Master switch for span creation
    pub tracing_enabled: bool,

    /// Master switch for metric recording
    pub metrics_enabled: bool,

    /// Trace individual LLM calls
    pub trace_llm_calls: bool,

    /// Trace individual tool invocations
    pub trace_tool_calls: bool,

    /// Trace iterative tool-use loops
    pub trace_tool_loops: bool,

    /// Trace planning and replanning events
    pub trace_planning: bool,

    /// Trace state-machine transitions
    pub trace_state_transitions: bool,

    /// Trace stuck/waiting lifecycle states
    pub trace_lifecycle_states: bool,

    /// Trace retrieval (RAG) requests and responses
    pub trace_rag: bool,

    /// Trace candidate-ranking outcomes
    pub trace_ranking: bool,

    /// Trace runtime creation of agent definitions
    pub trace_dynamic_agents: bool,

    /// Service name tagged on root spans
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            tracing_enabled: true,
            metrics_enabled: true,
            trace_llm_calls: true,
            trace_tool_calls: false,
            trace_tool_loops: true,
            trace_planning: false,
            trace_state_transitions: false,
            trace_lifecycle_states: false,
            trace_rag: false,
            trace_ranking: false,
            trace_dynamic_agents: false,
            service_name: "agent-telemetry".into(),
        }
    }
}

impl ObservabilityConfig {
    /// Every tracing category enabled.
    pub fn all_categories() -> Self {
        Self {
            trace_tool_calls: true,
            trace_planning: true,
            trace_state_transitions: true,
            trace_lifecycle_states: true,
            trace_rag: true,
            trace_ranking: true,
            trace_dynamic_agents: true,
            ..Self::default()
        }
    }

    /// Whether spans of this kind should be created.
    ///
    /// Run, action and goal spans have no per-category switch; they are
    /// governed by `tracing_enabled` alone.
    pub fn traces(&self, kind: EventKind) -> bool {
        if !self.tracing_enabled {
            return false;
        }
        match kind {
            EventKind::Run | EventKind::Action | EventKind::Goal => true,
            EventKind::LlmCall => self.trace_llm_calls,
            EventKind::ToolCall => self.trace_tool_calls,
            EventKind::ToolLoop => self.trace_tool_loops,
            EventKind::Planning => self.trace_planning,
            EventKind::StateTransition => self.trace_state_transitions,
            EventKind::Lifecycle => self.trace_lifecycle_states,
            EventKind::Rag => self.trace_rag,
            EventKind::Ranking => self.trace_ranking,
            EventKind::DynamicAgent => self.trace_dynamic_agents,
        }
    }
}
