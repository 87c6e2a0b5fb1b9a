// correlate/resolver.rs - Parent Span Resolution

use crate::event::EventKind;
use crate::trace::SpanContext;

use super::registry::{CallKey, SpanRegistry};

/// Identifiers available on a start event for parent lookup.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationKeys<'a> {
    pub run_id: &'a str,
    pub parent_run_id: Option<&'a str>,
    pub interaction_id: Option<&'a str>,
}

impl<'a> CorrelationKeys<'a> {
    pub fn run(run_id: &'a str) -> Self {
        Self {
            run_id,
            parent_run_id: None,
            interaction_id: None,
        }
    }

    pub fn with_parent_run(run_id: &'a str, parent_run_id: Option<&'a str>) -> Self {
        Self {
            run_id,
            parent_run_id,
            interaction_id: None,
        }
    }

    pub fn with_interaction(run_id: &'a str, interaction_id: &'a str) -> Self {
        Self {
            run_id,
            parent_run_id: None,
            interaction_id: Some(interaction_id),
        }
    }
}

/// Resolve the parent span for a start event. Pure: reads the registry and
/// the caller-supplied ambient span, mutates nothing.
///
/// Resolution order, first match wins:
///
/// - Run: ambient span (cross-boundary trace continuation), else the parent
///   run's agent span, else none (new trace root).
/// - Action: agent span for the run.
/// - LLM call: action span for the run, else agent span.
/// - Tool loop: the LLM span for (run, interaction), else the most recently
///   opened LLM span for the run, else action span, else agent span.
/// - Tool call: ambient span, else action span, else agent span.
/// - Goal / planning / state transition / lifecycle / RAG / ranking /
///   dynamic agent: action span, else agent span.
///
/// `None` never means failure; the caller opens the span as a trace root.
pub fn resolve_parent(
    kind: EventKind,
    keys: &CorrelationKeys<'_>,
    ambient: Option<SpanContext>,
    registry: &SpanRegistry,
) -> Option<SpanContext> {
    match kind {
        EventKind::Run => ambient.or_else(|| {
            keys.parent_run_id
                .and_then(|parent| registry.agent_context(parent))
        }),

        EventKind::Action => registry.agent_context(keys.run_id),

        EventKind::LlmCall => registry
            .action_context(keys.run_id)
            .or_else(|| registry.agent_context(keys.run_id)),

        EventKind::ToolLoop => keys
            .interaction_id
            .and_then(|interaction| {
                registry.llm_context(&CallKey::new(keys.run_id, interaction))
            })
            .or_else(|| registry.latest_llm_context(keys.run_id))
            .or_else(|| registry.action_context(keys.run_id))
            .or_else(|| registry.agent_context(keys.run_id)),

        EventKind::ToolCall => ambient
            .or_else(|| registry.action_context(keys.run_id))
            .or_else(|| registry.agent_context(keys.run_id)),

        EventKind::Goal
        | EventKind::Planning
        | EventKind::StateTransition
        | EventKind::Lifecycle
        | EventKind::Rag
        | EventKind::Ranking
        | EventKind::DynamicAgent => registry
            .action_context(keys.run_id)
            .or_else(|| registry.agent_context(keys.run_id)),
    }
}
