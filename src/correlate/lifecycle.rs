// correlate/lifecycle.rs - Span Lifecycle Manager

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::ObservabilityConfig;
use crate::event::{AgentEvent, EventKind, TokenUsage};
use crate::trace::scope;
use crate::trace::{SpanExporter, SpanHandle, SpanStatus, TagValue};

use super::registry::{CallKey, OpenSpan, SpanRegistry};
use super::resolver::{CorrelationKeys, resolve_parent};

/// Span name shared by every tool loop, independent of interaction id.
/// Loop spans are disambiguated by their registry key, never by name.
pub const TOOL_LOOP_SPAN_NAME: &str = "tool_loop";

enum RunClose<'a> {
    Completed,
    Failed(Option<&'a str>),
    Killed,
}

impl RunClose<'_> {
    fn label(&self) -> &'static str {
        match self {
            RunClose::Completed => "completed",
            RunClose::Failed(_) => "failed",
            RunClose::Killed => "killed",
        }
    }
}

/// Drives each tracked unit of work through `absent -> open -> closed`.
///
/// On a start event: resolve the parent, open and tag a span, store it under
/// the kind-appropriate key, and (for run/action/LLM/tool-loop spans) enter
/// the thread's ambient scope. On the matching end event: remove the entry,
/// apply final tags and status, and end the span exactly once. An end with no
/// open entry is a no-op. Run-terminal events force-close every still-open
/// descendant of that run first.
///
/// Nothing here returns an error or panics on bad input; the event-delivery
/// path is shared with unrelated listeners in the host runtime.
pub struct SpanLifecycleManager {
    config: Arc<ObservabilityConfig>,
    registry: SpanRegistry,
    exporter: Arc<dyn SpanExporter>,
    plan_iterations: DashMap<String, u64>,
}

impl SpanLifecycleManager {
    pub fn new(config: Arc<ObservabilityConfig>, exporter: Arc<dyn SpanExporter>) -> Self {
        Self {
            config,
            registry: SpanRegistry::new(),
            exporter,
            plan_iterations: DashMap::new(),
        }
    }

    /// The registry of currently open spans.
    pub fn registry(&self) -> &SpanRegistry {
        &self.registry
    }

    /// Add an attribute to a run's open span without changing its state.
    /// A tag on a run with no open span is ignored.
    pub fn annotate_run(&self, run_id: &str, key: &str, value: impl Into<TagValue>) {
        if !self.config.tracing_enabled {
            return;
        }
        if !self.registry.with_agent_mut(run_id, |span| span.tag(key, value)) {
            debug!(run_id, key, "annotation for a run with no open span, ignoring");
        }
    }

    /// Process one lifecycle event.
    pub fn handle(&self, event: &AgentEvent) {
        if !self.config.tracing_enabled {
            return;
        }
        if event.run_id().is_empty() {
            warn!(kind = ?event.kind(), "event missing run id, dropping");
            return;
        }

        match event {
            AgentEvent::RunStarted {
                run_id,
                parent_run_id,
                agent,
            } => self.open_run(run_id, parent_run_id.as_deref(), agent),

            AgentEvent::RunCompleted {
                run_id,
                usage,
                cost_micros,
                ..
            } => self.close_run(run_id, RunClose::Completed, *usage, *cost_micros),

            AgentEvent::RunFailed {
                run_id,
                error,
                usage,
                cost_micros,
                ..
            } => self.close_run(
                run_id,
                RunClose::Failed(error.as_deref()),
                *usage,
                *cost_micros,
            ),

            AgentEvent::RunKilled { run_id, .. } => {
                self.close_run(run_id, RunClose::Killed, None, None)
            }

            AgentEvent::ActionStarted { run_id, action, .. } => self.open_action(run_id, action),

            AgentEvent::ActionCompleted {
                run_id,
                success,
                error,
                ..
            } => self.close_action(run_id, *success, error.as_deref()),

            AgentEvent::LlmRequested {
                run_id,
                interaction_id,
                model,
                provider,
                ..
            } => self.open_llm(run_id, interaction_id, model, provider.as_deref()),

            AgentEvent::LlmCompleted {
                run_id,
                interaction_id,
                success,
                error,
                duration_ms,
                usage,
                ..
            } => self.close_llm(
                run_id,
                interaction_id,
                *success,
                error.as_deref(),
                *duration_ms,
                *usage,
            ),

            AgentEvent::ToolLoopStarted {
                run_id,
                interaction_id,
                ..
            } => self.open_tool_loop(run_id, interaction_id),

            AgentEvent::ToolLoopCompleted {
                run_id,
                interaction_id,
                iterations,
                ..
            } => self.close_tool_loop(run_id, interaction_id, *iterations),

            AgentEvent::ToolCallRequested {
                run_id,
                tool,
                input,
                ..
            } => self.open_tool_call(run_id, tool, input.as_deref()),

            AgentEvent::ToolCallCompleted {
                run_id,
                tool,
                success,
                error,
                duration_ms,
                ..
            } => self.close_tool_call(run_id, tool, *success, error.as_deref(), *duration_ms),

            AgentEvent::GoalAchieved { run_id, goal, .. } => {
                let short = short_name(goal);
                self.emit_singular(
                    EventKind::Goal,
                    run_id,
                    &format!("goal:{short}"),
                    SpanStatus::Ok,
                    |span| {
                        span.tag("event.type", "goal_achieved");
                        span.tag("agent.goal.name", goal.as_str());
                    },
                );
            }

            AgentEvent::PlanReady { run_id, .. } => self.emit_singular(
                EventKind::Planning,
                run_id,
                "planning:ready",
                SpanStatus::Ok,
                |span| span.tag("event.type", "planning"),
            ),

            AgentEvent::PlanFormulated {
                run_id,
                goal,
                step_count,
                ..
            } => self.plan_formulated(run_id, goal.as_deref(), *step_count),

            AgentEvent::ReplanRequested { run_id, reason, .. } => self.emit_singular(
                EventKind::Planning,
                run_id,
                "planning:replan_requested",
                SpanStatus::Ok,
                |span| {
                    span.tag("event.type", "planning");
                    span.tag("agent.replan.reason", reason.as_str());
                },
            ),

            AgentEvent::StateTransition {
                run_id, from, to, ..
            } => self.emit_singular(
                EventKind::StateTransition,
                run_id,
                "state:transition",
                SpanStatus::Ok,
                |span| {
                    span.tag("event.type", "state_transition");
                    span.tag("agent.state.from", from.as_str());
                    span.tag("agent.state.to", to.as_str());
                },
            ),

            AgentEvent::RunStuck { run_id, .. } => self.emit_singular(
                EventKind::Lifecycle,
                run_id,
                "lifecycle:stuck",
                SpanStatus::Error,
                |span| {
                    span.tag("event.type", "lifecycle");
                    span.tag("agent.lifecycle.state", "stuck");
                },
            ),

            AgentEvent::RunWaiting { run_id, .. } => self.emit_singular(
                EventKind::Lifecycle,
                run_id,
                "lifecycle:waiting",
                SpanStatus::Ok,
                |span| {
                    span.tag("event.type", "lifecycle");
                    span.tag("agent.lifecycle.state", "waiting");
                },
            ),

            AgentEvent::RagRequested { run_id, query, .. } => self.emit_singular(
                EventKind::Rag,
                run_id,
                "rag:request",
                SpanStatus::Ok,
                |span| {
                    span.tag("event.type", "rag");
                    span.tag("gen_ai.operation.name", "rag");
                    span.tag("agent.rag.query", query.as_str());
                },
            ),

            AgentEvent::RankingChoiceMade {
                run_id, choice, ..
            } => self.emit_singular(
                EventKind::Ranking,
                run_id,
                "ranking:choice_made",
                SpanStatus::Ok,
                |span| {
                    span.tag("event.type", "ranking");
                    span.tag("agent.ranking.choice", choice.as_str());
                },
            ),

            AgentEvent::RankingNoChoice { run_id, .. } => self.emit_singular(
                EventKind::Ranking,
                run_id,
                "ranking:no_choice",
                SpanStatus::Error,
                |span| span.tag("event.type", "ranking"),
            ),

            AgentEvent::DynamicAgentCreated { run_id, name, .. } => self.emit_singular(
                EventKind::DynamicAgent,
                run_id,
                &format!("dynamic_agent:{name}"),
                SpanStatus::Ok,
                |span| {
                    span.tag("event.type", "dynamic_agent");
                    span.tag("agent.dynamic_agent.name", name.as_str());
                },
            ),

            AgentEvent::RagCompleted {
                run_id,
                query,
                result_count,
                ..
            } => {
                let query = query.clone();
                let result_count = *result_count;
                self.emit_singular(
                    EventKind::Rag,
                    run_id,
                    "rag:response",
                    SpanStatus::Ok,
                    move |span| {
                        span.tag("event.type", "rag");
                        span.tag("gen_ai.operation.name", "rag");
                        if let Some(query) = query {
                            span.tag("agent.rag.query", query);
                        }
                        span.tag("agent.rag.result_count", result_count as i64);
                    },
                );
            }
        }
    }

    // Runs

    fn open_run(&self, run_id: &str, parent_run_id: Option<&str>, agent: &str) {
        let keys = CorrelationKeys::with_parent_run(run_id, parent_run_id);
        let parent = resolve_parent(EventKind::Run, &keys, scope::current(), &self.registry);
        let is_subagent = parent_run_id.is_some();

        let mut handle = SpanHandle::start(agent, parent);
        handle.tag("event.type", "run");
        handle.tag("agent.run_id", run_id);
        handle.tag("agent.name", agent);
        handle.tag("agent.is_subagent", is_subagent);
        handle.tag("service.name", self.config.service_name.as_str());

        let guard = scope::enter(handle.context());
        if let Some(displaced) = self
            .registry
            .insert_agent(run_id.to_string(), OpenSpan::new(handle, Some(guard)))
        {
            warn!(run_id, "run span already open for this id, finishing displaced span");
            self.exporter.export(displaced.finish());
        }
        debug!(run_id, agent, "opened run span");
    }

    fn close_run(
        &self,
        run_id: &str,
        close: RunClose<'_>,
        usage: Option<TokenUsage>,
        cost_micros: Option<u64>,
    ) {
        let abnormal = !matches!(close, RunClose::Completed);

        for mut open in self.registry.drain_run(run_id) {
            if abnormal {
                open.handle.set_error("run terminated before completion");
            }
            debug!(run_id, span = open.handle.name(), "force-closing descendant span");
            self.exporter.export(open.finish());
        }
        self.plan_iterations.remove(run_id);

        let Some(mut open) = self.registry.remove_agent(run_id) else {
            debug!(run_id, "run close with no open run span, ignoring");
            return;
        };

        open.handle.tag("agent.status", close.label());
        if let Some(usage) = usage {
            if let Some(input) = usage.input_tokens {
                open.handle.tag("gen_ai.usage.input_tokens", input);
            }
            if let Some(output) = usage.output_tokens {
                open.handle.tag("gen_ai.usage.output_tokens", output);
            }
        }
        if let Some(cost) = cost_micros {
            open.handle.tag("agent.cost_micros", cost);
        }

        match close {
            RunClose::Completed => open.handle.set_status(SpanStatus::Ok),
            RunClose::Failed(error) => {
                open.handle.set_error(error.unwrap_or("agent run failed"));
            }
            RunClose::Killed => open.handle.set_error("agent run killed"),
        }

        debug!(run_id, status = close.label(), "closed run span");
        self.exporter.export(open.finish());
    }

    // Actions

    fn open_action(&self, run_id: &str, action: &str) {
        let keys = CorrelationKeys::run(run_id);
        let parent = self.resolve_or_warn(EventKind::Action, &keys, None);

        let mut handle = SpanHandle::start(short_name(action), parent);
        handle.tag("event.type", "action");
        handle.tag("agent.run_id", run_id);
        handle.tag("agent.action.name", action);
        handle.tag("gen_ai.operation.name", "execute_action");

        let guard = scope::enter(handle.context());
        if let Some(displaced) = self
            .registry
            .insert_action(run_id.to_string(), OpenSpan::new(handle, Some(guard)))
        {
            // One tracked action per run: a second concurrent action start
            // displaces the first, which is finished rather than leaked.
            warn!(
                run_id,
                displaced = displaced.handle.name(),
                "concurrent action start displaced an open action span"
            );
            self.exporter.export(displaced.finish());
        }
    }

    fn close_action(&self, run_id: &str, success: bool, error: Option<&str>) {
        let Some(mut open) = self.registry.remove_action(run_id) else {
            debug!(run_id, "action result with no open action span, ignoring");
            return;
        };

        open.handle
            .tag("agent.action.status", if success { "succeeded" } else { "failed" });
        if success {
            open.handle.set_status(SpanStatus::Ok);
        } else {
            open.handle.set_error(error.unwrap_or("action failed"));
        }
        self.exporter.export(open.finish());
    }

    // LLM calls

    fn open_llm(&self, run_id: &str, interaction_id: &str, model: &str, provider: Option<&str>) {
        if !self.config.traces(EventKind::LlmCall) {
            return;
        }

        let keys = CorrelationKeys::with_interaction(run_id, interaction_id);
        let parent = self.resolve_or_warn(EventKind::LlmCall, &keys, None);

        let mut handle = SpanHandle::start(format!("llm:{model}"), parent);
        handle.tag("event.type", "llm_call");
        handle.tag("agent.run_id", run_id);
        handle.tag("agent.llm.interaction_id", interaction_id);
        handle.tag("gen_ai.operation.name", "chat");
        handle.tag("gen_ai.request.model", model);
        if let Some(provider) = provider {
            handle.tag("gen_ai.provider.name", provider);
        }

        let guard = scope::enter(handle.context());
        let key = CallKey::new(run_id, interaction_id);
        if let Some(displaced) = self.registry.insert_llm(key, OpenSpan::new(handle, Some(guard))) {
            warn!(
                run_id,
                interaction_id, "LLM request reused a live interaction id, finishing displaced span"
            );
            self.exporter.export(displaced.finish());
        }
    }

    fn close_llm(
        &self,
        run_id: &str,
        interaction_id: &str,
        success: bool,
        error: Option<&str>,
        duration_ms: Option<u64>,
        usage: Option<TokenUsage>,
    ) {
        let key = CallKey::new(run_id, interaction_id);
        let Some(mut open) = self.registry.remove_llm(&key) else {
            debug!(run_id, interaction_id, "LLM response with no open span, ignoring");
            return;
        };

        if let Some(duration) = duration_ms {
            open.handle.tag("agent.llm.duration_ms", duration);
        }
        if let Some(usage) = usage {
            if let Some(input) = usage.input_tokens {
                open.handle.tag("gen_ai.usage.input_tokens", input);
            }
            if let Some(output) = usage.output_tokens {
                open.handle.tag("gen_ai.usage.output_tokens", output);
            }
        }
        if success {
            open.handle.set_status(SpanStatus::Ok);
        } else {
            open.handle.set_error(error.unwrap_or("LLM call failed"));
        }
        self.exporter.export(open.finish());
    }

    // Tool loops

    fn open_tool_loop(&self, run_id: &str, interaction_id: &str) {
        if !self.config.traces(EventKind::ToolLoop) {
            return;
        }

        let keys = CorrelationKeys::with_interaction(run_id, interaction_id);
        let parent = self.resolve_or_warn(EventKind::ToolLoop, &keys, None);

        let mut handle = SpanHandle::start(TOOL_LOOP_SPAN_NAME, parent);
        handle.tag("event.type", "tool_loop");
        handle.tag("agent.run_id", run_id);

        let guard = scope::enter(handle.context());
        let key = CallKey::new(run_id, interaction_id);
        if let Some(displaced) = self
            .registry
            .insert_tool_loop(key, OpenSpan::new(handle, Some(guard)))
        {
            warn!(
                run_id,
                interaction_id, "tool loop reused a live interaction id, finishing displaced span"
            );
            self.exporter.export(displaced.finish());
        }
    }

    fn close_tool_loop(&self, run_id: &str, interaction_id: &str, iterations: u32) {
        let key = CallKey::new(run_id, interaction_id);
        let Some(mut open) = self.registry.remove_tool_loop(&key) else {
            debug!(run_id, interaction_id, "tool loop end with no open span, ignoring");
            return;
        };

        open.handle.tag("agent.tool_loop.iterations", iterations as i64);
        open.handle.set_status(SpanStatus::Ok);
        self.exporter.export(open.finish());
    }

    // Tool calls

    fn open_tool_call(&self, run_id: &str, tool: &str, input: Option<&str>) {
        if !self.config.traces(EventKind::ToolCall) {
            return;
        }

        let keys = CorrelationKeys::run(run_id);
        let parent = self.resolve_or_warn(EventKind::ToolCall, &keys, scope::current());

        let mut handle = SpanHandle::start(format!("tool:{tool}"), parent);
        handle.tag("event.type", "tool_call");
        handle.tag("agent.run_id", run_id);
        handle.tag("gen_ai.operation.name", "execute_tool");
        handle.tag("gen_ai.tool.name", tool);
        if let Some(input) = input {
            handle.tag("input.value", input);
        }

        // Tool calls are synchronous within their caller's scope; they do not
        // become the ambient span themselves.
        if let Some(displaced) =
            self.registry
                .insert_tool_call(run_id.to_string(), tool.to_string(), OpenSpan::new(handle, None))
        {
            warn!(run_id, tool, "concurrent call to the same tool displaced an open span");
            self.exporter.export(displaced.finish());
        }
    }

    fn close_tool_call(
        &self,
        run_id: &str,
        tool: &str,
        success: bool,
        error: Option<&str>,
        duration_ms: Option<u64>,
    ) {
        let Some(mut open) = self.registry.remove_tool_call(run_id, tool) else {
            debug!(run_id, tool, "tool response with no open span, ignoring");
            return;
        };

        if let Some(duration) = duration_ms {
            open.handle.tag("agent.tool.duration_ms", duration);
        }
        if success {
            open.handle.set_status(SpanStatus::Ok);
        } else {
            open.handle.set_error(error.unwrap_or("tool call failed"));
        }
        self.exporter.export(open.finish());
    }

    // Singular events: open and close a child span in one step.

    fn plan_formulated(&self, run_id: &str, goal: Option<&str>, step_count: Option<u32>) {
        if !self.config.traces(EventKind::Planning) {
            return;
        }

        let iteration = {
            let mut entry = self.plan_iterations.entry(run_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        let name = if iteration > 1 {
            "planning:replanning"
        } else {
            "planning:formulated"
        };
        let goal = goal.map(str::to_string);

        self.emit_singular(EventKind::Planning, run_id, name, SpanStatus::Ok, move |span| {
            span.tag("event.type", "planning");
            span.tag("agent.plan.iteration", iteration as i64);
            if let Some(goal) = goal {
                span.tag("agent.plan.goal", goal);
            }
            if let Some(steps) = step_count {
                span.tag("agent.plan.step_count", steps as i64);
            }
        });
    }

    fn emit_singular(
        &self,
        kind: EventKind,
        run_id: &str,
        name: &str,
        status: SpanStatus,
        tag: impl FnOnce(&mut SpanHandle),
    ) {
        if !self.config.traces(kind) {
            return;
        }

        let keys = CorrelationKeys::run(run_id);
        let parent = self.resolve_or_warn(kind, &keys, None);

        let mut handle = SpanHandle::start(name, parent);
        handle.tag("agent.run_id", run_id);
        tag(&mut handle);
        handle.set_status(status);
        self.exporter.export(handle.finish());
    }

    fn resolve_or_warn(
        &self,
        kind: EventKind,
        keys: &CorrelationKeys<'_>,
        ambient: Option<crate::trace::SpanContext>,
    ) -> Option<crate::trace::SpanContext> {
        let parent = resolve_parent(kind, keys, ambient, &self.registry);
        if parent.is_none() {
            let stats = self.registry.stats();
            warn!(
                run_id = keys.run_id,
                ?kind,
                open_agents = stats.agents,
                open_actions = stats.actions,
                open_llm_calls = stats.llm_calls,
                "no parent span found, starting a new trace root"
            );
        }
        parent
    }
}

fn short_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::InMemoryExporter;

    fn manager(config: ObservabilityConfig) -> (SpanLifecycleManager, Arc<InMemoryExporter>) {
        let exporter = Arc::new(InMemoryExporter::new());
        let manager = SpanLifecycleManager::new(Arc::new(config), exporter.clone());
        (manager, exporter)
    }

    fn run_started(run_id: &str, agent: &str) -> AgentEvent {
        AgentEvent::RunStarted {
            run_id: run_id.into(),
            parent_run_id: None,
            agent: agent.into(),
        }
    }

    fn run_completed(run_id: &str, agent: &str) -> AgentEvent {
        AgentEvent::RunCompleted {
            run_id: run_id.into(),
            agent: agent.into(),
            usage: None,
            cost_micros: None,
        }
    }

    fn action_started(run_id: &str, action: &str) -> AgentEvent {
        AgentEvent::ActionStarted {
            run_id: run_id.into(),
            agent: "TestAgent".into(),
            action: action.into(),
        }
    }

    fn action_completed(run_id: &str, action: &str, success: bool) -> AgentEvent {
        AgentEvent::ActionCompleted {
            run_id: run_id.into(),
            agent: "TestAgent".into(),
            action: action.into(),
            success,
            error: None,
        }
    }

    fn llm_requested(run_id: &str, interaction: &str, model: &str) -> AgentEvent {
        AgentEvent::LlmRequested {
            run_id: run_id.into(),
            agent: "TestAgent".into(),
            interaction_id: interaction.into(),
            model: model.into(),
            provider: Some("openai".into()),
        }
    }

    fn llm_completed(run_id: &str, interaction: &str, model: &str, success: bool) -> AgentEvent {
        AgentEvent::LlmCompleted {
            run_id: run_id.into(),
            agent: "TestAgent".into(),
            interaction_id: interaction.into(),
            model: model.into(),
            success,
            error: None,
            duration_ms: Some(150),
            usage: None,
        }
    }

    #[test]
    fn test_run_span_has_attributes_and_ok_status() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&run_completed("run-1", "TestAgent"));

        let spans = exporter.finished();
        assert_eq!(spans.len(), 1);

        let span = &spans[0];
        assert_eq!(span.name, "TestAgent");
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.tag_str("agent.run_id"), Some("run-1"));
        assert_eq!(span.tag_str("agent.status"), Some("completed"));
        assert_eq!(span.tags.get("agent.is_subagent"), Some(&false.into()));
        assert!(span.parent_span_id.is_none());
    }

    #[test]
    fn test_failed_run_sets_error_status() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::RunFailed {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            error: Some("something went wrong".into()),
            usage: None,
            cost_micros: None,
        });

        let span = exporter.find("TestAgent").unwrap();
        assert_eq!(span.status, SpanStatus::Error);
        assert_eq!(span.error.as_deref(), Some("something went wrong"));
        assert_eq!(span.tag_str("agent.status"), Some("failed"));
    }

    #[test]
    fn test_subagent_is_child_of_parent_run() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("parent-run", "ParentAgent"));
        manager.handle(&AgentEvent::RunStarted {
            run_id: "child-run".into(),
            parent_run_id: Some("parent-run".into()),
            agent: "ChildAgent".into(),
        });
        manager.handle(&run_completed("child-run", "ChildAgent"));
        manager.handle(&run_completed("parent-run", "ParentAgent"));

        let parent = exporter.find("ParentAgent").unwrap();
        let child = exporter.find("ChildAgent").unwrap();

        assert_eq!(child.trace_id, parent.trace_id);
        assert_eq!(child.tags.get("agent.is_subagent"), Some(&true.into()));
        // The child run started inside the parent's ambient scope on this
        // thread; the ambient span (the parent run) wins parent resolution.
        assert_eq!(child.parent_span_id, Some(parent.span_id));
    }

    #[test]
    fn test_action_is_child_of_run_span() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&action_started("run-1", "com.example.MyAction"));
        manager.handle(&action_completed("run-1", "com.example.MyAction", true));
        manager.handle(&run_completed("run-1", "TestAgent"));

        let agent = exporter.find("TestAgent").unwrap();
        let action = exporter.find("MyAction").unwrap();

        assert_eq!(action.parent_span_id, Some(agent.span_id));
        assert_eq!(action.trace_id, agent.trace_id);
        assert_eq!(action.tag_str("agent.action.name"), Some("com.example.MyAction"));
        assert_eq!(action.tag_str("agent.action.status"), Some("succeeded"));
        assert_eq!(action.status, SpanStatus::Ok);
    }

    #[test]
    fn test_failed_action_sets_error() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&action_started("run-1", "MyAction"));
        manager.handle(&action_completed("run-1", "MyAction", false));

        let action = exporter.find("MyAction").unwrap();
        assert_eq!(action.status, SpanStatus::Error);
        assert_eq!(action.tag_str("agent.action.status"), Some("failed"));
    }

    #[test]
    fn test_llm_is_child_of_action_with_genai_tags() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&action_started("run-1", "MyAction"));
        manager.handle(&llm_requested("run-1", "call-1", "gpt-4"));
        manager.handle(&llm_completed("run-1", "call-1", "gpt-4", true));
        manager.handle(&action_completed("run-1", "MyAction", true));
        manager.handle(&run_completed("run-1", "TestAgent"));

        let action = exporter.find("MyAction").unwrap();
        let llm = exporter.find("llm:gpt-4").unwrap();

        assert_eq!(llm.parent_span_id, Some(action.span_id));
        assert_eq!(llm.tag_str("gen_ai.operation.name"), Some("chat"));
        assert_eq!(llm.tag_str("gen_ai.request.model"), Some("gpt-4"));
        assert_eq!(llm.tag_str("gen_ai.provider.name"), Some("openai"));
        assert_eq!(llm.tag_int("agent.llm.duration_ms"), Some(150));
        assert_eq!(llm.status, SpanStatus::Ok);
    }

    #[test]
    fn test_llm_falls_back_to_run_span_without_action() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&llm_requested("run-1", "call-1", "gpt-4"));
        manager.handle(&llm_completed("run-1", "call-1", "gpt-4", true));
        manager.handle(&run_completed("run-1", "TestAgent"));

        let agent = exporter.find("TestAgent").unwrap();
        let llm = exporter.find("llm:gpt-4").unwrap();
        assert_eq!(llm.parent_span_id, Some(agent.span_id));
    }

    #[test]
    fn test_concurrent_llm_calls_close_independently() {
        // Regression for the overwrite hazard: two calls sharing run and
        // action must each keep their own registry entry.
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&action_started("run-1", "FanOut"));
        manager.handle(&llm_requested("run-1", "call-a", "gpt-4"));
        manager.handle(&llm_requested("run-1", "call-b", "gpt-4"));
        manager.handle(&llm_requested("run-1", "call-c", "gpt-4"));

        assert_eq!(manager.registry().stats().llm_calls, 3);

        // Closing one must not close or lose the others.
        manager.handle(&llm_completed("run-1", "call-b", "gpt-4", true));
        assert_eq!(manager.registry().stats().llm_calls, 2);
        assert_eq!(exporter.find_all("llm:gpt-4").len(), 1);

        manager.handle(&llm_completed("run-1", "call-a", "gpt-4", false));
        manager.handle(&llm_completed("run-1", "call-c", "gpt-4", true));

        let llm_spans = exporter.find_all("llm:gpt-4");
        assert_eq!(llm_spans.len(), 3);

        let interaction_ids: std::collections::HashSet<_> = llm_spans
            .iter()
            .map(|s| s.tag_str("agent.llm.interaction_id").unwrap().to_string())
            .collect();
        assert_eq!(interaction_ids.len(), 3);
        assert_eq!(
            llm_spans.iter().filter(|s| s.status == SpanStatus::Error).count(),
            1
        );
    }

    #[test]
    fn test_tool_loop_name_is_constant_across_interactions() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        for interaction in ["loop-1", "loop-2"] {
            manager.handle(&AgentEvent::ToolLoopStarted {
                run_id: "run-1".into(),
                agent: "TestAgent".into(),
                interaction_id: interaction.into(),
            });
        }
        for (interaction, iterations) in [("loop-1", 3), ("loop-2", 7)] {
            manager.handle(&AgentEvent::ToolLoopCompleted {
                run_id: "run-1".into(),
                agent: "TestAgent".into(),
                interaction_id: interaction.into(),
                iterations,
            });
        }

        let loops = exporter.find_all(TOOL_LOOP_SPAN_NAME);
        assert_eq!(loops.len(), 2);
        assert!(loops.iter().all(|s| s.name == TOOL_LOOP_SPAN_NAME));

        let iterations: std::collections::HashSet<_> = loops
            .iter()
            .map(|s| s.tag_int("agent.tool_loop.iterations").unwrap())
            .collect();
        assert_eq!(iterations, [3, 7].into_iter().collect());
    }

    #[test]
    fn test_tool_loop_nests_under_its_llm_call() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&llm_requested("run-1", "call-1", "gpt-4"));
        manager.handle(&AgentEvent::ToolLoopStarted {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            interaction_id: "call-1".into(),
        });
        manager.handle(&AgentEvent::ToolLoopCompleted {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            interaction_id: "call-1".into(),
            iterations: 2,
        });
        manager.handle(&llm_completed("run-1", "call-1", "gpt-4", true));

        let llm = exporter.find("llm:gpt-4").unwrap();
        let tool_loop = exporter.find(TOOL_LOOP_SPAN_NAME).unwrap();
        assert_eq!(tool_loop.parent_span_id, Some(llm.span_id));
    }

    #[test]
    fn test_tool_call_nests_under_ambient_llm_span() {
        let config = ObservabilityConfig {
            trace_tool_calls: true,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&action_started("run-1", "MyAction"));
        manager.handle(&llm_requested("run-1", "call-1", "gpt-4"));

        // Synchronous tool call while the LLM span is ambient on this thread.
        manager.handle(&AgentEvent::ToolCallRequested {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            tool: "WebSearch".into(),
            input: Some("{\"query\": \"test\"}".into()),
        });
        manager.handle(&AgentEvent::ToolCallCompleted {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            tool: "WebSearch".into(),
            success: true,
            error: None,
            duration_ms: Some(40),
        });

        manager.handle(&llm_completed("run-1", "call-1", "gpt-4", true));

        let llm = exporter.find("llm:gpt-4").unwrap();
        let tool = exporter.find("tool:WebSearch").unwrap();

        assert_eq!(tool.parent_span_id, Some(llm.span_id));
        assert_eq!(tool.tag_str("gen_ai.tool.name"), Some("WebSearch"));
        assert_eq!(tool.tag_str("input.value"), Some("{\"query\": \"test\"}"));
    }

    #[test]
    fn test_tool_calls_not_traced_when_disabled() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::ToolCallRequested {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            tool: "WebSearch".into(),
            input: None,
        });
        manager.handle(&AgentEvent::ToolCallCompleted {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            tool: "WebSearch".into(),
            success: true,
            error: None,
            duration_ms: None,
        });
        manager.handle(&run_completed("run-1", "TestAgent"));

        assert!(exporter.find("tool:WebSearch").is_none());
        // The run span itself is unaffected by the tool-call toggle.
        assert!(exporter.find("TestAgent").is_some());
    }

    #[test]
    fn test_disabling_llm_leaves_other_categories_alone() {
        let config = ObservabilityConfig {
            trace_llm_calls: false,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&action_started("run-1", "MyAction"));
        manager.handle(&llm_requested("run-1", "call-1", "gpt-4"));
        manager.handle(&llm_completed("run-1", "call-1", "gpt-4", true));
        manager.handle(&action_completed("run-1", "MyAction", true));
        manager.handle(&run_completed("run-1", "TestAgent"));

        assert!(exporter.find("llm:gpt-4").is_none());
        assert!(exporter.find("MyAction").is_some());
        assert!(exporter.find("TestAgent").is_some());
    }

    #[test]
    fn test_kill_force_closes_descendants_and_tolerates_late_ends() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&action_started("run-1", "MyAction"));
        manager.handle(&llm_requested("run-1", "call-a", "gpt-4"));
        manager.handle(&llm_requested("run-1", "call-b", "gpt-4"));
        manager.handle(&AgentEvent::ToolLoopStarted {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            interaction_id: "call-a".into(),
        });

        manager.handle(&AgentEvent::RunKilled {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
        });

        // Agent + action + two LLM calls + loop, all closed.
        assert_eq!(exporter.len(), 5);
        assert_eq!(manager.registry().stats(), Default::default());

        let agent = exporter.find("TestAgent").unwrap();
        assert_eq!(agent.status, SpanStatus::Error);
        assert_eq!(agent.tag_str("agent.status"), Some("killed"));
        for llm in exporter.find_all("llm:gpt-4") {
            assert_eq!(llm.status, SpanStatus::Error);
        }

        // Late-arriving ends after the force-close are silent no-ops.
        manager.handle(&llm_completed("run-1", "call-a", "gpt-4", true));
        manager.handle(&action_completed("run-1", "MyAction", true));
        manager.handle(&AgentEvent::ToolLoopCompleted {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            interaction_id: "call-a".into(),
            iterations: 1,
        });
        assert_eq!(exporter.len(), 5);
    }

    #[test]
    fn test_cross_thread_kill_releases_ambient_scope() {
        let exporter = Arc::new(InMemoryExporter::new());
        let manager = Arc::new(SpanLifecycleManager::new(
            Arc::new(ObservabilityConfig::default()),
            exporter.clone(),
        ));

        // Run opened here, killed from another thread while its span is
        // still this thread's ambient scope.
        manager.handle(&run_started("run-1", "TestAgent"));

        let killer = Arc::clone(&manager);
        std::thread::spawn(move || {
            killer.handle(&AgentEvent::RunKilled {
                run_id: "run-1".into(),
                agent: "TestAgent".into(),
            });
        })
        .join()
        .unwrap();

        // A fresh unrelated run on this thread must become a new trace root,
        // not a child of the killed run's span.
        manager.handle(&run_started("run-2", "TestAgent"));
        manager.handle(&run_completed("run-2", "TestAgent"));

        let killed = exporter
            .find_all("TestAgent")
            .into_iter()
            .find(|s| s.tag_str("agent.run_id") == Some("run-1"))
            .unwrap();
        let fresh = exporter
            .find_all("TestAgent")
            .into_iter()
            .find(|s| s.tag_str("agent.run_id") == Some("run-2"))
            .unwrap();

        assert!(fresh.parent_span_id.is_none());
        assert_ne!(fresh.trace_id, killed.trace_id);
    }

    #[test]
    fn test_llm_end_on_other_thread_releases_ambient_scope() {
        let exporter = Arc::new(InMemoryExporter::new());
        let config = ObservabilityConfig {
            trace_tool_calls: true,
            ..ObservabilityConfig::default()
        };
        let manager = Arc::new(SpanLifecycleManager::new(Arc::new(config), exporter.clone()));

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&llm_requested("run-1", "call-1", "gpt-4"));

        let worker = Arc::clone(&manager);
        std::thread::spawn(move || {
            worker.handle(&llm_completed("run-1", "call-1", "gpt-4", true));
        })
        .join()
        .unwrap();

        // The LLM span is closed; a tool call on this thread must fall back
        // to the run span instead of nesting under the dead LLM span.
        manager.handle(&AgentEvent::ToolCallRequested {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            tool: "WebSearch".into(),
            input: None,
        });
        manager.handle(&AgentEvent::ToolCallCompleted {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            tool: "WebSearch".into(),
            success: true,
            error: None,
            duration_ms: None,
        });
        manager.handle(&run_completed("run-1", "TestAgent"));

        let agent = exporter.find("TestAgent").unwrap();
        let tool = exporter.find("tool:WebSearch").unwrap();
        assert_eq!(tool.parent_span_id, Some(agent.span_id));
    }

    #[test]
    fn test_orphan_end_does_not_close_later_entry_with_same_key() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::RunKilled {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
        });

        // A new run reuses the id; the stale close above must not touch it.
        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&llm_requested("run-1", "call-a", "gpt-4"));
        manager.handle(&llm_completed("run-1", "call-a", "gpt-4", true));
        manager.handle(&run_completed("run-1", "TestAgent"));

        let runs = exporter.find_all("TestAgent");
        assert_eq!(runs.len(), 2);
        assert_eq!(exporter.find_all("llm:gpt-4").len(), 1);
    }

    #[test]
    fn test_goal_span_under_run() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::GoalAchieved {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            goal: "com.example.MyGoal".into(),
        });
        manager.handle(&run_completed("run-1", "TestAgent"));

        let agent = exporter.find("TestAgent").unwrap();
        let goal = exporter.find("goal:MyGoal").unwrap();
        assert_eq!(goal.parent_span_id, Some(agent.span_id));
        assert_eq!(goal.tag_str("agent.goal.name"), Some("com.example.MyGoal"));
        assert_eq!(goal.status, SpanStatus::Ok);
    }

    #[test]
    fn test_replanning_iteration_counter() {
        let config = ObservabilityConfig {
            trace_planning: true,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::PlanReady {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
        });
        manager.handle(&AgentEvent::PlanFormulated {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            goal: None,
            step_count: Some(3),
        });
        manager.handle(&AgentEvent::PlanFormulated {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            goal: None,
            step_count: Some(2),
        });
        manager.handle(&run_completed("run-1", "TestAgent"));

        assert!(exporter.find("planning:ready").is_some());
        let formulated = exporter.find("planning:formulated").unwrap();
        assert_eq!(formulated.tag_int("agent.plan.iteration"), Some(1));

        let replanning = exporter.find("planning:replanning").unwrap();
        assert_eq!(replanning.tag_int("agent.plan.iteration"), Some(2));
    }

    #[test]
    fn test_plan_iteration_resets_per_run() {
        let config = ObservabilityConfig {
            trace_planning: true,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        for _ in 0..2 {
            manager.handle(&run_started("run-1", "TestAgent"));
            manager.handle(&AgentEvent::PlanFormulated {
                run_id: "run-1".into(),
                agent: "TestAgent".into(),
                goal: None,
                step_count: None,
            });
            manager.handle(&run_completed("run-1", "TestAgent"));
        }

        // Both formulations are iteration 1; neither counts as replanning.
        assert_eq!(exporter.find_all("planning:formulated").len(), 2);
        assert!(exporter.find("planning:replanning").is_none());
    }

    #[test]
    fn test_replan_requested_span_disabled_by_default() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::ReplanRequested {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            reason: "tool loop detected issue".into(),
        });

        assert!(exporter.find("planning:replan_requested").is_none());
    }

    #[test]
    fn test_lifecycle_spans() {
        let config = ObservabilityConfig {
            trace_lifecycle_states: true,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::RunStuck {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
        });
        manager.handle(&AgentEvent::RunWaiting {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
        });

        let stuck = exporter.find("lifecycle:stuck").unwrap();
        assert_eq!(stuck.status, SpanStatus::Error);
        assert_eq!(stuck.tag_str("agent.lifecycle.state"), Some("stuck"));

        let waiting = exporter.find("lifecycle:waiting").unwrap();
        assert_eq!(waiting.status, SpanStatus::Ok);
    }

    #[test]
    fn test_rag_spans() {
        let config = ObservabilityConfig {
            trace_rag: true,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::RagRequested {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            query: "what is the meaning of life?".into(),
        });
        manager.handle(&AgentEvent::RagCompleted {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            query: Some("what is the meaning of life?".into()),
            result_count: 0,
        });

        let agent_ctx = manager.registry().agent_context("run-1").unwrap();

        let request = exporter.find("rag:request").unwrap();
        assert_eq!(request.parent_span_id, Some(agent_ctx.span_id));
        assert_eq!(
            request.tag_str("agent.rag.query"),
            Some("what is the meaning of life?")
        );

        let response = exporter.find("rag:response").unwrap();
        assert_eq!(response.tag_int("agent.rag.result_count"), Some(0));
    }

    #[test]
    fn test_ranking_spans() {
        let config = ObservabilityConfig {
            trace_ranking: true,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::RankingChoiceMade {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            choice: "WriterAgent".into(),
        });
        manager.handle(&AgentEvent::RankingNoChoice {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
        });

        let agent_ctx = manager.registry().agent_context("run-1").unwrap();

        let chosen = exporter.find("ranking:choice_made").unwrap();
        assert_eq!(chosen.parent_span_id, Some(agent_ctx.span_id));
        assert_eq!(chosen.tag_str("agent.ranking.choice"), Some("WriterAgent"));
        assert_eq!(chosen.status, SpanStatus::Ok);

        // A ranking that selects nothing is a failure of the run's plan.
        let no_choice = exporter.find("ranking:no_choice").unwrap();
        assert_eq!(no_choice.status, SpanStatus::Error);
    }

    #[test]
    fn test_ranking_disabled_by_default() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::RankingChoiceMade {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            choice: "WriterAgent".into(),
        });

        assert!(exporter.find("ranking:choice_made").is_none());
    }

    #[test]
    fn test_dynamic_agent_span() {
        let config = ObservabilityConfig {
            trace_dynamic_agents: true,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::DynamicAgentCreated {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            name: "Summarizer".into(),
        });

        let span = exporter.find("dynamic_agent:Summarizer").unwrap();
        assert_eq!(span.tag_str("agent.dynamic_agent.name"), Some("Summarizer"));
        assert_eq!(span.status, SpanStatus::Ok);
    }

    #[test]
    fn test_dynamic_agent_disabled_by_default() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::DynamicAgentCreated {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            name: "Summarizer".into(),
        });
        assert!(exporter.find("dynamic_agent:Summarizer").is_none());
    }

    #[test]
    fn test_state_transition_span() {
        let config = ObservabilityConfig {
            trace_state_transitions: true,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&AgentEvent::StateTransition {
            run_id: "run-1".into(),
            agent: "TestAgent".into(),
            from: "planning".into(),
            to: "executing".into(),
        });

        let span = exporter.find("state:transition").unwrap();
        assert_eq!(span.tag_str("agent.state.from"), Some("planning"));
        assert_eq!(span.tag_str("agent.state.to"), Some("executing"));
    }

    #[test]
    fn test_concurrent_action_start_displaces_without_leak() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&action_started("run-1", "ActionA"));
        manager.handle(&action_started("run-1", "ActionB"));

        // ActionA was displaced and finished; ActionB is the tracked one.
        assert!(exporter.find("ActionA").is_some());
        assert_eq!(manager.registry().stats().actions, 1);

        manager.handle(&action_completed("run-1", "ActionB", true));
        assert!(exporter.find("ActionB").is_some());
        assert_eq!(manager.registry().stats().actions, 0);
    }

    #[test]
    fn test_annotate_run_enriches_open_span() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.annotate_run("run-1", "agent.user_id", "user-42");
        manager.annotate_run("missing-run", "agent.user_id", "user-42");
        manager.handle(&run_completed("run-1", "TestAgent"));

        let span = exporter.find("TestAgent").unwrap();
        assert_eq!(span.tag_str("agent.user_id"), Some("user-42"));
    }

    #[test]
    fn test_empty_run_id_is_dropped() {
        let (manager, exporter) = manager(ObservabilityConfig::default());

        manager.handle(&run_started("", "TestAgent"));
        assert!(exporter.is_empty());
        assert_eq!(manager.registry().stats().agents, 0);
    }

    #[test]
    fn test_tracing_disabled_creates_no_spans() {
        let config = ObservabilityConfig {
            tracing_enabled: false,
            ..ObservabilityConfig::default()
        };
        let (manager, exporter) = manager(config);

        manager.handle(&run_started("run-1", "TestAgent"));
        manager.handle(&run_completed("run-1", "TestAgent"));
        assert!(exporter.is_empty());
    }

    #[test]
    fn test_interleaved_runs_on_separate_threads() {
        let exporter = Arc::new(InMemoryExporter::new());
        let manager = Arc::new(SpanLifecycleManager::new(
            Arc::new(ObservabilityConfig::default()),
            exporter.clone(),
        ));

        let mut handles = Vec::new();
        for t in 0..4 {
            let manager = Arc::clone(&manager);
            handles.push(std::thread::spawn(move || {
                let run_id = format!("run-{t}");
                let agent = format!("Agent{t}");
                manager.handle(&run_started(&run_id, &agent));
                manager.handle(&action_started(&run_id, "Work"));
                for i in 0..10 {
                    let call = format!("call-{i}");
                    manager.handle(&llm_requested(&run_id, &call, "gpt-4"));
                    manager.handle(&llm_completed(&run_id, &call, "gpt-4", true));
                }
                manager.handle(&action_completed(&run_id, "Work", true));
                manager.handle(&run_completed(&run_id, &agent));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // 4 runs x (1 run + 1 action + 10 LLM spans)
        assert_eq!(exporter.len(), 4 * 12);
        assert_eq!(manager.registry().stats(), Default::default());

        // Each run's spans stay in their own trace.
        for t in 0..4 {
            let run = exporter.find(&format!("Agent{t}")).unwrap();
            let children: Vec<_> = exporter
                .finished()
                .into_iter()
                .filter(|s| s.trace_id == run.trace_id)
                .collect();
            assert_eq!(children.len(), 12);
        }
    }
}
