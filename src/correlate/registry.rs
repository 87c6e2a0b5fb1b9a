// correlate/registry.rs - Open Span Registry

use dashmap::DashMap;

use crate::trace::scope::ScopeGuard;
use crate::trace::{FinishedSpan, SpanContext, SpanHandle};

/// Correlation key for kinds that can run concurrently within one run.
///
/// The interaction id is part of the key by design: a run-id-only key lets
/// two concurrent LLM calls in the same run overwrite each other's entry,
/// leaving one span unclosed and the other closed twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub run_id: String,
    pub interaction_id: String,
}

impl CallKey {
    pub fn new(run_id: impl Into<String>, interaction_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            interaction_id: interaction_id.into(),
        }
    }
}

/// A tracked open span together with its ambient-scope guard, if the span
/// was activated as the calling thread's ambient span.
#[derive(Debug)]
pub struct OpenSpan {
    pub handle: SpanHandle,
    scope: Option<ScopeGuard>,
}

impl OpenSpan {
    pub fn new(handle: SpanHandle, scope: Option<ScopeGuard>) -> Self {
        Self { handle, scope }
    }

    /// Release the ambient scope (if held) and end the span.
    pub fn finish(self) -> FinishedSpan {
        drop(self.scope);
        self.handle.finish()
    }
}

/// Counts of currently open entries, per kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub agents: usize,
    pub actions: usize,
    pub llm_calls: usize,
    pub tool_loops: usize,
    pub tool_calls: usize,
}

/// Concurrent stores of open spans, one per tracked event kind.
///
/// Pure storage: no parent resolution or status logic lives here. Each store
/// is keyed by the identifier appropriate to its kind's concurrency shape —
/// run id alone for agents and actions, run id plus interaction id for LLM
/// calls and tool loops, run id plus tool name for tool calls. `insert`
/// returns any displaced live entry so the caller can finish it instead of
/// leaking it.
#[derive(Debug, Default)]
pub struct SpanRegistry {
    agents: DashMap<String, OpenSpan>,
    actions: DashMap<String, OpenSpan>,
    llm_calls: DashMap<CallKey, OpenSpan>,
    tool_loops: DashMap<CallKey, OpenSpan>,
    tool_calls: DashMap<(String, String), OpenSpan>,
}

impl SpanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Agents (one per run id)

    pub fn insert_agent(&self, run_id: String, open: OpenSpan) -> Option<OpenSpan> {
        self.agents.insert(run_id, open)
    }

    pub fn agent_context(&self, run_id: &str) -> Option<SpanContext> {
        self.agents.get(run_id).map(|e| e.handle.context())
    }

    pub fn remove_agent(&self, run_id: &str) -> Option<OpenSpan> {
        self.agents.remove(run_id).map(|(_, open)| open)
    }

    /// Mutate the open agent span for a run in place. Returns false when no
    /// entry is open under that run id.
    pub fn with_agent_mut(&self, run_id: &str, f: impl FnOnce(&mut SpanHandle)) -> bool {
        match self.agents.get_mut(run_id) {
            Some(mut entry) => {
                f(&mut entry.handle);
                true
            }
            None => false,
        }
    }

    // Actions (one tracked per run id)

    pub fn insert_action(&self, run_id: String, open: OpenSpan) -> Option<OpenSpan> {
        self.actions.insert(run_id, open)
    }

    pub fn action_context(&self, run_id: &str) -> Option<SpanContext> {
        self.actions.get(run_id).map(|e| e.handle.context())
    }

    pub fn remove_action(&self, run_id: &str) -> Option<OpenSpan> {
        self.actions.remove(run_id).map(|(_, open)| open)
    }

    // LLM calls (keyed by run id + interaction id)

    pub fn insert_llm(&self, key: CallKey, open: OpenSpan) -> Option<OpenSpan> {
        self.llm_calls.insert(key, open)
    }

    pub fn llm_context(&self, key: &CallKey) -> Option<SpanContext> {
        self.llm_calls.get(key).map(|e| e.handle.context())
    }

    /// The most recently opened LLM span for a run, across interaction ids.
    pub fn latest_llm_context(&self, run_id: &str) -> Option<SpanContext> {
        self.llm_calls
            .iter()
            .filter(|e| e.key().run_id == run_id)
            .max_by_key(|e| e.value().handle.started_at())
            .map(|e| e.value().handle.context())
    }

    pub fn remove_llm(&self, key: &CallKey) -> Option<OpenSpan> {
        self.llm_calls.remove(key).map(|(_, open)| open)
    }

    // Tool loops (keyed by run id + interaction id)

    pub fn insert_tool_loop(&self, key: CallKey, open: OpenSpan) -> Option<OpenSpan> {
        self.tool_loops.insert(key, open)
    }

    pub fn remove_tool_loop(&self, key: &CallKey) -> Option<OpenSpan> {
        self.tool_loops.remove(key).map(|(_, open)| open)
    }

    // Tool calls (keyed by run id + tool name)

    pub fn insert_tool_call(
        &self,
        run_id: String,
        tool: String,
        open: OpenSpan,
    ) -> Option<OpenSpan> {
        self.tool_calls.insert((run_id, tool), open)
    }

    pub fn remove_tool_call(&self, run_id: &str, tool: &str) -> Option<OpenSpan> {
        self.tool_calls
            .remove(&(run_id.to_string(), tool.to_string()))
            .map(|(_, open)| open)
    }

    /// Remove and return every open descendant entry of a run: its action,
    /// LLM calls, tool loops and tool calls. The agent entry itself is left
    /// in place for the caller to close with the run's final status.
    pub fn drain_run(&self, run_id: &str) -> Vec<OpenSpan> {
        let mut drained = Vec::new();

        if let Some((_, open)) = self.actions.remove(run_id) {
            drained.push(open);
        }

        let llm_keys: Vec<CallKey> = self
            .llm_calls
            .iter()
            .filter(|e| e.key().run_id == run_id)
            .map(|e| e.key().clone())
            .collect();
        for key in llm_keys {
            if let Some((_, open)) = self.llm_calls.remove(&key) {
                drained.push(open);
            }
        }

        let loop_keys: Vec<CallKey> = self
            .tool_loops
            .iter()
            .filter(|e| e.key().run_id == run_id)
            .map(|e| e.key().clone())
            .collect();
        for key in loop_keys {
            if let Some((_, open)) = self.tool_loops.remove(&key) {
                drained.push(open);
            }
        }

        let call_keys: Vec<(String, String)> = self
            .tool_calls
            .iter()
            .filter(|e| e.key().0 == run_id)
            .map(|e| e.key().clone())
            .collect();
        for key in call_keys {
            if let Some((_, open)) = self.tool_calls.remove(&key) {
                drained.push(open);
            }
        }

        drained
    }

    /// Open-entry counts, for diagnostics and resolution-miss logging.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            agents: self.agents.len(),
            actions: self.actions.len(),
            llm_calls: self.llm_calls.len(),
            tool_loops: self.tool_loops.len(),
            tool_calls: self.tool_calls.len(),
        }
    }
}
