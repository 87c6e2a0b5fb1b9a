// event.rs - Agent Runtime Lifecycle Events

//! Lifecycle notifications emitted by an agent execution runtime.
//!
//! Every observable moment in a run's life is one [`AgentEvent`] variant.
//! Events for a single run arrive in causal order on some thread; events for
//! different runs, and concurrent sub-operations within one run, may arrive
//! on different threads simultaneously.

use serde::{Deserialize, Serialize};

/// Token usage reported by a model provider.
///
/// All fields are optional; absent counts never produce a metric series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt/input tokens consumed
    pub input_tokens: Option<u64>,

    /// Completion/output tokens produced
    pub output_tokens: Option<u64>,
}

impl TokenUsage {
    /// Usage with both directions known.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
        }
    }
}

/// Coarse event-kind discriminator used for parent resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// One end-to-end agent run (root or sub-agent)
    Run,

    /// One action invocation within a run
    Action,

    /// One model invocation
    LlmCall,

    /// A bounded iterative tool-use cycle driven by one LLM call
    ToolLoop,

    /// One tool invocation
    ToolCall,

    /// Goal achievement
    Goal,

    /// Planning, plan formulation, replanning
    Planning,

    /// State-machine transition within a run
    StateTransition,

    /// Lifecycle states such as stuck or waiting
    Lifecycle,

    /// Retrieval (RAG) request/response
    Rag,

    /// Candidate ranking outcome
    Ranking,

    /// Runtime creation of a new agent definition
    DynamicAgent,
}

/// A lifecycle notification from the agent runtime.
///
/// Each variant carries the run id it belongs to and the agent name (for
/// low-cardinality metric tags). Kinds that can run concurrently within one
/// run (LLM calls, tool loops) additionally carry an `interaction_id` that
/// disambiguates simultaneous operations sharing the run id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A run started. `parent_run_id` is set when this run is a sub-agent
    /// spawned by another run.
    RunStarted {
        run_id: String,
        parent_run_id: Option<String>,
        agent: String,
    },

    /// A run finished successfully.
    RunCompleted {
        run_id: String,
        agent: String,
        usage: Option<TokenUsage>,
        cost_micros: Option<u64>,
    },

    /// A run failed.
    RunFailed {
        run_id: String,
        agent: String,
        error: Option<String>,
        usage: Option<TokenUsage>,
        cost_micros: Option<u64>,
    },

    /// A run was forcibly terminated while work may still be in flight.
    RunKilled { run_id: String, agent: String },

    /// A named action began executing.
    ActionStarted {
        run_id: String,
        agent: String,
        action: String,
    },

    /// A named action produced its result.
    ActionCompleted {
        run_id: String,
        agent: String,
        action: String,
        success: bool,
        error: Option<String>,
    },

    /// A model invocation was issued.
    LlmRequested {
        run_id: String,
        agent: String,
        interaction_id: String,
        model: String,
        provider: Option<String>,
    },

    /// A model invocation returned.
    LlmCompleted {
        run_id: String,
        agent: String,
        interaction_id: String,
        model: String,
        success: bool,
        error: Option<String>,
        duration_ms: Option<u64>,
        usage: Option<TokenUsage>,
    },

    /// An iterative tool-use cycle began.
    ToolLoopStarted {
        run_id: String,
        agent: String,
        interaction_id: String,
    },

    /// An iterative tool-use cycle finished.
    ToolLoopCompleted {
        run_id: String,
        agent: String,
        interaction_id: String,
        iterations: u32,
    },

    /// A tool was invoked.
    ToolCallRequested {
        run_id: String,
        agent: String,
        tool: String,
        input: Option<String>,
    },

    /// A tool invocation returned.
    ToolCallCompleted {
        run_id: String,
        agent: String,
        tool: String,
        success: bool,
        error: Option<String>,
        duration_ms: Option<u64>,
    },

    /// A goal was achieved.
    GoalAchieved {
        run_id: String,
        agent: String,
        goal: String,
    },

    /// The run is ready to plan.
    PlanReady { run_id: String, agent: String },

    /// A plan was formulated. Repeated formulation within one run is
    /// replanning.
    PlanFormulated {
        run_id: String,
        agent: String,
        goal: Option<String>,
        step_count: Option<u32>,
    },

    /// A replan was explicitly requested.
    ReplanRequested {
        run_id: String,
        agent: String,
        reason: String,
    },

    /// The run's state machine transitioned.
    StateTransition {
        run_id: String,
        agent: String,
        from: String,
        to: String,
    },

    /// The run can make no further progress.
    RunStuck { run_id: String, agent: String },

    /// The run is waiting on external input.
    RunWaiting { run_id: String, agent: String },

    /// A retrieval request was issued.
    RagRequested {
        run_id: String,
        agent: String,
        query: String,
    },

    /// A retrieval request returned.
    RagCompleted {
        run_id: String,
        agent: String,
        query: Option<String>,
        result_count: u32,
    },

    /// A ranking over candidates selected a winner.
    RankingChoiceMade {
        run_id: String,
        agent: String,
        choice: String,
    },

    /// A ranking over candidates produced no acceptable winner.
    RankingNoChoice { run_id: String, agent: String },

    /// A new agent definition was created at runtime.
    DynamicAgentCreated {
        run_id: String,
        agent: String,
        name: String,
    },
}

impl AgentEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            AgentEvent::RunStarted { run_id, .. }
            | AgentEvent::RunCompleted { run_id, .. }
            | AgentEvent::RunFailed { run_id, .. }
            | AgentEvent::RunKilled { run_id, .. }
            | AgentEvent::ActionStarted { run_id, .. }
            | AgentEvent::ActionCompleted { run_id, .. }
            | AgentEvent::LlmRequested { run_id, .. }
            | AgentEvent::LlmCompleted { run_id, .. }
            | AgentEvent::ToolLoopStarted { run_id, .. }
            | AgentEvent::ToolLoopCompleted { run_id, .. }
            | AgentEvent::ToolCallRequested { run_id, .. }
            | AgentEvent::ToolCallCompleted { run_id, .. }
            | AgentEvent::GoalAchieved { run_id, .. }
            | AgentEvent::PlanReady { run_id, .. }
            | AgentEvent::PlanFormulated { run_id, .. }
            | AgentEvent::ReplanRequested { run_id, .. }
            | AgentEvent::StateTransition { run_id, .. }
            | AgentEvent::RunStuck { run_id, .. }
            | AgentEvent::RunWaiting { run_id, .. }
            | AgentEvent::RagRequested { run_id, .. }
            | AgentEvent::RagCompleted { run_id, .. }
            | AgentEvent::RankingChoiceMade { run_id, .. }
            | AgentEvent::RankingNoChoice { run_id, .. }
            | AgentEvent::DynamicAgentCreated { run_id, .. } => run_id,
        }
    }

    /// The agent name carried by this event.
    pub fn agent(&self) -> &str {
        match self {
            AgentEvent::RunStarted { agent, .. }
            | AgentEvent::RunCompleted { agent, .. }
            | AgentEvent::RunFailed { agent, .. }
            | AgentEvent::RunKilled { agent, .. }
            | AgentEvent::ActionStarted { agent, .. }
            | AgentEvent::ActionCompleted { agent, .. }
            | AgentEvent::LlmRequested { agent, .. }
            | AgentEvent::LlmCompleted { agent, .. }
            | AgentEvent::ToolLoopStarted { agent, .. }
            | AgentEvent::ToolLoopCompleted { agent, .. }
            | AgentEvent::ToolCallRequested { agent, .. }
            | AgentEvent::ToolCallCompleted { agent, .. }
            | AgentEvent::GoalAchieved { agent, .. }
            | AgentEvent::PlanReady { agent, .. }
            | AgentEvent::PlanFormulated { agent, .. }
            | AgentEvent::ReplanRequested { agent, .. }
            | AgentEvent::StateTransition { agent, .. }
            | AgentEvent::RunStuck { agent, .. }
            | AgentEvent::RunWaiting { agent, .. }
            | AgentEvent::RagRequested { agent, .. }
            | AgentEvent::RagCompleted { agent, .. }
            | AgentEvent::RankingChoiceMade { agent, .. }
            | AgentEvent::RankingNoChoice { agent, .. }
            | AgentEvent::DynamicAgentCreated { agent, .. } => agent,
        }
    }

    /// Kind discriminator for parent resolution and category toggles.
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::RunStarted { .. }
            | AgentEvent::RunCompleted { .. }
            | AgentEvent::RunFailed { .. }
            | AgentEvent::RunKilled { .. } => EventKind::Run,
            AgentEvent::ActionStarted { .. } | AgentEvent::ActionCompleted { .. } => {
                EventKind::Action
            }
            AgentEvent::LlmRequested { .. } | AgentEvent::LlmCompleted { .. } => EventKind::LlmCall,
            AgentEvent::ToolLoopStarted { .. } | AgentEvent::ToolLoopCompleted { .. } => {
                EventKind::ToolLoop
            }
            AgentEvent::ToolCallRequested { .. } | AgentEvent::ToolCallCompleted { .. } => {
                EventKind::ToolCall
            }
            AgentEvent::GoalAchieved { .. } => EventKind::Goal,
            AgentEvent::PlanReady { .. }
            | AgentEvent::PlanFormulated { .. }
            | AgentEvent::ReplanRequested { .. } => EventKind::Planning,
            AgentEvent::StateTransition { .. } => EventKind::StateTransition,
            AgentEvent::RunStuck { .. } | AgentEvent::RunWaiting { .. } => EventKind::Lifecycle,
            AgentEvent::RagRequested { .. } | AgentEvent::RagCompleted { .. } => EventKind::Rag,
            AgentEvent::RankingChoiceMade { .. } | AgentEvent::RankingNoChoice { .. } => {
                EventKind::Ranking
            }
            AgentEvent::DynamicAgentCreated { .. } => EventKind::DynamicAgent,
        }
    }
}
