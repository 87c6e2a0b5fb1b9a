// correlate/mod.rs - Event-to-Span Correlation Engine

//! The correlation core: keyed stores of open spans, the parent-resolution
//! rules, and the span lifecycle state machine that opens, tags and closes
//! spans exactly once across concurrent, out-of-order completions.

mod lifecycle;
mod registry;
mod resolver;

pub use lifecycle::{SpanLifecycleManager, TOOL_LOOP_SPAN_NAME};
pub use registry::{CallKey, OpenSpan, RegistryStats, SpanRegistry};
pub use resolver::{CorrelationKeys, resolve_parent};
