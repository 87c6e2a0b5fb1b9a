// trace/mod.rs - Spans, Ambient Scope, Export

//! Span primitives: the open-span handle, the thread-local ambient scope used
//! to parent synchronously nested work, and the exporter seam through which
//! finished spans leave the engine.

mod export;
pub mod scope;
mod span;

pub use export::{InMemoryExporter, NoopExporter, SpanExporter};
pub use span::{FinishedSpan, SpanContext, SpanHandle, SpanStatus, TagValue};
