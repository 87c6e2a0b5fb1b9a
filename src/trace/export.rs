// trace/export.rs - Span Exporter Seam

use parking_lot::Mutex;

use super::span::FinishedSpan;

/// Receiver for ended spans.
///
/// The transport and encoding of spans to a backend live behind this trait;
/// the engine only ever hands over finished, immutable spans. Implementations
/// must be cheap and non-blocking: `export` is called on the runtime's
/// event-delivery threads.
pub trait SpanExporter: Send + Sync {
    fn export(&self, span: FinishedSpan);
}

/// Exporter that discards everything.
#[derive(Debug, Default)]
pub struct NoopExporter;

impl SpanExporter for NoopExporter {
    fn export(&self, _span: FinishedSpan) {}
}

/// Exporter that buffers finished spans in memory, for tests and local
/// inspection.
#[derive(Debug, Default)]
pub struct InMemoryExporter {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all finished spans, in completion order.
    pub fn finished(&self) -> Vec<FinishedSpan> {
        self.spans.lock().clone()
    }

    /// First finished span with the given name.
    pub fn find(&self, name: &str) -> Option<FinishedSpan> {
        self.spans.lock().iter().find(|s| s.name == name).cloned()
    }

    /// All finished spans with the given name.
    pub fn find_all(&self, name: &str) -> Vec<FinishedSpan> {
        self.spans
            .lock()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }

    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&self, span: FinishedSpan) {
        self.spans.lock().push(span);
    }
}
