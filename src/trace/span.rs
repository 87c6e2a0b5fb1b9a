// trace/span.rs - Span Handle and Finished Span

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identity of a span within a trace.
///
/// Children copy the parent's `trace_id`; a root span mints a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
}

/// Completion status of a span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

/// A span tag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        TagValue::Int(v as i64)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

/// One open unit-of-work record.
///
/// A handle is owned exclusively by the correlation registry while open;
/// `finish` consumes it into an immutable [`FinishedSpan`], after which no
/// further mutation is possible.
#[derive(Debug)]
pub struct SpanHandle {
    context: SpanContext,
    parent_span_id: Option<Uuid>,
    name: String,
    status: SpanStatus,
    tags: HashMap<String, TagValue>,
    error: Option<String>,
    started_at: DateTime<Utc>,
}

impl SpanHandle {
    /// Open a span. With a parent, the span joins the parent's trace;
    /// without one it becomes a new trace root.
    pub fn start(name: impl Into<String>, parent: Option<SpanContext>) -> Self {
        let context = match parent {
            Some(p) => SpanContext {
                trace_id: p.trace_id,
                span_id: Uuid::new_v4(),
            },
            None => SpanContext {
                trace_id: Uuid::new_v4(),
                span_id: Uuid::new_v4(),
            },
        };

        Self {
            context,
            parent_span_id: parent.map(|p| p.span_id),
            name: name.into(),
            status: SpanStatus::Unset,
            tags: HashMap::new(),
            error: None,
            started_at: Utc::now(),
        }
    }

    /// Identity of this span, copyable for use as a parent reference.
    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SpanStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Add or overwrite a tag.
    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn set_status(&mut self, status: SpanStatus) {
        self.status = status;
    }

    /// Mark the span failed and record the error detail.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = SpanStatus::Error;
        self.error = Some(message.into());
    }

    /// End the span exactly once.
    pub fn finish(self) -> FinishedSpan {
        let ended_at = Utc::now();
        let duration_ms = (ended_at - self.started_at).num_milliseconds().max(0) as u64;

        FinishedSpan {
            trace_id: self.context.trace_id,
            span_id: self.context.span_id,
            parent_span_id: self.parent_span_id,
            name: self.name,
            status: self.status,
            tags: self.tags,
            error: self.error,
            started_at: self.started_at,
            ended_at,
            duration_ms,
        }
    }
}

/// An ended span, ready for export. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedSpan {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<Uuid>,
    pub name: String,
    pub status: SpanStatus,
    pub tags: HashMap<String, TagValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl FinishedSpan {
    /// String tag lookup, for assertions and export filters.
    pub fn tag_str(&self, key: &str) -> Option<&str> {
        match self.tags.get(key) {
            Some(TagValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer tag lookup.
    pub fn tag_int(&self, key: &str) -> Option<i64> {
        match self.tags.get(key) {
            Some(TagValue::Int(i)) => Some(*i),
            _ => None,
        }
    }
}
