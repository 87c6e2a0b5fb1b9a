// metrics/sink.rs - Metrics Recording Seam

use ::metrics::{counter, gauge, histogram};
use parking_lot::Mutex;

/// Label set attached to one observation. Names are static, values are
/// dynamic (agent names, model ids, tool names).
pub type Labels = [(&'static str, String)];

/// Receiver for metric observations.
///
/// The aggregator decides what to record; this trait decides where it goes.
/// The production implementation forwards to the globally installed
/// `metrics` recorder, and tests swap in [`RecordingSink`].
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str, labels: &Labels, value: u64);
    fn adjust_gauge(&self, name: &'static str, labels: &Labels, delta: f64);
    fn record_timer(&self, name: &'static str, labels: &Labels, seconds: f64);
    fn record_distribution(&self, name: &'static str, labels: &Labels, value: f64);
}

/// Sink backed by the process-global `metrics` recorder.
#[derive(Debug, Default)]
pub struct RuntimeSink;

impl MetricsSink for RuntimeSink {
    fn increment_counter(&self, name: &'static str, labels: &Labels, value: u64) {
        counter!(name, labels).increment(value);
    }

    fn adjust_gauge(&self, name: &'static str, labels: &Labels, delta: f64) {
        if delta >= 0.0 {
            gauge!(name, labels).increment(delta);
        } else {
            gauge!(name, labels).decrement(-delta);
        }
    }

    fn record_timer(&self, name: &'static str, labels: &Labels, seconds: f64) {
        histogram!(name, labels).record(seconds);
    }

    fn record_distribution(&self, name: &'static str, labels: &Labels, value: f64) {
        histogram!(name, labels).record(value);
    }
}

/// What a recorded observation was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Timer,
    Distribution,
}

/// One captured observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub kind: MetricKind,
    pub name: &'static str,
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
}

/// Sink that captures observations in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<MetricRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().clone()
    }

    /// Sum of all counter increments recorded under a name, across labels.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.records
            .lock()
            .iter()
            .filter(|r| r.kind == MetricKind::Counter && r.name == name)
            .map(|r| r.value as u64)
            .sum()
    }

    /// Net gauge value for a name, across labels.
    pub fn gauge_value(&self, name: &str) -> f64 {
        self.records
            .lock()
            .iter()
            .filter(|r| r.kind == MetricKind::Gauge && r.name == name)
            .map(|r| r.value)
            .sum()
    }

    /// Whether any observation carries this name and label pair.
    pub fn has_series(&self, name: &str, label: (&str, &str)) -> bool {
        self.records.lock().iter().any(|r| {
            r.name == name
                && r.labels
                    .iter()
                    .any(|(k, v)| *k == label.0 && v == label.1)
        })
    }

    fn push(&self, kind: MetricKind, name: &'static str, labels: &Labels, value: f64) {
        self.records.lock().push(MetricRecord {
            kind,
            name,
            labels: labels.to_vec(),
            value,
        });
    }
}

impl MetricsSink for RecordingSink {
    fn increment_counter(&self, name: &'static str, labels: &Labels, value: u64) {
        self.push(MetricKind::Counter, name, labels, value as f64);
    }

    fn adjust_gauge(&self, name: &'static str, labels: &Labels, delta: f64) {
        self.push(MetricKind::Gauge, name, labels, delta);
    }

    fn record_timer(&self, name: &'static str, labels: &Labels, seconds: f64) {
        self.push(MetricKind::Timer, name, labels, seconds);
    }

    fn record_distribution(&self, name: &'static str, labels: &Labels, value: f64) {
        self.push(MetricKind::Distribution, name, labels, value);
    }
}
