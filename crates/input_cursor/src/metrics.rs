//! Per-input metrics and the shared registry

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::ClientListener;
use dashmap::DashMap;
use metrics::counter;

/// How a registered input is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Reported as a top-level input
    Standalone,
    /// Parent of per-source entries; aggregating reporters skip it
    Nested,
}

/// Pipeline and checkpoint counters for one input or source
#[derive(Debug)]
pub struct InputMetrics {
    id: String,
    input_type: String,

    /// Events handed to the pipeline client
    events_pipeline_total: AtomicU64,

    /// Events dropped by the client's filter
    events_pipeline_filtered_total: AtomicU64,

    /// Events accepted into the pipeline
    events_pipeline_published_total: AtomicU64,

    /// Checkpoints persisted after acknowledgment
    checkpoints_committed: AtomicU64,

    /// Staged updates superseded by a later one in the same ack batch
    checkpoint_updates_collapsed: AtomicU64,
}

impl InputMetrics {
    pub fn new(id: impl Into<String>, input_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input_type: input_type.into(),
            events_pipeline_total: AtomicU64::new(0),
            events_pipeline_filtered_total: AtomicU64::new(0),
            events_pipeline_published_total: AtomicU64::new(0),
            checkpoints_committed: AtomicU64::new(0),
            checkpoint_updates_collapsed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    /// Record a committed checkpoint that superseded `collapsed` staged updates
    pub fn record_commit(&self, collapsed: u64) {
        self.checkpoints_committed.fetch_add(1, Ordering::Relaxed);
        self.checkpoint_updates_collapsed
            .fetch_add(collapsed, Ordering::Relaxed);
        counter!("ingest_checkpoints_committed_total", "input" => self.id.clone()).increment(1);
    }

    pub fn snapshot(&self) -> InputMetricsSnapshot {
        InputMetricsSnapshot {
            events_pipeline_total: self.events_pipeline_total.load(Ordering::Relaxed),
            events_pipeline_filtered_total: self
                .events_pipeline_filtered_total
                .load(Ordering::Relaxed),
            events_pipeline_published_total: self
                .events_pipeline_published_total
                .load(Ordering::Relaxed),
            checkpoints_committed: self.checkpoints_committed.load(Ordering::Relaxed),
            checkpoint_updates_collapsed: self.checkpoint_updates_collapsed.load(Ordering::Relaxed),
        }
    }
}

impl ClientListener for InputMetrics {
    fn new_event(&self) {
        self.events_pipeline_total.fetch_add(1, Ordering::Relaxed);
        counter!("ingest_events_pipeline_total", "input" => self.id.clone()).increment(1);
    }

    fn filtered(&self) {
        self.events_pipeline_filtered_total
            .fetch_add(1, Ordering::Relaxed);
        counter!("ingest_events_pipeline_filtered_total", "input" => self.id.clone())
            .increment(1);
    }

    fn published(&self) {
        self.events_pipeline_published_total
            .fetch_add(1, Ordering::Relaxed);
        counter!("ingest_events_pipeline_published_total", "input" => self.id.clone())
            .increment(1);
    }
}

/// Point-in-time copy of [`InputMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputMetricsSnapshot {
    pub events_pipeline_total: u64,
    pub events_pipeline_filtered_total: u64,
    pub events_pipeline_published_total: u64,
    pub checkpoints_committed: u64,
    pub checkpoint_updates_collapsed: u64,
}

#[derive(Debug)]
struct Registered {
    kind: InputKind,
    metrics: Arc<InputMetrics>,
}

/// Registry of live inputs' metrics, keyed by input id
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    inputs: DashMap<String, Registered>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a standalone entry, replacing any previous one with that id
    pub fn register(&self, id: &str, input_type: &str) -> Arc<InputMetrics> {
        self.insert(id, input_type, InputKind::Standalone)
    }

    /// Register an entry whose children are reported instead of itself
    pub fn register_nested(&self, id: &str, input_type: &str) -> Arc<InputMetrics> {
        self.insert(id, input_type, InputKind::Nested)
    }

    fn insert(&self, id: &str, input_type: &str, kind: InputKind) -> Arc<InputMetrics> {
        let metrics = Arc::new(InputMetrics::new(id, input_type));
        self.inputs.insert(
            id.to_string(),
            Registered {
                kind,
                metrics: Arc::clone(&metrics),
            },
        );
        metrics
    }

    pub fn unregister(&self, id: &str) {
        self.inputs.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Arc<InputMetrics>> {
        self.inputs.get(id).map(|r| Arc::clone(&r.metrics))
    }

    pub fn kind(&self, id: &str) -> Option<InputKind> {
        self.inputs.get(id).map(|r| r.kind)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Snapshots of every standalone entry, sorted by id
    pub fn report(&self) -> Vec<(String, InputMetricsSnapshot)> {
        let mut out: Vec<_> = self
            .inputs
            .iter()
            .filter(|r| r.kind == InputKind::Standalone)
            .map(|r| (r.key().clone(), r.metrics.snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_counts() {
        let metrics = InputMetrics::new("logs::a", "mock");
        metrics.new_event();
        metrics.new_event();
        metrics.filtered();
        metrics.published();
        metrics.record_commit(2);

        let snap = metrics.snapshot();
        assert_eq!(snap.events_pipeline_total, 2);
        assert_eq!(snap.events_pipeline_filtered_total, 1);
        assert_eq!(snap.events_pipeline_published_total, 1);
        assert_eq!(snap.checkpoints_committed, 1);
        assert_eq!(snap.checkpoint_updates_collapsed, 2);
    }

    #[test]
    fn test_report_skips_nested_parent() {
        let registry = MetricsRegistry::new();
        registry.register_nested("logs", "mock");
        registry.register("logs::b", "mock").new_event();
        registry.register("logs::a", "mock");

        let report = registry.report();
        let ids: Vec<_> = report.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["logs::a", "logs::b"]);
        assert_eq!(report[1].1.events_pipeline_total, 1);
        assert_eq!(registry.kind("logs"), Some(InputKind::Nested));

        registry.unregister("logs::a");
        assert!(registry.get("logs::a").is_none());
        assert_eq!(registry.len(), 2);
    }
}
