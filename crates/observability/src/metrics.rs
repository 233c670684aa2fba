//! Ingest metric export
//!
//! Publishes the per-input counters kept by `input_cursor` through the
//! `metrics` facade and aggregates them into run summaries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use input_cursor::{InputMetricsSnapshot, MetricsRegistry};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Publish one input's snapshot as gauges labelled by input id
pub fn record_input_snapshot(id: &str, snapshot: &InputMetricsSnapshot) {
    let id = id.to_string();
    gauge!("ingest_input_events", "input" => id.clone()).set(snapshot.events_pipeline_total as f64);
    gauge!("ingest_input_events_filtered", "input" => id.clone())
        .set(snapshot.events_pipeline_filtered_total as f64);
    gauge!("ingest_input_events_published", "input" => id.clone())
        .set(snapshot.events_pipeline_published_total as f64);
    gauge!("ingest_input_checkpoints_committed", "input" => id.clone())
        .set(snapshot.checkpoints_committed as f64);
    gauge!("ingest_input_checkpoint_updates_collapsed", "input" => id)
        .set(snapshot.checkpoint_updates_collapsed as f64);
}

/// Publish every standalone entry of `registry`; returns how many were exported
pub fn export_registry(registry: &MetricsRegistry) -> usize {
    let report = registry.report();
    for (id, snapshot) in &report {
        record_input_snapshot(id, snapshot);
    }
    gauge!("ingest_inputs_active").set(report.len() as f64);
    report.len()
}

/// Record how many resources a store holds
pub fn record_registry_size(input_type: &str, resources: usize) {
    gauge!("ingest_registry_resources", "type" => input_type.to_string()).set(resources as f64);
}

/// Record the end of an input run
pub fn record_run_finished(input_type: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "ingest_input_runs_total",
        "type" => input_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Periodically export `registry` until `cancel` fires
pub fn spawn_reporter(
    registry: Arc<MetricsRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let exported = export_registry(&registry);
                    trace!(exported, "input metrics exported");
                }
            }
        }
        export_registry(&registry);
        debug!("metrics reporter stopped");
    })
}

/// Aggregates registry reports in memory for summaries
#[derive(Debug, Clone, Default)]
pub struct IngestMetricsAggregator {
    /// Reports folded in so far
    pub samples: u64,

    /// Latest snapshot seen per input id
    pub latest: HashMap<String, InputMetricsSnapshot>,

    pub runs_succeeded: u64,
    pub runs_failed: u64,

    /// Published events per input per report
    pub published_stats: RunningStats,

    /// Staged updates superseded per committed checkpoint
    pub collapse_stats: RunningStats,
}

impl IngestMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one [`MetricsRegistry::report`]
    pub fn update(&mut self, report: &[(String, InputMetricsSnapshot)]) {
        self.samples += 1;
        for (id, snapshot) in report {
            self.published_stats
                .push(snapshot.events_pipeline_published_total as f64);
            if snapshot.checkpoints_committed > 0 {
                self.collapse_stats.push(
                    snapshot.checkpoint_updates_collapsed as f64
                        / snapshot.checkpoints_committed as f64,
                );
            }
            self.latest.insert(id.clone(), *snapshot);
        }
    }

    pub fn record_run(&mut self, success: bool) {
        if success {
            self.runs_succeeded += 1;
        } else {
            self.runs_failed += 1;
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let totals = self
            .latest
            .values()
            .fold(InputMetricsSnapshot::default(), |mut acc, s| {
                acc.events_pipeline_total += s.events_pipeline_total;
                acc.events_pipeline_filtered_total += s.events_pipeline_filtered_total;
                acc.events_pipeline_published_total += s.events_pipeline_published_total;
                acc.checkpoints_committed += s.checkpoints_committed;
                acc.checkpoint_updates_collapsed += s.checkpoint_updates_collapsed;
                acc
            });

        MetricsSummary {
            inputs: self.latest.len(),
            total_events: totals.events_pipeline_total,
            total_filtered: totals.events_pipeline_filtered_total,
            total_published: totals.events_pipeline_published_total,
            total_commits: totals.checkpoints_committed,
            filter_rate: if totals.events_pipeline_total > 0 {
                totals.events_pipeline_filtered_total as f64
                    / totals.events_pipeline_total as f64
                    * 100.0
            } else {
                0.0
            },
            runs_succeeded: self.runs_succeeded,
            runs_failed: self.runs_failed,
            published_per_input: StatsSummary::from(&self.published_stats),
            collapsed_per_commit: StatsSummary::from(&self.collapse_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub inputs: usize,
    pub total_events: u64,
    pub total_filtered: u64,
    pub total_published: u64,
    pub total_commits: u64,
    pub filter_rate: f64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub published_per_input: StatsSummary,
    pub collapsed_per_commit: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Ingest Metrics Summary ===")?;
        writeln!(f, "Inputs: {}", self.inputs)?;
        writeln!(f, "Events: {}", self.total_events)?;
        writeln!(
            f,
            "Filtered events: {} ({:.2}%)",
            self.total_filtered, self.filter_rate
        )?;
        writeln!(f, "Published events: {}", self.total_published)?;
        writeln!(f, "Checkpoints committed: {}", self.total_commits)?;
        writeln!(
            f,
            "Runs: {} ok, {} failed",
            self.runs_succeeded, self.runs_failed
        )?;
        writeln!(f, "Published per input: {}", self.published_per_input)?;
        writeln!(f, "Collapsed per commit: {}", self.collapsed_per_commit)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean and variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ClientListener;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_uses_latest_snapshot() {
        let registry = MetricsRegistry::new();
        let a = registry.register("logs::a", "mock");
        let b = registry.register("logs::b", "mock");
        let mut aggregator = IngestMetricsAggregator::new();

        a.new_event();
        a.published();
        aggregator.update(&registry.report());

        a.new_event();
        a.published();
        b.new_event();
        b.filtered();
        a.record_commit(1);
        aggregator.update(&registry.report());
        aggregator.record_run(true);
        aggregator.record_run(false);

        let summary = aggregator.summary();
        assert_eq!(aggregator.samples, 2);
        assert_eq!(summary.inputs, 2);
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.total_published, 2);
        assert_eq!(summary.total_filtered, 1);
        assert_eq!(summary.total_commits, 1);
        assert_eq!(summary.runs_failed, 1);
        assert_eq!(summary.collapsed_per_commit.count, 1);
        assert!((summary.collapsed_per_commit.mean - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = IngestMetricsAggregator::new();
        aggregator.record_run(true);
        let output = aggregator.summary().to_string();
        assert!(output.contains("Inputs: 0"));
        assert!(output.contains("Runs: 1 ok, 0 failed"));
        assert!(output.contains("Published per input: N/A"));
    }

    #[test]
    fn test_export_counts_standalone_only() {
        let registry = MetricsRegistry::new();
        registry.register_nested("logs", "mock");
        registry.register("logs::a", "mock");
        assert_eq!(export_registry(&registry), 1);
    }

    #[tokio::test]
    async fn test_reporter_stops_on_cancel() {
        let registry = Arc::new(MetricsRegistry::new());
        let cancel = CancellationToken::new();
        let handle = spawn_reporter(registry, Duration::from_millis(5), cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
