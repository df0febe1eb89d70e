//! Prometheus-backed metrics registry for the acquisition pipeline.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the orchestrator, workers, and the RSS
//!   scheduler report into.

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    pipeline_stages_total: IntCounterVec,
    pipeline_runs_total: IntCounterVec,
    download_transitions_total: IntCounterVec,
    feed_checks_total: IntCounterVec,
    feed_items_total: IntCounterVec,
    active_runs: IntGauge,
    queue_depth: IntGauge,
}

/// Snapshot of selected gauges for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Pipeline runs currently held by orchestrator tasks.
    pub active_runs: i64,
    /// Entries currently pending in the acquisition queue.
    pub queue_depth: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pipeline_stages_total = IntCounterVec::new(
            Opts::new(
                "pipeline_stages_total",
                "Pipeline stage outcomes by stage and status",
            ),
            &["stage", "status"],
        )?;
        let pipeline_runs_total = IntCounterVec::new(
            Opts::new(
                "pipeline_runs_total",
                "Pipeline runs settled by aggregate status",
            ),
            &["status"],
        )?;
        let download_transitions_total = IntCounterVec::new(
            Opts::new(
                "download_transitions_total",
                "Download state transitions by target state",
            ),
            &["to_state"],
        )?;
        let feed_checks_total = IntCounterVec::new(
            Opts::new("feed_checks_total", "RSS feed checks by outcome"),
            &["outcome"],
        )?;
        let feed_items_total = IntCounterVec::new(
            Opts::new("feed_items_total", "Ingested feed items by decision"),
            &["decision"],
        )?;
        let active_runs = IntGauge::with_opts(Opts::new(
            "active_runs",
            "Pipeline runs currently held by orchestrator tasks",
        ))?;
        let queue_depth =
            IntGauge::with_opts(Opts::new("queue_depth", "Pending acquisition queue entries"))?;

        registry.register(Box::new(pipeline_stages_total.clone()))?;
        registry.register(Box::new(pipeline_runs_total.clone()))?;
        registry.register(Box::new(download_transitions_total.clone()))?;
        registry.register(Box::new(feed_checks_total.clone()))?;
        registry.register(Box::new(feed_items_total.clone()))?;
        registry.register(Box::new(active_runs.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                pipeline_stages_total,
                pipeline_runs_total,
                download_transitions_total,
                feed_checks_total,
                feed_items_total,
                active_runs,
                queue_depth,
            }),
        })
    }

    /// Increment the stage outcome counter.
    pub fn inc_stage(&self, stage: &str, status: &str) {
        self.inner
            .pipeline_stages_total
            .with_label_values(&[stage, status])
            .inc();
    }

    /// Increment the settled-run counter for an aggregate status.
    pub fn inc_run(&self, status: &str) {
        self.inner
            .pipeline_runs_total
            .with_label_values(&[status])
            .inc();
    }

    /// Increment the download transition counter.
    pub fn inc_transition(&self, to_state: &str) {
        self.inner
            .download_transitions_total
            .with_label_values(&[to_state])
            .inc();
    }

    /// Increment the feed check counter for an outcome label.
    pub fn inc_feed_check(&self, outcome: &str) {
        self.inner
            .feed_checks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the ingested item counter for a decision label.
    pub fn inc_feed_item(&self, decision: &str) {
        self.inner
            .feed_items_total
            .with_label_values(&[decision])
            .inc();
    }

    /// Set the active orchestrator task gauge.
    pub fn set_active_runs(&self, count: i64) {
        self.inner.active_runs.set(count);
    }

    /// Set the queue depth gauge.
    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.set(depth);
    }

    /// Render the metrics registry using the Prometheus text exposition
    /// format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_runs: self.inner.active_runs.get(),
            queue_depth: self.inner.queue_depth.get(),
        }
    }
}
