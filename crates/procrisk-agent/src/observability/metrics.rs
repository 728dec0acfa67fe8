//! Internal metrics collection for the risk monitor
//!
//! Counters, gauges and latency histograms owned by one monitor instance.
//! Nothing is exported over the network; the daemon logs a snapshot when
//! it exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use crate::registry::CycleReport;

/// Counter metric - monotonically increasing value
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
    name: String,
    description: String,
}

impl Counter {
    /// Create a new counter
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            value: AtomicU64::new(0),
            name: name.into(),
            description: description.into(),
        }
    }

    /// Increment the counter by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the counter by a specific amount
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Gauge metric - value that can go up and down
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
    name: String,
}

impl Gauge {
    /// Create a new gauge
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            value: AtomicU64::new(0),
            name: name.into(),
        }
    }

    /// Set the gauge value
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Histogram for tracking distributions of values
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    // Sum in thousandths of the observed unit
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with the given upper bounds
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = (0..=buckets.len()).map(|_| AtomicU64::new(0)).collect();

        Self {
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Histogram with default latency buckets (in milliseconds)
    pub fn with_latency_buckets() -> Self {
        Self::new(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
        ])
    }

    /// Observe a value
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add((value * 1000.0) as u64, Ordering::Relaxed);

        let slot = self
            .buckets
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.buckets.len());
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
    }

    /// Observe a duration, in milliseconds
    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64() * 1000.0);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum in the observed unit
    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn average(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() / count as f64
        }
    }

    /// Per-bucket counts, with the overflow slot last
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

/// Registry for named metrics
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Arc<Counter>>>,
    gauges: RwLock<HashMap<String, Arc<Gauge>>>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or get a counter
    pub fn counter(&self, name: &str, description: &str) -> Arc<Counter> {
        if let Some(counter) = self.counters.read().get(name) {
            return counter.clone();
        }

        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new(name, description)))
            .clone()
    }

    /// Register or get a gauge
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        if let Some(gauge) = self.gauges.read().get(name) {
            return gauge.clone();
        }

        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Gauge::new(name)))
            .clone()
    }

    /// Register or get a latency histogram
    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        if let Some(histogram) = self.histograms.read().get(name) {
            return histogram.clone();
        }

        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::with_latency_buckets()))
            .clone()
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.get()))
                .collect(),
            gauges: self
                .gauges
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.get()))
                .collect(),
            histograms: self
                .histograms
                .read()
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        HistogramSnapshot {
                            count: v.count(),
                            sum: v.sum(),
                            average: v.average(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Snapshot of histogram data
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub average: f64,
}

/// Snapshot of all metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, u64>,
    pub histograms: HashMap<String, HistogramSnapshot>,
}

/// Pre-registered metrics for one monitor
#[derive(Debug)]
pub struct MonitorMetrics {
    registry: MetricsRegistry,
    cycles: Arc<Counter>,
    failed_cycles: Arc<Counter>,
    created: Arc<Counter>,
    removed: Arc<Counter>,
    publish_failures: Arc<Counter>,
    tracked: Arc<Gauge>,
    cycle_latency: Arc<Histogram>,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        let registry = MetricsRegistry::new();

        Self {
            cycles: registry.counter("procrisk_cycles_total", "Completed sampling cycles"),
            failed_cycles: registry.counter(
                "procrisk_cycles_failed_total",
                "Cycles aborted because the process table could not be read",
            ),
            created: registry.counter("procrisk_entities_created_total", "Entities created"),
            removed: registry.counter("procrisk_entities_removed_total", "Entities removed"),
            publish_failures: registry.counter(
                "procrisk_publish_failures_total",
                "Endpoint creations that failed",
            ),
            tracked: registry.gauge("procrisk_tracked_processes"),
            cycle_latency: registry.histogram("procrisk_cycle_latency_ms"),
            registry,
        }
    }

    /// Record a completed cycle
    pub fn record_cycle(&self, report: &CycleReport, elapsed: Duration) {
        self.cycles.inc();
        self.created.inc_by(report.created as u64);
        self.removed.inc_by(report.removed as u64);
        self.publish_failures.inc_by(report.publish_failures as u64);
        self.tracked.set(report.tracked as u64);
        self.cycle_latency.observe_duration(elapsed);
    }

    pub fn record_failure(&self) {
        self.failed_cycles.inc();
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.get()
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles.get()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
