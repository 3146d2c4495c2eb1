//! Latency tracking and aggregated pipeline metrics.

use std::sync::Arc;
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

/// Shared per-tick latency histogram.
///
/// Workers record through `try_lock` so the hot path never waits on a
/// reader taking a snapshot; a measurement lost to contention is cheaper
/// than a stalled tick.
#[derive(Clone)]
pub struct LatencyTracker {
    histogram: Arc<Mutex<Histogram<u64>>>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        // 3 significant digits is plenty for scaling decisions.
        let histogram = Histogram::<u64>::new(3).expect("histogram sigfigs in 1..=5");
        Self {
            histogram: Arc::new(Mutex::new(histogram)),
        }
    }

    /// Record one tick's processing time.
    pub fn record(&self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        if let Some(mut hist) = self.histogram.try_lock() {
            let _ = hist.record(micros);
        }
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let hist = self.histogram.lock();
        LatencySnapshot {
            count: hist.len(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_quantile(0.50),
            p99_us: hist.value_at_quantile(0.99),
            max_us: hist.max(),
        }
    }

    /// Mean processing time, as sampled by the scaling controller.
    pub fn mean(&self) -> Duration {
        let mean_us = self.histogram.lock().mean();
        Duration::from_micros(mean_us as u64)
    }

    pub fn reset(&self) {
        self.histogram.lock().reset();
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time latency statistics, microseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Aggregated view across the pipeline, returned by `get_metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    /// Live workers.
    pub workers: usize,
    /// Events accepted by `submit`/`submit_batch`.
    pub submitted: u64,
    /// Events refused because a ring was full.
    pub rejected: u64,
    /// Ticks completed across all workers, including retired ones.
    pub processed: u64,
    /// Events whose signal could not be injected.
    pub inject_failures: u64,
    /// Spans that failed causal validation.
    pub violations: u64,
    /// Genesis resets applied by workers.
    pub resets: u64,
    /// Mean fill ratio across live rings.
    pub queue_depth_ratio: f64,
    /// Current rule-swap generation.
    pub rule_generation: u64,
    pub latency: LatencySnapshot,
}
