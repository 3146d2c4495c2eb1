//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use causeway_core::SignalMap;
use causeway_runtime::CollectorConfig;

/// Everything the pipeline needs to run. Plain data; construct with
/// `Default` and override fields.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Workers spawned by `start`.
    pub initial_workers: usize,
    /// Auto-scaler floor.
    pub min_workers: usize,
    /// Auto-scaler ceiling.
    pub max_workers: usize,

    /// Capacity of each worker's event ring.
    pub ring_capacity: usize,
    /// Actor capacity of each worker's matrix.
    pub matrix_capacity: usize,
    /// Named-event bindings applied before each tick.
    pub signals: SignalMap,
    /// Per-worker telemetry thresholds.
    pub collector: CollectorConfig,

    /// Queue-depth ratio above which the scaler adds a worker.
    pub scale_high_water: f64,
    /// Queue-depth ratio below which the scaler retires a worker.
    pub scale_low_water: f64,
    /// Mean processing latency above which the scaler adds a worker.
    pub latency_target: Duration,
    /// Cadence of the scaling controller.
    pub scale_interval: Duration,
    /// Minimum spacing between scaling decisions.
    pub scale_cooldown: Duration,

    /// Periodic checkpoint cadence. `None` disables periodic
    /// checkpoints; `checkpoint()` stays available either way.
    pub checkpoint_interval: Option<Duration>,
    /// Destination for periodic checkpoints.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_workers: 2,
            min_workers: 1,
            max_workers: 8,
            ring_capacity: 1024,
            matrix_capacity: 64,
            signals: SignalMap::new(),
            collector: CollectorConfig::default(),
            scale_high_water: 0.75,
            scale_low_water: 0.25,
            latency_target: Duration::from_millis(1),
            scale_interval: Duration::from_millis(100),
            scale_cooldown: Duration::from_millis(500),
            checkpoint_interval: None,
            checkpoint_path: None,
        }
    }
}
