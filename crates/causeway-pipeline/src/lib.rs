//! Causeway stream pipeline.
//!
//! A concurrency wrapper around the engine: a bounded pool of OS worker
//! threads, each owning a private actor matrix, tick engine, and
//! telemetry collector, fed by lock-free event rings. The pipeline adds
//! what a single engine does not have:
//!
//! - [`ring`] - bounded MPSC event rings; a full ring is backpressure,
//!   never a blocking wait and never a silent drop
//! - [`reload`] - atomic rule hot-swap; a tick sees entirely the old or
//!   entirely the new rule set
//! - [`scaler`] - watermark auto-scaling with a cooldown window
//! - [`checkpoint`] - bincode + zstd snapshots, fingerprinted against
//!   the active rule set, written off-thread
//! - [`pipeline`] - the control surface: `create`, `start`, `stop`,
//!   `submit`, `submit_batch`, `reload_rules`, `get_metrics`,
//!   `checkpoint`, `restore`
//!
//! Cross-thread coordination is limited to ring push/pop, the rule-swap
//! lock (held only for the pointer replacement), and atomic counters
//! read by the controller. Matrices are never shared between workers.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod reload;
pub mod ring;
pub mod scaler;
mod worker;

pub use checkpoint::{CHECKPOINT_VERSION, PipelineCheckpoint};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use metrics::{LatencySnapshot, LatencyTracker, PipelineMetrics};
pub use pipeline::Pipeline;
pub use reload::RuleSwap;
pub use ring::{EventRing, SignalEvent};
