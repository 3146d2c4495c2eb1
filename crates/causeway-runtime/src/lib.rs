//! Causeway runtime.
//!
//! This crate executes one causal tick at a time and audits every tick it
//! executes:
//!
//! - [`engine`] - the tick collapse engine, an eight-stage pipeline in
//!   which exactly one stage mutates state
//! - [`telemetry`] - the span collector: cycle budgets, causal hash
//!   deltas, entropy drift, bounded span ring with an explicit
//!   overwrite-oldest contract
//! - [`fault`] - violation classification and the genesis-reset
//!   escalation seam
//! - [`error`] - error types for runtime failures
//!
//! Collector handles are passed explicitly; there is no process-wide
//! collector state, so independent pipelines can coexist in one process.

pub mod engine;
pub mod error;
pub mod fault;
pub mod telemetry;

pub use engine::{Actuator, Stage, TickEngine, TickReceipt};
pub use error::{EngineError, SpanError};
pub use fault::{CausalViolation, FaultHandler, ResetSeverity};
pub use telemetry::{Collector, CollectorConfig, CollectorMetrics, Span, SpanId, SpanSink};
