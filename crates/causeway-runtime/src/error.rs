//! Runtime errors.

use causeway_core::DeployError;
use thiserror::Error;

use crate::fault::CausalViolation;

/// Engine-level failures. These are programmer errors caught at deploy
/// time; a correctly deployed system never sees them at tick time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Precondition(#[from] DeployError),
}

/// Failures surfaced by `span_end`.
#[derive(Debug, Clone, Error)]
pub enum SpanError {
    /// One or more causal checks failed. The span is still recorded.
    #[error(transparent)]
    Violation(#[from] CausalViolation),

    /// The span id does not name an open span (already finalized, or its
    /// ring slot was recycled). Collector misuse, not a tick fault.
    #[error("span {0} is not open")]
    NotOpen(u64),
}
