//! Causal violation classification and fault escalation.
//!
//! The collector records every violation. When fault recovery is enabled
//! it also escalates through the [`FaultHandler`] seam, asking for a
//! genesis reset whose severity depends on how far the violation overshot
//! its threshold.

use thiserror::Error;

/// One or more per-tick checks failed.
///
/// Carries the measured values alongside the thresholds they were judged
/// against, so severity can be classified downstream without re-reading
/// collector configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "causal violation in span {span}: bounds={within_causal_bounds} entropy={entropy_valid} budget={tick_budget_met} \
     (hash_delta={hash_delta}, entropy_delta={entropy_delta}, elapsed={elapsed_cycles})"
)]
pub struct CausalViolation {
    pub span: u64,
    pub fiber_ref: u64,

    pub hash_delta: u64,
    pub entropy_delta: u64,
    pub elapsed_cycles: u64,

    pub within_causal_bounds: bool,
    pub entropy_valid: bool,
    pub tick_budget_met: bool,

    pub hash_delta_threshold: u64,
    pub entropy_threshold: u64,
    pub max_cycles: u64,
}

/// How much of the running state a genesis reset may keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSeverity {
    /// Reinitialize the execution machinery but keep actor state.
    Preserving,
    /// Discard actor state and start from zeroed matrices.
    Destructive,
}

impl ResetSeverity {
    /// Classify a violation.
    ///
    /// Overshooting a threshold by more than 2x - hash delta beyond twice
    /// its threshold, or elapsed cycles beyond twice the budget - is
    /// critical and forfeits state preservation.
    pub fn classify(violation: &CausalViolation) -> Self {
        let hash_critical = !violation.within_causal_bounds
            && violation.hash_delta > violation.hash_delta_threshold.saturating_mul(2);
        let budget_critical = !violation.tick_budget_met
            && violation.elapsed_cycles > violation.max_cycles.saturating_mul(2);

        if hash_critical || budget_critical {
            ResetSeverity::Destructive
        } else {
            ResetSeverity::Preserving
        }
    }
}

/// Escalation seam invoked by the collector when fault recovery is on.
///
/// Implementations reinitialize whatever owns the violating engine - the
/// stream pipeline flags the worker, which resets itself between ticks.
pub trait FaultHandler: Send + Sync {
    fn genesis_reset(&self, severity: ResetSeverity, violation: &CausalViolation);
}
