//! Pipeline errors.
//!
//! Backpressure is deliberately absent here: a full ring is a signaled
//! condition (`submit` returns `false`), not an error.

use causeway_core::DeployError;
use thiserror::Error;

use crate::checkpoint::CheckpointError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A rule references an actor index outside the configured matrix
    /// capacity. Caught when rules are deployed or reloaded.
    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("checkpoint was written for a different rule set (fingerprint {found}, active {expected})")]
    FingerprintMismatch { expected: String, found: String },

    #[error("checkpoint format version {found} is not supported (current {current})")]
    VersionMismatch { found: u32, current: u32 },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}
