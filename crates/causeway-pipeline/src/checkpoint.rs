//! Checkpoint persistence.
//!
//! A checkpoint carries the aggregate counters and per-worker matrices
//! needed to resume processing, fingerprinted against the rule set that
//! was active when it was taken. Serialization is bincode, compressed
//! with zstd. Periodic checkpoints go through a bounded background
//! writer so the pipeline never blocks on disk: a lost checkpoint is
//! cheaper than a stalled worker.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use causeway_core::{ActorMatrix, RuleSet};

/// Checkpoint format version (increment on breaking changes).
pub const CHECKPOINT_VERSION: u32 = 1;

/// Bounded queue depth for the background writer.
pub const DEFAULT_QUEUE_DEPTH: usize = 2;

/// zstd level balancing speed and size.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Blake3 fingerprint of a rule set's serialized form, embedded in the
/// header so a restore against a different rule set fails loudly.
pub fn rules_fingerprint(rules: &RuleSet) -> Result<[u8; 32], CheckpointError> {
    let bytes =
        bincode::serialize(rules).map_err(|e| CheckpointError::Serialization(e.to_string()))?;
    Ok(*blake3::hash(&bytes).as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointHeader {
    pub version: u32,
    /// Blake3 of the rule set active at checkpoint time.
    pub rules_fingerprint: [u8; 32],
    /// Rule-swap generation at checkpoint time.
    pub rule_generation: u64,
    pub worker_count: usize,
}

/// One worker's resumable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_id: usize,
    pub matrix: ActorMatrix,
    pub ticks: u64,
}

/// Aggregate counters carried across restarts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub processed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    pub header: CheckpointHeader,
    pub workers: Vec<WorkerSnapshot>,
    pub counters: CounterSnapshot,
}

/// Serialize, compress, and write a checkpoint.
pub fn write_checkpoint(
    path: &Path,
    checkpoint: &PipelineCheckpoint,
    compression_level: i32,
) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Io(e.to_string()))?;
    }

    let serialized = bincode::serialize(checkpoint)
        .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
    let compressed = zstd::encode_all(&serialized[..], compression_level)
        .map_err(|e| CheckpointError::Compression(e.to_string()))?;

    debug!(
        bytes = serialized.len(),
        compressed = compressed.len(),
        "checkpoint encoded"
    );

    std::fs::write(path, compressed).map_err(|e| CheckpointError::Io(e.to_string()))?;
    Ok(())
}

/// Read, decompress, and deserialize a checkpoint.
pub fn load_checkpoint(path: &Path) -> Result<PipelineCheckpoint, CheckpointError> {
    let compressed = std::fs::read(path).map_err(|e| CheckpointError::Io(e.to_string()))?;
    let serialized = zstd::decode_all(&compressed[..])
        .map_err(|e| CheckpointError::Decompression(e.to_string()))?;
    let checkpoint: PipelineCheckpoint = bincode::deserialize(&serialized)
        .map_err(|e| CheckpointError::Deserialization(e.to_string()))?;

    info!(
        path = %path.display(),
        workers = checkpoint.header.worker_count,
        generation = checkpoint.header.rule_generation,
        "checkpoint loaded"
    );
    Ok(checkpoint)
}

struct CheckpointJob {
    path: PathBuf,
    checkpoint: PipelineCheckpoint,
}

/// Non-blocking checkpoint writer with a bounded queue.
pub struct CheckpointWriter {
    tx: Option<SyncSender<CheckpointJob>>,
    handle: Option<JoinHandle<()>>,
}

impl CheckpointWriter {
    pub fn new(queue_depth: usize) -> Self {
        let (tx, rx) = sync_channel(queue_depth);
        Self {
            tx: Some(tx),
            handle: Some(spawn_writer_thread(rx)),
        }
    }

    /// Queue a checkpoint write. Returns an error and drops the job when
    /// the queue is full; the pipeline continues either way.
    pub fn request(
        &self,
        path: PathBuf,
        checkpoint: PipelineCheckpoint,
    ) -> Result<(), CheckpointError> {
        let tx = self.tx.as_ref().ok_or(CheckpointError::WriterDied)?;
        match tx.try_send(CheckpointJob { path, checkpoint }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("checkpoint queue full, request dropped");
                Err(CheckpointError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("checkpoint writer thread died");
                Err(CheckpointError::WriterDied)
            }
        }
    }
}

impl Default for CheckpointWriter {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

impl Drop for CheckpointWriter {
    fn drop(&mut self) {
        // Dropping the sender signals shutdown; join drains pending jobs.
        self.tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("checkpoint writer thread panicked");
        }
    }
}

fn spawn_writer_thread(rx: Receiver<CheckpointJob>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("causeway-ckpt-writer".to_string())
        .spawn(move || {
            while let Ok(job) = rx.recv() {
                match write_checkpoint(&job.path, &job.checkpoint, DEFAULT_COMPRESSION_LEVEL) {
                    Ok(()) => info!(path = %job.path.display(), "checkpoint written"),
                    Err(e) => error!(path = %job.path.display(), error = %e, "checkpoint write failed"),
                }
            }
            debug!("checkpoint writer shutting down");
        })
        .expect("failed to spawn checkpoint writer thread")
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint queue is full (dropped to avoid blocking the pipeline)")]
    QueueFull,

    #[error("checkpoint writer thread has died")]
    WriterDied,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("decompression error: {0}")]
    Decompression(String),
}
