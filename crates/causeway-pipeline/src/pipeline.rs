//! Pipeline control surface.
//!
//! Owns the worker pool, the rule swap, the scaling controller, and the
//! checkpoint writer. Submission partitions events across workers by a
//! round-robin cursor; order is guaranteed per worker, not globally.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use causeway_core::{RuleSet, SignalMap};

use crate::checkpoint::{
    CHECKPOINT_VERSION, CheckpointHeader, CheckpointWriter, CounterSnapshot, PipelineCheckpoint,
    WorkerSnapshot, load_checkpoint, rules_fingerprint, write_checkpoint,
    DEFAULT_COMPRESSION_LEVEL,
};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::metrics::{LatencyTracker, PipelineMetrics};
use crate::reload::RuleSwap;
use crate::ring::SignalEvent;
use crate::scaler::{ScaleController, ScaleDecision};
use crate::worker::{WorkerHandle, WorkerShared, spawn_worker};

struct PipelineInner {
    config: PipelineConfig,
    swap: Arc<RuleSwap>,
    signals: Arc<SignalMap>,
    workers: RwLock<Vec<WorkerHandle>>,
    next_worker_id: AtomicUsize,
    cursor: AtomicUsize,
    running: AtomicBool,

    submitted: AtomicU64,
    rejected: AtomicU64,
    /// Counters folded in from retired workers.
    retired_ticks: AtomicU64,
    retired_processed: AtomicU64,
    retired_violations: AtomicU64,
    retired_inject_failures: AtomicU64,
    retired_resets: AtomicU64,
    /// Counter floor carried in by `restore`.
    restored_base: Mutex<CounterSnapshot>,

    latency: LatencyTracker,
    controller: Mutex<Option<JoinHandle<()>>>,
    controller_stop: AtomicBool,
    writer: CheckpointWriter,
}

/// Streaming wrapper around the engine: a bounded worker pool fed by
/// lock-free rings, with auto-scaling, hot rule reload, and
/// checkpoint/restore. Dropping the pipeline stops it.
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    /// Build a pipeline around an already-compiled rule set.
    ///
    /// Rules are validated against the configured matrix capacity here -
    /// the deploy-time bounds check - so workers never re-validate on the
    /// tick path.
    pub fn create(config: PipelineConfig, rules: RuleSet) -> Result<Self, PipelineError> {
        rules.validate(config.matrix_capacity)?;

        let initial = config
            .initial_workers
            .max(config.min_workers)
            .max(1)
            .min(config.max_workers.max(1));
        let signals = Arc::new(config.signals.clone());
        let inner = Arc::new(PipelineInner {
            swap: Arc::new(RuleSwap::new(rules)),
            signals,
            workers: RwLock::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
            cursor: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            retired_ticks: AtomicU64::new(0),
            retired_processed: AtomicU64::new(0),
            retired_violations: AtomicU64::new(0),
            retired_inject_failures: AtomicU64::new(0),
            retired_resets: AtomicU64::new(0),
            restored_base: Mutex::new(CounterSnapshot::default()),
            latency: LatencyTracker::new(),
            controller: Mutex::new(None),
            controller_stop: AtomicBool::new(false),
            writer: CheckpointWriter::default(),
            config,
        });

        {
            let mut workers = inner.workers.write();
            for _ in 0..initial {
                workers.push(inner.new_worker_entry());
            }
        }

        info!(workers = initial, "pipeline created");
        Ok(Self { inner })
    }

    /// Spawn worker threads and the scaling controller.
    pub fn start(&self) -> Result<(), PipelineError> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        {
            let mut workers = self.inner.workers.write();
            for handle in workers.iter_mut() {
                if !handle.is_live() {
                    self.inner.spawn_entry(handle)?;
                }
            }
        }

        self.inner.controller_stop.store(false, Ordering::Release);
        let inner = self.inner.clone();
        let controller = thread::Builder::new()
            .name("causeway-controller".to_string())
            .spawn(move || run_controller(inner))
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;
        *self.inner.controller.lock() = Some(controller);

        info!("pipeline started");
        Ok(())
    }

    /// Stop accepting events, let in-flight ticks complete, drain the
    /// rings, and join every thread.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.inner.controller_stop.store(true, Ordering::Release);
        if let Some(handle) = self.inner.controller.lock().take()
            && handle.join().is_err()
        {
            warn!("controller thread panicked");
        }

        // Signal every worker first, then join; they drain concurrently.
        let mut joins = Vec::new();
        {
            let mut workers = self.inner.workers.write();
            for handle in workers.iter_mut() {
                handle.shared.stop.store(true, Ordering::Release);
                if let Some(join) = handle.join.take() {
                    joins.push(join);
                }
            }
        }
        for join in joins {
            if join.join().is_err() {
                warn!("worker thread panicked");
            }
        }

        // Clear stop flags so a later start() can respawn the pool.
        for handle in self.inner.workers.read().iter() {
            handle.shared.stop.store(false, Ordering::Release);
        }

        info!("pipeline stopped");
    }

    /// Submit one event. `false` means the target ring is full -
    /// backpressure, retry or drop at the caller's discretion. Never
    /// blocks. Events are accepted while capacity exists even before
    /// `start`; workers drain the rings once running.
    pub fn submit(&self, event: SignalEvent) -> bool {
        if self.inner.route(event) {
            self.inner.submitted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.inner.rejected.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Submit a batch. Every event is attempted; returns `true` only if
    /// all were accepted.
    pub fn submit_batch(&self, events: impl IntoIterator<Item = SignalEvent>) -> bool {
        let mut all_accepted = true;
        for event in events {
            all_accepted &= self.submit(event);
        }
        all_accepted
    }

    /// Compile and swap in a new rule set without stopping the pipeline.
    ///
    /// Compilation and validation run off the hot path; the swap itself
    /// is a pointer replacement under the write lock. In-flight ticks
    /// finish against the old set; every later tick sees the new one.
    pub fn reload_rules(&self, text: &str) -> bool {
        let output = causeway_dsl::compile(text);
        if !output.diagnostics.is_empty() {
            warn!(
                skipped = output.diagnostics.len(),
                "rule reload compiled with diagnostics"
            );
        }
        if let Err(e) = output.rules.validate(self.inner.config.matrix_capacity) {
            warn!(error = %e, "rule reload rejected at validation");
            return false;
        }

        self.inner.swap.stage(output.rules);
        self.inner.swap.commit();
        true
    }

    /// Aggregated metrics across live and retired workers.
    pub fn get_metrics(&self) -> PipelineMetrics {
        let base = *self.inner.restored_base.lock();
        let workers = self.inner.workers.read();

        let mut processed = self.inner.retired_processed.load(Ordering::Relaxed);
        let mut violations = self.inner.retired_violations.load(Ordering::Relaxed);
        let mut inject_failures = self.inner.retired_inject_failures.load(Ordering::Relaxed);
        let mut resets = self.inner.retired_resets.load(Ordering::Relaxed);

        let mut live = 0usize;
        let mut depth_sum = 0.0;
        for handle in workers.iter() {
            let shared = &handle.shared;
            processed += shared.processed.load(Ordering::Relaxed);
            violations += shared.violations.load(Ordering::Relaxed);
            inject_failures += shared.inject_failures.load(Ordering::Relaxed);
            resets += shared.resets.load(Ordering::Relaxed);
            if handle.is_live() {
                live += 1;
                depth_sum += shared.ring.depth_ratio();
            }
        }

        PipelineMetrics {
            workers: live,
            submitted: base.submitted + self.inner.submitted.load(Ordering::Relaxed),
            rejected: base.rejected + self.inner.rejected.load(Ordering::Relaxed),
            processed: base.processed + processed,
            inject_failures,
            violations,
            resets,
            queue_depth_ratio: if live > 0 { depth_sum / live as f64 } else { 0.0 },
            rule_generation: self.inner.swap.generation(),
            latency: self.inner.latency.snapshot(),
        }
    }

    /// Write a checkpoint synchronously.
    pub fn checkpoint(&self, path: &Path) -> Result<(), PipelineError> {
        let checkpoint = self.inner.build_checkpoint()?;
        write_checkpoint(path, &checkpoint, DEFAULT_COMPRESSION_LEVEL)?;
        info!(path = %path.display(), "checkpoint written");
        Ok(())
    }

    /// Restore worker state and counters from a checkpoint.
    ///
    /// Idempotent: applying the same checkpoint twice converges to the
    /// same state. Fails loudly when the checkpoint was taken against a
    /// different rule set, and never leaves a worker without a valid
    /// matrix - workers with no snapshot keep the state they have.
    pub fn restore(&self, path: &Path) -> Result<(), PipelineError> {
        let checkpoint = load_checkpoint(path)?;

        if checkpoint.header.version != CHECKPOINT_VERSION {
            return Err(PipelineError::VersionMismatch {
                found: checkpoint.header.version,
                current: CHECKPOINT_VERSION,
            });
        }

        let active = rules_fingerprint(&self.inner.swap.current())?;
        if checkpoint.header.rules_fingerprint != active {
            return Err(PipelineError::FingerprintMismatch {
                expected: hex(&active),
                found: hex(&checkpoint.header.rules_fingerprint),
            });
        }

        *self.inner.restored_base.lock() = checkpoint.counters;
        self.inner.submitted.store(0, Ordering::Relaxed);
        self.inner.rejected.store(0, Ordering::Relaxed);
        self.inner.retired_processed.store(0, Ordering::Relaxed);
        self.inner.retired_ticks.store(0, Ordering::Relaxed);

        let mut workers = self.inner.workers.write();
        for (i, snap) in checkpoint.workers.iter().enumerate() {
            if i >= workers.len() {
                if workers.len() >= self.inner.config.max_workers {
                    warn!(
                        snapshot_workers = checkpoint.workers.len(),
                        max = self.inner.config.max_workers,
                        "checkpoint has more workers than the configured maximum"
                    );
                    break;
                }
                workers.push(self.inner.new_worker_entry());
            }

            let handle = &mut workers[i];
            handle.shared.ticks.store(snap.ticks, Ordering::Relaxed);
            handle.shared.processed.store(0, Ordering::Relaxed);
            if handle.is_live() {
                *handle.shared.restore_slot.lock() = Some(snap.matrix.clone());
            } else {
                *handle.shared.snapshot.lock() = snap.matrix.clone();
            }
        }

        // Newly added entries start on the next start(); if the pipeline
        // is running, bring them up now.
        if self.inner.running.load(Ordering::Acquire) {
            for handle in workers.iter_mut() {
                if !handle.is_live() {
                    self.inner.spawn_entry(handle)?;
                }
            }
        }

        info!(workers = checkpoint.workers.len(), "pipeline restored");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PipelineInner {
    fn new_worker_entry(&self) -> WorkerHandle {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        WorkerHandle {
            shared: Arc::new(WorkerShared::new(
                id,
                self.config.ring_capacity,
                self.config.matrix_capacity,
            )),
            join: None,
        }
    }

    fn spawn_entry(&self, handle: &mut WorkerHandle) -> Result<(), PipelineError> {
        let initial = handle.shared.snapshot.lock().clone();
        handle.shared.stop.store(false, Ordering::Release);
        let join = spawn_worker(
            handle.shared.clone(),
            self.swap.clone(),
            self.signals.clone(),
            self.config.collector.clone(),
            self.latency.clone(),
            initial,
        )
        .map_err(|e| PipelineError::Spawn(e.to_string()))?;
        handle.join = Some(join);
        Ok(())
    }

    /// Round-robin an event onto a ring that still has a consumer
    /// coming. Retiring workers are excluded so nothing lands on a ring
    /// about to lose its drain.
    fn route(&self, event: SignalEvent) -> bool {
        let workers = self.workers.read();
        let eligible: Vec<&WorkerHandle> = workers
            .iter()
            .filter(|h| !h.shared.retiring.load(Ordering::Acquire))
            .collect();
        if eligible.is_empty() {
            return false;
        }

        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % eligible.len();
        eligible[idx].shared.ring.push(event)
    }

    fn sample_depth(&self) -> (usize, f64) {
        let workers = self.workers.read();
        let mut live = 0usize;
        let mut depth_sum = 0.0;
        for handle in workers.iter().filter(|h| h.is_live()) {
            live += 1;
            depth_sum += handle.shared.ring.depth_ratio();
        }
        let ratio = if live > 0 { depth_sum / live as f64 } else { 0.0 };
        (live, ratio)
    }

    fn grow(&self) {
        let mut workers = self.workers.write();
        let live = workers.iter().filter(|h| h.is_live()).count();
        if live >= self.config.max_workers {
            return;
        }
        let mut handle = self.new_worker_entry();
        match self.spawn_entry(&mut handle) {
            Ok(()) => {
                info!(worker = handle.shared.id, live = live + 1, "worker added");
                workers.push(handle);
            }
            Err(e) => warn!(error = %e, "could not add worker"),
        }
    }

    fn shrink(&self) {
        // Take the newest live worker out of the routing set while
        // keeping the lock short; the drain and join happen outside the
        // lock so submission is never stalled behind them.
        let (shared, join) = {
            let mut workers = self.workers.write();
            let live = workers.iter().filter(|h| h.is_live()).count();
            if live <= self.config.min_workers {
                return;
            }
            let Some(handle) = workers.iter_mut().rev().find(|h| h.is_live()) else {
                return;
            };
            handle.shared.retiring.store(true, Ordering::Release);
            (handle.shared.clone(), handle.join.take())
        };

        shared.stop.store(true, Ordering::Release);
        if let Some(join) = join
            && join.join().is_err()
        {
            warn!(worker = shared.id, "worker thread panicked during retirement");
        }

        // Anything that raced onto the ring after the drain finished is
        // handed to the surviving workers.
        while let Some(event) = shared.ring.pop() {
            if !self.route(event) {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(worker = shared.id, "event displaced by retirement was refused downstream");
            }
        }

        let mut workers = self.workers.write();
        if let Some(pos) = workers.iter().position(|h| h.shared.id == shared.id) {
            let handle = workers.remove(pos);
            let s = &handle.shared;
            self.retired_ticks
                .fetch_add(s.ticks.load(Ordering::Relaxed), Ordering::Relaxed);
            self.retired_processed
                .fetch_add(s.processed.load(Ordering::Relaxed), Ordering::Relaxed);
            self.retired_violations
                .fetch_add(s.violations.load(Ordering::Relaxed), Ordering::Relaxed);
            self.retired_inject_failures
                .fetch_add(s.inject_failures.load(Ordering::Relaxed), Ordering::Relaxed);
            self.retired_resets
                .fetch_add(s.resets.load(Ordering::Relaxed), Ordering::Relaxed);
            info!(worker = s.id, "worker retired");
        }
    }

    fn build_checkpoint(&self) -> Result<PipelineCheckpoint, PipelineError> {
        let rules = self.swap.current();
        let workers = self.workers.read();

        let snapshots: Vec<WorkerSnapshot> = workers
            .iter()
            .map(|h| WorkerSnapshot {
                worker_id: h.shared.id,
                matrix: h.shared.snapshot.lock().clone(),
                ticks: h.shared.ticks.load(Ordering::Relaxed),
            })
            .collect();

        let base = *self.restored_base.lock();
        let processed = base.processed
            + self.retired_processed.load(Ordering::Relaxed)
            + workers
                .iter()
                .map(|h| h.shared.processed.load(Ordering::Relaxed))
                .sum::<u64>();

        Ok(PipelineCheckpoint {
            header: CheckpointHeader {
                version: CHECKPOINT_VERSION,
                rules_fingerprint: rules_fingerprint(&rules)?,
                rule_generation: self.swap.generation(),
                worker_count: snapshots.len(),
            },
            workers: snapshots,
            counters: CounterSnapshot {
                submitted: base.submitted + self.submitted.load(Ordering::Relaxed),
                rejected: base.rejected + self.rejected.load(Ordering::Relaxed),
                processed,
            },
        })
    }
}

fn run_controller(inner: Arc<PipelineInner>) {
    let mut controller = ScaleController::new(&inner.config);
    let mut last_checkpoint = Instant::now();
    debug!("controller started");

    while !inner.controller_stop.load(Ordering::Acquire) {
        thread::sleep(inner.config.scale_interval);
        if inner.controller_stop.load(Ordering::Acquire) {
            break;
        }

        let (live, depth_ratio) = inner.sample_depth();
        let mean_latency = inner.latency.mean();
        match controller.decide(Instant::now(), live, depth_ratio, mean_latency) {
            ScaleDecision::Grow => inner.grow(),
            ScaleDecision::Shrink => inner.shrink(),
            ScaleDecision::Hold => {}
        }

        if let (Some(interval), Some(path)) = (
            inner.config.checkpoint_interval,
            inner.config.checkpoint_path.as_ref(),
        ) && last_checkpoint.elapsed() >= interval
        {
            match inner.build_checkpoint() {
                Ok(checkpoint) => {
                    // Queue full just means this cadence slot is skipped.
                    let _ = inner.writer.request(path.clone(), checkpoint);
                }
                Err(e) => warn!(error = %e, "periodic checkpoint failed to build"),
            }
            last_checkpoint = Instant::now();
        }
    }
    debug!("controller exited");
}

fn hex(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
