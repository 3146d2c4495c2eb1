//! Pipeline workers.
//!
//! Each worker thread owns its actor matrix, tick engine, and telemetry
//! collector outright - nothing on the hot path is shared or locked. The
//! only cross-thread surfaces are the event ring, a handful of atomic
//! counters, and two mutexed slots (post-tick snapshot for checkpoints,
//! restore hand-off) touched with `try_lock` or between ticks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use causeway_core::{ActorMatrix, SignalMap};
use causeway_runtime::{
    CausalViolation, Collector, CollectorConfig, FaultHandler, ResetSeverity, TickEngine,
};

use crate::metrics::LatencyTracker;
use crate::reload::RuleSwap;
use crate::ring::EventRing;

const RESET_NONE: u8 = 0;
const RESET_PRESERVING: u8 = 1;
const RESET_DESTRUCTIVE: u8 = 2;

/// Idle backoff between empty ring polls.
const IDLE_POLL: Duration = Duration::from_micros(100);

/// State shared between a worker thread and the pipeline.
pub(crate) struct WorkerShared {
    pub id: usize,
    pub ring: EventRing,
    /// Drain the ring, finish the in-flight tick, then exit.
    pub stop: AtomicBool,
    /// Excluded from event routing while the worker drains toward
    /// retirement.
    pub retiring: AtomicBool,
    /// Pending genesis reset, written by the fault handler.
    reset: AtomicU8,

    pub ticks: AtomicU64,
    pub processed: AtomicU64,
    pub inject_failures: AtomicU64,
    pub violations: AtomicU64,
    pub resets: AtomicU64,

    /// Post-tick copy of the matrix, read by checkpoints.
    pub snapshot: Mutex<ActorMatrix>,
    /// Matrix handed in by `restore`, picked up between ticks.
    pub restore_slot: Mutex<Option<ActorMatrix>>,
}

impl WorkerShared {
    pub fn new(id: usize, ring_capacity: usize, matrix_capacity: usize) -> Self {
        Self {
            id,
            ring: EventRing::new(ring_capacity),
            stop: AtomicBool::new(false),
            retiring: AtomicBool::new(false),
            reset: AtomicU8::new(RESET_NONE),
            ticks: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            inject_failures: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            snapshot: Mutex::new(ActorMatrix::new(matrix_capacity)),
            restore_slot: Mutex::new(None),
        }
    }
}

/// Routes genesis resets back to the owning worker. The collector calls
/// this on the worker's own thread; the flag is applied between ticks so
/// a collapse in progress always runs to completion.
struct WorkerFaultHandler(Arc<WorkerShared>);

impl FaultHandler for WorkerFaultHandler {
    fn genesis_reset(&self, severity: ResetSeverity, violation: &CausalViolation) {
        let level = match severity {
            ResetSeverity::Preserving => RESET_PRESERVING,
            ResetSeverity::Destructive => RESET_DESTRUCTIVE,
        };
        // A destructive request must not be downgraded by a later mild one.
        self.0.reset.fetch_max(level, Ordering::AcqRel);
        warn!(worker = self.0.id, ?severity, span = violation.span, "genesis reset requested");
    }
}

/// A worker as the pipeline sees it.
pub(crate) struct WorkerHandle {
    pub shared: Arc<WorkerShared>,
    pub join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn is_live(&self) -> bool {
        self.join.is_some()
    }
}

/// Spawn a worker thread around the shared state.
pub(crate) fn spawn_worker(
    shared: Arc<WorkerShared>,
    swap: Arc<RuleSwap>,
    signals: Arc<SignalMap>,
    collector_config: CollectorConfig,
    latency: LatencyTracker,
    initial_matrix: ActorMatrix,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("causeway-worker-{}", shared.id))
        .spawn(move || run_worker(shared, swap, signals, collector_config, latency, initial_matrix))
}

fn run_worker(
    shared: Arc<WorkerShared>,
    swap: Arc<RuleSwap>,
    signals: Arc<SignalMap>,
    collector_config: CollectorConfig,
    latency: LatencyTracker,
    mut matrix: ActorMatrix,
) {
    let fiber_ref = shared.id as u64;
    let mut engine = TickEngine::new();
    let mut collector = Collector::new(collector_config);
    collector.set_trace_id(fiber_ref);
    collector.set_fault_handler(Arc::new(WorkerFaultHandler(shared.clone())));

    info!(worker = shared.id, "worker started");

    loop {
        // Between ticks: restore hand-off wins over a pending reset.
        if let Some(restored) = shared.restore_slot.lock().take() {
            debug!(worker = shared.id, "matrix restored");
            matrix = restored;
            *shared.snapshot.lock() = matrix.clone();
        }
        match shared.reset.swap(RESET_NONE, Ordering::AcqRel) {
            RESET_PRESERVING => {
                collector.reset();
                shared.resets.fetch_add(1, Ordering::Relaxed);
                info!(worker = shared.id, "genesis reset applied, state preserved");
            }
            RESET_DESTRUCTIVE => {
                matrix.reset();
                collector.reset();
                *shared.snapshot.lock() = matrix.clone();
                shared.resets.fetch_add(1, Ordering::Relaxed);
                info!(worker = shared.id, "genesis reset applied, state discarded");
            }
            _ => {}
        }

        let Some(event) = shared.ring.pop() else {
            // Stop only once the ring is drained; queued events are not
            // discarded by shutdown or retirement.
            if shared.stop.load(Ordering::Acquire) {
                break;
            }
            thread::sleep(IDLE_POLL);
            continue;
        };

        let started = Instant::now();

        // One read of the swap per tick: the whole tick runs against
        // this snapshot of the rules, old or new, never a mixture.
        let rules = swap.current();

        if let Err(e) = signals.inject(&mut matrix, &event.name) {
            warn!(worker = shared.id, error = %e, "event not injectable");
            shared.inject_failures.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let span = collector.span_start(fiber_ref, rules.spec_hash(), &matrix);
        let receipt = engine.execute(&matrix, &rules);
        matrix = receipt.matrix;
        if collector.span_end(span, receipt.exec_hash, &matrix).is_err() {
            shared.violations.fetch_add(1, Ordering::Relaxed);
        }

        shared.ticks.fetch_add(1, Ordering::Relaxed);
        shared.processed.fetch_add(1, Ordering::Relaxed);

        // Skipped under contention; the checkpointer holds this only
        // briefly and the next tick refreshes it.
        if let Some(mut snapshot) = shared.snapshot.try_lock() {
            snapshot.clone_from(&matrix);
        }

        latency.record(started.elapsed());
    }

    // Final snapshot so a post-stop checkpoint sees the last state.
    *shared.snapshot.lock() = matrix;
    info!(worker = shared.id, ticks = shared.ticks.load(Ordering::Relaxed), "worker exited");
}
