//! Bounded lock-free event ring.
//!
//! One ring per worker: many producers, the owning worker is the only
//! consumer. A full ring refuses the push - that refusal is the
//! pipeline's backpressure signal. Nothing here blocks, and nothing is
//! dropped silently: refused pushes are counted.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// A named external event. The worker's signal map resolves the name to
/// trigger bits before the tick runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    pub name: String,
}

impl SignalEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Bounded MPSC ring over a lock-free queue, with acceptance counters.
pub struct EventRing {
    queue: ArrayQueue<SignalEvent>,
    accepted: AtomicU64,
    refused: AtomicU64,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            accepted: AtomicU64::new(0),
            refused: AtomicU64::new(0),
        }
    }

    /// Non-blocking push. Returns `false` when the ring is full.
    pub fn push(&self, event: SignalEvent) -> bool {
        match self.queue.push(event) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.refused.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Non-blocking pop, consumer side.
    pub fn pop(&self) -> Option<SignalEvent> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Fill ratio in `0.0..=1.0`, sampled by the scaling controller.
    pub fn depth_ratio(&self) -> f64 {
        self.queue.len() as f64 / self.queue.capacity() as f64
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }
}
