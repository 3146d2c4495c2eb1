//! Telemetry collector.
//!
//! Every tick is wrapped in a span: cycles at start and end, a causal
//! hash delta between the expected and actual execution fingerprints, and
//! an entropy delta over the actor state. Spans live in a fixed-capacity
//! ring whose overflow policy is overwrite-oldest - bounded memory takes
//! priority over retaining history, and every overwrite is counted.
//!
//! Collectors are plain values handed to their callers; nothing here is
//! process-global.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use causeway_core::ActorMatrix;
use causeway_foundation::{Clock, MonotonicClock};

use crate::error::SpanError;
use crate::fault::{CausalViolation, FaultHandler, ResetSeverity};

/// Collector thresholds and capacities.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Span ring capacity. Oldest unexported spans are overwritten when
    /// the ring is full.
    pub ring_capacity: usize,
    /// Per-tick cycle budget.
    pub max_cycles: u64,
    /// `hash_delta < hash_delta_threshold` keeps a tick within causal
    /// bounds. The default of 1 demands an exact spec/exec match.
    pub hash_delta_threshold: u64,
    /// `entropy_delta <= entropy_threshold` is valid drift.
    pub entropy_threshold: u64,
    /// Escalate violations through the fault handler.
    pub fault_recovery: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 256,
            max_cycles: 1_000_000,
            hash_delta_threshold: 1,
            entropy_threshold: 16,
            fault_recovery: false,
        }
    }
}

/// One finalized or in-flight tick record.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    /// Monotonic span identifier, unique within a collector.
    pub span_id: u64,
    /// Trace the span belongs to (set per collector).
    pub trace_id: u64,
    /// Identity of the executing fiber/worker.
    pub fiber_ref: u64,

    pub start_cycles: u64,
    pub end_cycles: u64,
    pub elapsed_cycles: u64,

    pub spec_hash: u64,
    pub exec_hash: u64,
    pub hash_delta: u64,

    pub entropy_pre: u64,
    pub entropy_post: u64,
    pub entropy_delta: u64,

    pub within_causal_bounds: bool,
    pub entropy_valid: bool,
    pub tick_budget_met: bool,
    pub spec_exec_validated: bool,
}

/// Handle returned by `span_start`, consumed by `span_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanId {
    slot: usize,
    serial: u64,
}

/// Export collaborator: receives finalized spans as they are drained.
pub trait SpanSink: Send {
    fn export(&mut self, span: &Span);
}

/// Cumulative collector counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CollectorMetrics {
    pub spans_started: u64,
    pub spans_completed: u64,
    pub spans_exported: u64,
    /// Unexported spans lost to the overwrite-oldest policy.
    pub spans_overwritten: u64,

    pub causal_violations: u64,
    pub entropy_violations: u64,
    pub budget_violations: u64,
    pub escalations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Open,
    Finalized,
}

struct Slot {
    span: Span,
    state: SlotState,
}

/// Per-engine telemetry collector.
pub struct Collector {
    config: CollectorConfig,
    clock: Arc<dyn Clock>,
    trace_id: u64,
    slots: Vec<Option<Slot>>,
    next_serial: u64,
    metrics: CollectorMetrics,
    sink: Option<Box<dyn SpanSink>>,
    fault_handler: Option<Arc<dyn FaultHandler>>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Collector with an explicit clock. Tests drive a manual clock so
    /// budget checks are deterministic.
    pub fn with_clock(config: CollectorConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = config.ring_capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            config,
            clock,
            trace_id: 0,
            slots,
            next_serial: 0,
            metrics: CollectorMetrics::default(),
            sink: None,
            fault_handler: None,
        }
    }

    pub fn set_trace_id(&mut self, trace_id: u64) {
        self.trace_id = trace_id;
    }

    /// Install the export collaborator. With a sink installed, the
    /// collector drains itself when the ring nears capacity.
    pub fn install_sink(&mut self, sink: Box<dyn SpanSink>) {
        self.sink = Some(sink);
    }

    /// Install the fault escalation seam.
    pub fn set_fault_handler(&mut self, handler: Arc<dyn FaultHandler>) {
        self.fault_handler = Some(handler);
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn metrics(&self) -> CollectorMetrics {
        self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = CollectorMetrics::default();
    }

    /// Drop all span state and counters. Used by a genesis reset.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.metrics = CollectorMetrics::default();
    }

    /// Open a span for the tick about to execute.
    ///
    /// Records start cycles and pre-tick entropy, and stores the hash the
    /// caller expects execution to match. If the ring slot still holds an
    /// unexported span, that span is overwritten and counted.
    pub fn span_start(&mut self, fiber_ref: u64, spec_hash: u64, matrix: &ActorMatrix) -> SpanId {
        if self.sink.is_some() && self.finalized_count() >= self.high_water() {
            self.export_spans();
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        let slot = (serial % self.slots.len() as u64) as usize;

        if self.slots[slot].is_some() {
            self.metrics.spans_overwritten += 1;
            debug!(slot, "unexported span overwritten");
        }

        let span = Span {
            span_id: serial,
            trace_id: self.trace_id,
            fiber_ref,
            start_cycles: self.clock.now_cycles(),
            end_cycles: 0,
            elapsed_cycles: 0,
            spec_hash,
            exec_hash: 0,
            hash_delta: 0,
            entropy_pre: matrix.entropy(),
            entropy_post: 0,
            entropy_delta: 0,
            within_causal_bounds: false,
            entropy_valid: false,
            tick_budget_met: false,
            spec_exec_validated: false,
        };
        self.slots[slot] = Some(Slot {
            span,
            state: SlotState::Open,
        });
        self.metrics.spans_started += 1;
        trace!(span = serial, fiber = fiber_ref, "span opened");

        SpanId { slot, serial }
    }

    /// Finalize a span with the tick's actual execution hash and post
    /// state.
    ///
    /// Evaluates the three independent checks and stores everything on
    /// the span. A violation is recorded always; it escalates through
    /// the fault handler only when fault recovery is enabled.
    pub fn span_end(
        &mut self,
        id: SpanId,
        exec_hash: u64,
        matrix: &ActorMatrix,
    ) -> Result<(), SpanError> {
        let end_cycles = self.clock.now_cycles();
        let entropy_post = matrix.entropy();

        let slot = self
            .slots
            .get_mut(id.slot)
            .and_then(Option::as_mut)
            .filter(|s| s.state == SlotState::Open && s.span.span_id == id.serial)
            .ok_or(SpanError::NotOpen(id.serial))?;

        let span = &mut slot.span;
        span.end_cycles = end_cycles;
        span.elapsed_cycles = end_cycles.saturating_sub(span.start_cycles);
        span.exec_hash = exec_hash;
        span.hash_delta = span.spec_hash ^ exec_hash;
        span.entropy_post = entropy_post;
        span.entropy_delta = span.entropy_pre.abs_diff(entropy_post);

        span.within_causal_bounds = span.hash_delta < self.config.hash_delta_threshold;
        span.entropy_valid = span.entropy_delta <= self.config.entropy_threshold;
        span.tick_budget_met = span.elapsed_cycles <= self.config.max_cycles;
        span.spec_exec_validated =
            span.within_causal_bounds && span.entropy_valid && span.tick_budget_met;

        slot.state = SlotState::Finalized;
        self.metrics.spans_completed += 1;

        if slot.span.spec_exec_validated {
            trace!(span = id.serial, elapsed = slot.span.elapsed_cycles, "span validated");
            return Ok(());
        }

        let span = &slot.span;
        if !span.within_causal_bounds {
            self.metrics.causal_violations += 1;
        }
        if !span.entropy_valid {
            self.metrics.entropy_violations += 1;
        }
        if !span.tick_budget_met {
            self.metrics.budget_violations += 1;
        }

        let violation = CausalViolation {
            span: span.span_id,
            fiber_ref: span.fiber_ref,
            hash_delta: span.hash_delta,
            entropy_delta: span.entropy_delta,
            elapsed_cycles: span.elapsed_cycles,
            within_causal_bounds: span.within_causal_bounds,
            entropy_valid: span.entropy_valid,
            tick_budget_met: span.tick_budget_met,
            hash_delta_threshold: self.config.hash_delta_threshold,
            entropy_threshold: self.config.entropy_threshold,
            max_cycles: self.config.max_cycles,
        };
        warn!(%violation, "causal validation failed");

        if self.config.fault_recovery
            && let Some(handler) = &self.fault_handler
        {
            let severity = ResetSeverity::classify(&violation);
            debug!(?severity, span = violation.span, "escalating genesis reset");
            handler.genesis_reset(severity, &violation);
            self.metrics.escalations += 1;
        }

        Err(SpanError::Violation(violation))
    }

    /// Drain finalized spans, oldest first, into the installed sink.
    ///
    /// Unexported spans are untouched until actually consumed here (or
    /// overwritten by the ring policy). Returns the number exported.
    pub fn export_spans(&mut self) -> usize {
        let Some(sink) = self.sink.as_mut() else {
            warn!("export requested with no sink installed");
            return 0;
        };

        let mut finalized: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                matches!(
                    s,
                    Some(Slot {
                        state: SlotState::Finalized,
                        ..
                    })
                )
            })
            .map(|(i, _)| i)
            .collect();
        finalized.sort_by_key(|&i| self.slots[i].as_ref().map(|s| s.span.span_id));

        let mut exported = 0usize;
        for i in finalized {
            if let Some(slot) = self.slots[i].take() {
                sink.export(&slot.span);
                exported += 1;
            }
        }
        self.metrics.spans_exported += exported as u64;
        debug!(exported, "spans exported");
        exported
    }

    fn finalized_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| {
                matches!(
                    s,
                    Some(Slot {
                        state: SlotState::Finalized,
                        ..
                    })
                )
            })
            .count()
    }

    fn high_water(&self) -> usize {
        // Drain when three quarters of the ring is finalized.
        (self.slots.len() * 3 / 4).max(1)
    }
}
