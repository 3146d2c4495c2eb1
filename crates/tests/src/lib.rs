//! Integration test harness for Causeway.
//!
//! Wires the full chain - compile → deploy → inject → tick → validate -
//! around a manual clock so tick budgets are deterministic under test.

use std::sync::Arc;

use causeway_core::{ActorMatrix, RuleSet, SignalMap};
use causeway_foundation::ManualClock;
use causeway_runtime::{Collector, CollectorConfig, CollectorMetrics, SpanError, TickEngine};

/// One engine instance with its matrix, signals, and telemetry.
pub struct TestHarness {
    pub rules: RuleSet,
    pub matrix: ActorMatrix,
    pub signals: SignalMap,
    pub clock: Arc<ManualClock>,
    engine: TickEngine,
    collector: Collector,
}

impl TestHarness {
    /// Compile `source` and deploy it against a matrix of `capacity`
    /// actors.
    ///
    /// # Panics
    ///
    /// Panics on diagnostics or deploy-time validation failure; harness
    /// inputs are expected to be well-formed.
    pub fn from_source(source: &str, capacity: usize) -> Self {
        Self::with_collector_config(source, capacity, CollectorConfig::default())
    }

    pub fn with_collector_config(source: &str, capacity: usize, config: CollectorConfig) -> Self {
        let output = causeway_dsl::compile(source);
        assert!(
            output.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            output.diagnostics
        );
        TickEngine::deploy(capacity, &output.rules).expect("rules must fit the matrix");

        let clock = Arc::new(ManualClock::new());
        Self {
            rules: output.rules,
            matrix: ActorMatrix::new(capacity),
            signals: SignalMap::new(),
            clock: clock.clone(),
            engine: TickEngine::new(),
            collector: Collector::with_clock(config, clock),
        }
    }

    /// Raise the trigger bits bound to `name`.
    pub fn inject(&mut self, name: &str) {
        self.signals
            .inject(&mut self.matrix, name)
            .expect("signal must be bound");
    }

    /// Run one telemetry-wrapped tick, committing the result. The manual
    /// clock advances by `cycles_per_tick` inside the span.
    pub fn tick(&mut self, cycles_per_tick: u64) -> Result<(), SpanError> {
        let span = self
            .collector
            .span_start(0, self.rules.spec_hash(), &self.matrix);
        self.clock.advance(cycles_per_tick);
        let receipt = self.engine.execute(&self.matrix, &self.rules);
        self.matrix = receipt.matrix;
        self.collector.span_end(span, receipt.exec_hash, &self.matrix)
    }

    /// Run `n` ticks, asserting every one validates.
    pub fn run_ticks(&mut self, n: usize, cycles_per_tick: u64) {
        for i in 0..n {
            self.tick(cycles_per_tick)
                .unwrap_or_else(|e| panic!("tick {i} failed validation: {e}"));
        }
    }

    pub fn actor(&self, idx: usize) -> u64 {
        self.matrix.actor(idx)
    }

    pub fn metrics(&self) -> CollectorMetrics {
        self.collector.metrics()
    }
}
