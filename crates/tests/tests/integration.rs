//! End-to-end integration tests.
//!
//! Compile → deploy → inject → tick → validate at the engine level, and
//! the full streaming surface (submit, backpressure, hot reload,
//! checkpoint/restore, fault recovery) at the pipeline level.

use std::time::{Duration, Instant};

use causeway_core::BitRef;
use causeway_pipeline::{Pipeline, PipelineConfig, SignalEvent};
use causeway_runtime::CollectorConfig;
use causeway_tests::TestHarness;

/// Install a subscriber once so `RUST_LOG` surfaces engine traces when a
/// test needs debugging.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Poll until `done` or the deadline passes.
fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

/// A collector configuration that never trips on timing or drift, for
/// tests that exercise throughput rather than validation.
fn forgiving_collector() -> CollectorConfig {
    CollectorConfig {
        max_cycles: u64::MAX,
        entropy_threshold: 64,
        ..CollectorConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Engine chain
// ---------------------------------------------------------------------------

#[test]
fn cascade_fires_within_one_tick() {
    let mut harness = TestHarness::from_source(
        "ACTOR 0 BIT 0 SET\n\
         IF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 1 SET",
        2,
    );

    harness.run_ticks(1, 10);

    assert_eq!(harness.actor(0), 0x01);
    assert_eq!(harness.actor(1), 0x02);

    let metrics = harness.metrics();
    assert_eq!(metrics.spans_completed, 1);
    assert_eq!(metrics.causal_violations, 0);
}

#[test]
fn injected_signal_drives_dependent_rules() {
    let mut harness = TestHarness::from_source(
        "IF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 0 SET\n\
         IF ACTOR 1 BIT 0 AND ACTOR 0 BIT 0 THEN ACTOR 1 BIT 1 SET",
        2,
    );
    harness.signals.bind("ignite", BitRef::new(0, 0));

    // Without the trigger, nothing fires.
    harness.run_ticks(1, 10);
    assert_eq!(harness.actor(1), 0x00);

    // With it, the chain fires in one tick (in-tick visibility).
    harness.inject("ignite");
    harness.run_ticks(1, 10);
    assert_eq!(harness.actor(1), 0x03);
}

#[test]
fn repeated_ticks_are_stable_and_validated() {
    let mut harness = TestHarness::from_source(
        "IF ACTOR 0 BIT 0 THEN ACTOR 0 BIT 1 SET\n\
         IF ACTOR 0 BIT 1 THEN ACTOR 0 BIT 0 CLEAR",
        1,
    );
    harness.signals.bind("kick", BitRef::new(0, 0));
    harness.inject("kick");

    harness.run_ticks(5, 100);

    // Bit 0 set, then cleared by the second rule in the same tick; bit 1
    // persists. Later ticks are fixed-point.
    assert_eq!(harness.actor(0), 0x02);
    let metrics = harness.metrics();
    assert_eq!(metrics.spans_completed, 5);
    assert_eq!(metrics.causal_violations, 0);
    assert_eq!(metrics.budget_violations, 0);
}

#[test]
fn budget_overrun_surfaces_through_the_harness() {
    let config = CollectorConfig {
        max_cycles: 50,
        ..forgiving_collector()
    };
    let mut harness = TestHarness::with_collector_config("ACTOR 0 BIT 0 SET", 1, config);

    // 100 cycles against a budget of 50.
    assert!(harness.tick(100).is_err());
    assert_eq!(harness.metrics().budget_violations, 1);
}

// ---------------------------------------------------------------------------
// Pipeline surface
// ---------------------------------------------------------------------------

fn pipeline_config(workers: usize, ring_capacity: usize) -> PipelineConfig {
    let mut config = PipelineConfig {
        initial_workers: workers,
        min_workers: workers.max(1),
        max_workers: workers.max(1),
        ring_capacity,
        matrix_capacity: 4,
        collector: forgiving_collector(),
        ..PipelineConfig::default()
    };
    config.signals.bind("pulse", BitRef::new(0, 0));
    config
}

#[test]
fn pipeline_processes_submitted_events() {
    init_tracing();
    let rules = causeway_dsl::compile("IF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 1 SET").rules;
    let pipeline = Pipeline::create(pipeline_config(2, 64), rules).unwrap();
    pipeline.start().unwrap();

    let events = (0..20).map(|_| SignalEvent::new("pulse"));
    assert!(pipeline.submit_batch(events));

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.get_metrics().processed == 20
    }));

    let metrics = pipeline.get_metrics();
    assert_eq!(metrics.submitted, 20);
    assert_eq!(metrics.rejected, 0);
    assert_eq!(metrics.violations, 0);
    assert_eq!(metrics.workers, 2);

    pipeline.stop();
}

#[test]
fn overflow_returns_false_and_never_blocks() {
    init_tracing();
    let rules = causeway_dsl::compile("ACTOR 0 BIT 0 SET").rules;
    // One worker, four slots, not started: nothing drains.
    let pipeline = Pipeline::create(pipeline_config(1, 4), rules).unwrap();

    for _ in 0..4 {
        assert!(pipeline.submit(SignalEvent::new("pulse")));
    }
    let overflow_started = Instant::now();
    for _ in 0..4 {
        assert!(!pipeline.submit(SignalEvent::new("pulse")));
    }
    // Refusal is immediate, not a timeout.
    assert!(overflow_started.elapsed() < Duration::from_millis(100));

    let metrics = pipeline.get_metrics();
    assert_eq!(metrics.submitted, 4);
    assert_eq!(metrics.rejected, 4);

    // Once started, the queued events drain; the refused ones stay gone.
    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.get_metrics().processed == 4
    }));
    pipeline.stop();
}

#[test]
fn hot_reload_swaps_atomically_under_load() {
    init_tracing();
    let rules = causeway_dsl::compile("IF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 0 SET").rules;
    let pipeline = Pipeline::create(pipeline_config(2, 256), rules).unwrap();
    pipeline.start().unwrap();

    // Feed while reloading. A torn rule set would surface as a causal
    // violation: each tick's spec and exec hashes agree only when the
    // tick ran against one consistent snapshot of the rules.
    for i in 0..50 {
        assert!(pipeline.submit(SignalEvent::new("pulse")));
        if i % 10 == 0 {
            assert!(pipeline.reload_rules(
                "IF ACTOR 0 BIT 0 THEN ACTOR 2 BIT 0 SET\n\
                 IF ACTOR 2 BIT 0 THEN ACTOR 3 BIT 0 SET"
            ));
        }
    }

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.get_metrics().processed == 50
    }));

    let metrics = pipeline.get_metrics();
    assert_eq!(metrics.violations, 0);
    assert_eq!(metrics.rule_generation, 5);
    pipeline.stop();
}

#[test]
fn reload_rejects_rules_that_do_not_fit_the_matrix() {
    let rules = causeway_dsl::compile("ACTOR 0 BIT 0 SET").rules;
    let pipeline = Pipeline::create(pipeline_config(1, 16), rules).unwrap();

    // matrix_capacity is 4; actor 9 cannot be deployed.
    assert!(!pipeline.reload_rules("ACTOR 9 BIT 0 SET"));
    assert_eq!(pipeline.get_metrics().rule_generation, 0);
}

#[test]
fn checkpoint_restore_roundtrip() {
    init_tracing();
    let path = std::env::temp_dir().join("causeway_pipeline_roundtrip.ckpt");
    std::fs::remove_file(&path).ok();

    let source = "IF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 1 SET";
    let rules = causeway_dsl::compile(source).rules;
    let pipeline = Pipeline::create(pipeline_config(2, 64), rules).unwrap();
    pipeline.start().unwrap();

    assert!(pipeline.submit_batch((0..10).map(|_| SignalEvent::new("pulse"))));
    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.get_metrics().processed == 10
    }));

    pipeline.stop();
    pipeline.checkpoint(&path).unwrap();
    drop(pipeline);

    // A fresh pipeline over the same rules resumes from the checkpoint.
    let rules = causeway_dsl::compile(source).rules;
    let restored = Pipeline::create(pipeline_config(2, 64), rules).unwrap();
    restored.restore(&path).unwrap();

    let metrics = restored.get_metrics();
    assert_eq!(metrics.processed, 10);
    assert_eq!(metrics.submitted, 10);

    // Restoring again converges to the same state.
    restored.restore(&path).unwrap();
    assert_eq!(restored.get_metrics().processed, 10);

    std::fs::remove_file(&path).ok();
}

#[test]
fn restore_refuses_a_different_rule_set() {
    let path = std::env::temp_dir().join("causeway_pipeline_mismatch.ckpt");
    std::fs::remove_file(&path).ok();

    let rules = causeway_dsl::compile("ACTOR 0 BIT 0 SET").rules;
    let pipeline = Pipeline::create(pipeline_config(1, 16), rules).unwrap();
    pipeline.checkpoint(&path).unwrap();
    drop(pipeline);

    let other_rules = causeway_dsl::compile("ACTOR 1 BIT 0 SET").rules;
    let other = Pipeline::create(pipeline_config(1, 16), other_rules).unwrap();
    assert!(other.restore(&path).is_err());

    std::fs::remove_file(&path).ok();
}

#[test]
fn fault_recovery_escalates_to_a_worker_reset() {
    init_tracing();
    // Entropy threshold 0 makes the first state-changing tick a
    // violation; with fault recovery on it escalates to a preserving
    // genesis reset on the worker.
    let mut config = pipeline_config(1, 16);
    config.collector = CollectorConfig {
        max_cycles: u64::MAX,
        entropy_threshold: 0,
        fault_recovery: true,
        ..CollectorConfig::default()
    };

    let rules = causeway_dsl::compile("IF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 1 SET").rules;
    let pipeline = Pipeline::create(config, rules).unwrap();
    pipeline.start().unwrap();

    assert!(pipeline.submit(SignalEvent::new("pulse")));

    assert!(wait_until(Duration::from_secs(5), || {
        let m = pipeline.get_metrics();
        m.violations >= 1 && m.resets >= 1
    }));

    pipeline.stop();
}
