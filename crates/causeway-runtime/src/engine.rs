//! Tick collapse engine.
//!
//! One tick is an eight-stage pipeline executed strictly in order. The
//! first four stages observe, stage five is the only stage that mutates
//! state, and the last three hand the result off and seal the tick.
//! Rules are evaluated in rule-set order against the mutating matrix, so
//! later rules observe the side effects of earlier ones within the same
//! tick; that ordering is load-bearing for reproducibility.

use causeway_foundation::FNV1A_OFFSET_BASIS_64;
use tracing::{instrument, trace};

use causeway_core::{ActorMatrix, RuleSet};

use crate::error::EngineError;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Observe whether any trigger bit is raised.
    TriggerScan,
    /// Confirm the rule set to apply is present.
    RuleLoad,
    /// Observe whether any rule condition currently holds.
    PathProbe,
    /// Take the snapshot the rules will read.
    StateSnapshot,
    /// Evaluate every rule in order and apply firing actions. The only
    /// mutating stage.
    CollapseApply,
    /// Hand the resulting matrix to the actuator collaborator.
    ActionBind,
    /// The mutated matrix becomes the tick's authoritative output.
    StateCommit,
    /// Close the matrix for this tick and return control.
    SealTick,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 8] = [
        Stage::TriggerScan,
        Stage::RuleLoad,
        Stage::PathProbe,
        Stage::StateSnapshot,
        Stage::CollapseApply,
        Stage::ActionBind,
        Stage::StateCommit,
        Stage::SealTick,
    ];
}

/// Consumer of post-collapse state, invoked once per tick at
/// [`Stage::ActionBind`]. Its side effects are its own concern; the tick
/// result is fixed before it runs.
pub trait Actuator: Send + Sync {
    fn actuate(&self, matrix: &ActorMatrix);
}

/// Output of one tick.
#[derive(Debug, Clone)]
pub struct TickReceipt {
    /// The post-collapse matrix. A fresh value; the input is untouched.
    pub matrix: ActorMatrix,
    /// Hash of every rule evaluated, folded in execution order. Equals
    /// the rule set's `spec_hash` exactly when execution observed the
    /// full, consistent rule set.
    pub exec_hash: u64,
    /// Rules whose condition held and whose action was applied.
    pub rules_fired: usize,
    /// Stage 1 observation: any bit set in the input matrix.
    pub triggers_seen: bool,
    /// Stage 3 observation: any rule condition held on the input matrix.
    pub paths_live: bool,
}

/// Executes ticks. Holds no actor state of its own; the caller owns the
/// matrix and the rule set.
#[derive(Default)]
pub struct TickEngine {
    actuator: Option<Box<dyn Actuator>>,
    ticks: u64,
}

impl TickEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actuator(actuator: Box<dyn Actuator>) -> Self {
        Self {
            actuator: Some(actuator),
            ticks: 0,
        }
    }

    /// Ticks executed by this engine instance.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Deploy-time validation: every actor index in `rules` must be in
    /// bounds for a matrix of `capacity`. After this passes, tick-time
    /// evaluation never re-checks.
    pub fn deploy(capacity: usize, rules: &RuleSet) -> Result<(), EngineError> {
        rules.validate(capacity)?;
        Ok(())
    }

    /// Execute one tick: eight stages, in order, no skipping.
    ///
    /// Never mutates `matrix`; the receipt carries the new state so the
    /// caller can diff before and after for telemetry.
    #[instrument(skip_all, fields(tick = self.ticks, rules = rules.len()))]
    pub fn execute(&mut self, matrix: &ActorMatrix, rules: &RuleSet) -> TickReceipt {
        // Stage 1: any signal raised? Purely observational.
        let triggers_seen = matrix.any_bit_set();
        trace!(stage = ?Stage::TriggerScan, triggers_seen);

        // Stage 2: the rule set is present by construction; record its
        // shape for diagnostics.
        trace!(stage = ?Stage::RuleLoad, rules = rules.len(), empty = rules.is_empty());

        // Stage 3: would anything fire right now? Diagnostic only; the
        // authoritative evaluation happens against the mutating matrix.
        let paths_live = rules.iter().any(|r| r.condition.holds(matrix));
        trace!(stage = ?Stage::PathProbe, paths_live);

        // Stage 4: the snapshot the rules will read and mutate.
        let mut next = matrix.clone();
        trace!(stage = ?Stage::StateSnapshot);

        // Stage 5: the only mutating stage. Every rule is folded into the
        // execution hash whether or not it fires; firing is a property of
        // the state, the hash is a property of the rule stream.
        let mut exec_hash = FNV1A_OFFSET_BASIS_64;
        let mut rules_fired = 0usize;
        for rule in rules.iter() {
            exec_hash = rule.fold_hash(exec_hash);
            if rule.condition.holds(&next) {
                rule.action.apply(&mut next);
                rules_fired += 1;
            }
        }
        trace!(stage = ?Stage::CollapseApply, rules_fired);

        // Stage 6: hand-off. The actuator sees the result; it cannot
        // change it.
        if let Some(actuator) = &self.actuator {
            actuator.actuate(&next);
        }
        trace!(stage = ?Stage::ActionBind, bound = self.actuator.is_some());

        // Stage 7: `next` is now the authoritative output of this tick.
        trace!(stage = ?Stage::StateCommit);

        // Stage 8: tick closed; control returns to the caller, whose
        // telemetry wraps the whole sequence.
        self.ticks += 1;
        trace!(stage = ?Stage::SealTick);

        TickReceipt {
            matrix: next,
            exec_hash,
            rules_fired,
            triggers_seen,
            paths_live,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::DeployError;
    use std::sync::Mutex;

    fn compile(text: &str) -> RuleSet {
        let out = causeway_dsl::compile(text);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        out.rules
    }

    #[test]
    fn stages_are_ordered() {
        for pair in Stage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Stage::ALL.len(), 8);
    }

    #[test]
    fn input_matrix_is_never_mutated() {
        let rules = compile("ACTOR 0 BIT 0 SET\nACTOR 1 BIT 5 SET");
        let matrix = ActorMatrix::new(2);
        let before = matrix.clone();

        let mut engine = TickEngine::new();
        let receipt = engine.execute(&matrix, &rules);

        assert_eq!(matrix, before);
        assert!(receipt.matrix.get_bit(0, 0));
        assert!(receipt.matrix.get_bit(1, 5));
    }

    #[test]
    fn execution_is_deterministic() {
        let rules = compile(
            "ACTOR 0 BIT 0 SET\n\
             IF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 1 SET\n\
             IF ACTOR 1 BIT 1 OR ACTOR 2 BIT 0 THEN ACTOR 2 BIT 3 CLEAR",
        );
        let mut matrix = ActorMatrix::new(3);
        matrix.set_bit(2, 3);

        let mut engine = TickEngine::new();
        let a = engine.execute(&matrix, &rules);
        let b = engine.execute(&matrix, &rules);

        assert_eq!(a.matrix, b.matrix);
        assert_eq!(a.exec_hash, b.exec_hash);
        assert_eq!(a.rules_fired, b.rules_fired);
    }

    #[test]
    fn later_rules_observe_earlier_effects() {
        // The second rule's condition only holds because the first rule
        // fired earlier in the same tick.
        let rules = compile("ACTOR 0 BIT 0 SET\nIF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 1 SET");
        let matrix = ActorMatrix::new(2);

        let mut engine = TickEngine::new();
        let receipt = engine.execute(&matrix, &rules);

        assert_eq!(receipt.matrix.actor(0), 0x01);
        assert_eq!(receipt.matrix.actor(1), 0x02);
        assert_eq!(receipt.rules_fired, 2);
        // Nothing held on the input matrix except the unconditional rule.
        assert!(receipt.paths_live);
        assert!(!receipt.triggers_seen);
    }

    #[test]
    fn conjunction_requires_both_bits() {
        let rules = compile("IF ACTOR 0 BIT 0 AND ACTOR 0 BIT 1 THEN ACTOR 1 BIT 2 SET");

        // Only bit 0: the action must not fire.
        let mut matrix = ActorMatrix::new(2);
        matrix.set_bit(0, 0);
        let mut engine = TickEngine::new();
        let receipt = engine.execute(&matrix, &rules);
        assert_eq!(receipt.matrix.actor(1), 0x00);
        assert_eq!(receipt.rules_fired, 0);

        // Bits 0 and 1: the action fires.
        matrix.set_bit(0, 1);
        let receipt = engine.execute(&matrix, &rules);
        assert_eq!(receipt.matrix.actor(0), 0x03);
        assert_eq!(receipt.matrix.actor(1), 0x04);
        assert_eq!(receipt.rules_fired, 1);
    }

    #[test]
    fn exec_hash_matches_rule_set_fingerprint() {
        let rules = compile(
            "ACTOR 0 BIT 0 SET\n\
             IF ACTOR 0 BIT 0 AND ACTOR 1 BIT 0 THEN ACTOR 1 BIT 1 CLEAR",
        );
        let matrix = ActorMatrix::new(2);

        let mut engine = TickEngine::new();
        let receipt = engine.execute(&matrix, &rules);

        // Execution saw the full, consistent rule set.
        assert_eq!(receipt.exec_hash, rules.spec_hash());
    }

    #[test]
    fn empty_rule_set_is_a_quiet_tick() {
        let rules = RuleSet::new();
        let mut matrix = ActorMatrix::new(2);
        matrix.set_bit(0, 7);

        let mut engine = TickEngine::new();
        let receipt = engine.execute(&matrix, &rules);

        assert_eq!(receipt.matrix, matrix);
        assert_eq!(receipt.rules_fired, 0);
        assert!(receipt.triggers_seen);
        assert!(!receipt.paths_live);
        assert_eq!(receipt.exec_hash, rules.spec_hash());
    }

    #[test]
    fn actuator_sees_post_collapse_state() {
        use std::sync::Arc;

        struct Probe(Arc<Mutex<Vec<u64>>>);
        impl Actuator for Probe {
            fn actuate(&self, matrix: &ActorMatrix) {
                self.0.lock().unwrap().push(matrix.actor(0));
            }
        }

        let rules = compile("ACTOR 0 BIT 4 SET");
        let matrix = ActorMatrix::new(1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut engine = TickEngine::with_actuator(Box::new(Probe(seen.clone())));

        let receipt = engine.execute(&matrix, &rules);
        assert_eq!(receipt.matrix.actor(0), 1 << 4);
        // The actuator observed the post-collapse value, once.
        assert_eq!(*seen.lock().unwrap(), vec![1 << 4]);
    }

    #[test]
    fn deploy_rejects_out_of_bounds_rules() {
        let rules = compile("ACTOR 9 BIT 0 SET");
        let err = TickEngine::deploy(4, &rules).unwrap_err();
        assert_eq!(
            err,
            EngineError::Precondition(DeployError::ActorOutOfBounds {
                rule_no: 0,
                actor: 9,
                capacity: 4
            })
        );
        assert!(TickEngine::deploy(10, &rules).is_ok());
    }

    #[test]
    fn tick_counter_advances() {
        let rules = RuleSet::new();
        let matrix = ActorMatrix::new(1);
        let mut engine = TickEngine::new();
        assert_eq!(engine.ticks(), 0);
        engine.execute(&matrix, &rules);
        engine.execute(&matrix, &rules);
        assert_eq!(engine.ticks(), 2);
    }
}
