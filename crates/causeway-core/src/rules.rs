//! Compiled rule model.
//!
//! Rules are produced by the `causeway-dsl` compiler and are immutable
//! afterwards. A [`RuleSet`] preserves source order, and source order is
//! evaluation order within a tick: later rules observe the side effects of
//! earlier rules in the same tick. That ordering is part of the engine's
//! reproducibility contract.
//!
//! A rule whose condition bits no signal path currently reaches is simply
//! dormant - it stays compiled and evaluated, and activates the moment
//! the matrix state satisfies it.

use causeway_foundation::{FNV1A_OFFSET_BASIS_64, fnv1a64_u64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matrix::{ACTOR_BITS, ActorMatrix};

/// A single bit within the matrix: actor index plus bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitRef {
    pub actor: usize,
    pub bit: u8,
}

impl BitRef {
    pub fn new(actor: usize, bit: u8) -> Self {
        debug_assert!(bit < ACTOR_BITS);
        Self { actor, bit }
    }

    #[inline]
    fn test(&self, matrix: &ActorMatrix) -> bool {
        matrix.get_bit(self.actor, self.bit)
    }
}

/// What an action does to its target bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitOp {
    Set,
    Clear,
}

/// The effect side of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitAction {
    pub target: BitRef,
    pub op: BitOp,
}

impl BitAction {
    #[inline]
    pub fn apply(&self, matrix: &mut ActorMatrix) {
        match self.op {
            BitOp::Set => matrix.set_bit(self.target.actor, self.target.bit),
            BitOp::Clear => matrix.clear_bit(self.target.actor, self.target.bit),
        }
    }
}

/// Condition over at most two bit terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// Unconditional: the action always fires.
    Always,
    /// Fires iff the referenced bit is set.
    Single(BitRef),
    /// Fires iff both referenced bits are set.
    And(BitRef, BitRef),
    /// Fires iff at least one referenced bit is set.
    Or(BitRef, BitRef),
}

impl Condition {
    /// Evaluate against the current (possibly mid-collapse) matrix.
    #[inline]
    pub fn holds(&self, matrix: &ActorMatrix) -> bool {
        match self {
            Condition::Always => true,
            Condition::Single(a) => a.test(matrix),
            Condition::And(a, b) => a.test(matrix) && b.test(matrix),
            Condition::Or(a, b) => a.test(matrix) || b.test(matrix),
        }
    }
}

/// One compiled rule: condition plus action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRule {
    pub condition: Condition,
    pub action: BitAction,
}

impl CompiledRule {
    /// Fold this rule's stable encoding into an FNV-1a hash state.
    ///
    /// The same folding is used for a rule set's expected fingerprint and
    /// for the hash accumulated during execution, so the two agree exactly
    /// when execution observed the full, consistent rule set.
    pub fn fold_hash(&self, hash: u64) -> u64 {
        let (kind, terms): (u64, [(usize, u8); 2]) = match self.condition {
            Condition::Always => (0, [(0, 0), (0, 0)]),
            Condition::Single(a) => (1, [(a.actor, a.bit), (0, 0)]),
            Condition::And(a, b) => (2, [(a.actor, a.bit), (b.actor, b.bit)]),
            Condition::Or(a, b) => (3, [(a.actor, a.bit), (b.actor, b.bit)]),
        };
        let mut h = fnv1a64_u64(hash, kind);
        for (actor, bit) in terms {
            h = fnv1a64_u64(h, actor as u64);
            h = fnv1a64_u64(h, bit as u64);
        }
        h = fnv1a64_u64(h, self.action.target.actor as u64);
        h = fnv1a64_u64(h, self.action.target.bit as u64);
        fnv1a64_u64(h, matches!(self.action.op, BitOp::Set) as u64)
    }

    fn actor_refs(&self) -> impl Iterator<Item = usize> {
        let (a, b) = match self.condition {
            Condition::Always => (None, None),
            Condition::Single(x) => (Some(x.actor), None),
            Condition::And(x, y) | Condition::Or(x, y) => (Some(x.actor), Some(y.actor)),
        };
        a.into_iter()
            .chain(b)
            .chain(std::iter::once(self.action.target.actor))
    }
}

/// Deploy-time validation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeployError {
    #[error("rule {rule_no}: actor index {actor} out of bounds for capacity {capacity}")]
    ActorOutOfBounds {
        rule_no: usize,
        actor: usize,
        capacity: usize,
    },
}

/// Ordered, growable collection of compiled rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: CompiledRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    /// Expected-execution fingerprint: every rule folded in source order.
    ///
    /// Telemetry compares this against the hash accumulated during the
    /// tick; XOR of the two is the causal hash delta.
    pub fn spec_hash(&self) -> u64 {
        self.rules
            .iter()
            .fold(FNV1A_OFFSET_BASIS_64, |h, r| r.fold_hash(h))
    }

    /// Check every referenced actor index against a matrix capacity.
    ///
    /// This runs once at deploy time. Tick-time evaluation assumes it
    /// passed and performs no per-access bounds handling beyond the
    /// slice's own.
    pub fn validate(&self, capacity: usize) -> Result<(), DeployError> {
        for (rule_no, rule) in self.rules.iter().enumerate() {
            for actor in rule.actor_refs() {
                if actor >= capacity {
                    return Err(DeployError::ActorOutOfBounds {
                        rule_no,
                        actor,
                        capacity,
                    });
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<CompiledRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = CompiledRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
