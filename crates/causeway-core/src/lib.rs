//! Core data model for the Causeway engine.
//!
//! The entire mutable state of one engine instance is an [`ActorMatrix`]:
//! a fixed-capacity sequence of bit-vector actors. A [`RuleSet`] holds the
//! compiled rules that mutate it, and a [`SignalMap`] binds named external
//! events to the trigger bits they raise before a tick.
//!
//! Bounds between rules and a deployed matrix are checked once, at deploy
//! time ([`RuleSet::validate`]); tick-time bit operations assume validated
//! indices and stay branch-minimal.

pub mod matrix;
pub mod rules;
pub mod signal;

pub use matrix::ActorMatrix;
pub use rules::{BitAction, BitOp, BitRef, CompiledRule, Condition, DeployError, RuleSet};
pub use signal::{InjectError, SignalMap};
