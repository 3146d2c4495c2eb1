//! Signal injection.
//!
//! External events arrive as names; a [`SignalMap`] binds each name to the
//! trigger bits it raises in the matrix before a tick runs. Binding order
//! is preserved so injection is deterministic.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::trace;

use crate::matrix::ActorMatrix;
use crate::rules::BitRef;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InjectError {
    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("signal {signal}: trigger actor {actor} out of bounds for capacity {capacity}")]
    TriggerOutOfBounds {
        signal: String,
        actor: usize,
        capacity: usize,
    },
}

/// Named external events mapped onto trigger bits.
#[derive(Debug, Clone, Default)]
pub struct SignalMap {
    bindings: IndexMap<String, Vec<BitRef>>,
}

impl SignalMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trigger binding for a signal name. A name may carry
    /// several bindings; all of them are raised on injection.
    pub fn bind(&mut self, name: impl Into<String>, trigger: BitRef) {
        self.bindings.entry(name.into()).or_default().push(trigger);
    }

    pub fn triggers(&self, name: &str) -> Option<&[BitRef]> {
        self.bindings.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Raise every trigger bit bound to `name`.
    ///
    /// Unknown names and out-of-bounds triggers are surfaced to the
    /// caller; the matrix is untouched on error.
    pub fn inject(&self, matrix: &mut ActorMatrix, name: &str) -> Result<(), InjectError> {
        let triggers = self
            .bindings
            .get(name)
            .ok_or_else(|| InjectError::UnknownSignal(name.to_string()))?;

        for t in triggers {
            if t.actor >= matrix.len() {
                return Err(InjectError::TriggerOutOfBounds {
                    signal: name.to_string(),
                    actor: t.actor,
                    capacity: matrix.len(),
                });
            }
        }

        for t in triggers {
            trace!(signal = name, actor = t.actor, bit = t.bit, "trigger raised");
            matrix.set_bit(t.actor, t.bit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_raises_all_bound_triggers() {
        let mut map = SignalMap::new();
        map.bind("pulse", BitRef::new(0, 0));
        map.bind("pulse", BitRef::new(1, 3));

        let mut m = ActorMatrix::new(2);
        map.inject(&mut m, "pulse").unwrap();

        assert!(m.get_bit(0, 0));
        assert!(m.get_bit(1, 3));
    }

    #[test]
    fn unknown_signal_is_an_error() {
        let map = SignalMap::new();
        let mut m = ActorMatrix::new(1);
        assert_eq!(
            map.inject(&mut m, "nope"),
            Err(InjectError::UnknownSignal("nope".to_string()))
        );
        assert!(!m.any_bit_set());
    }

    #[test]
    fn out_of_bounds_trigger_leaves_matrix_untouched() {
        let mut map = SignalMap::new();
        map.bind("wide", BitRef::new(0, 0));
        map.bind("wide", BitRef::new(7, 0));

        let mut m = ActorMatrix::new(2);
        assert!(map.inject(&mut m, "wide").is_err());
        // First trigger was in bounds, but nothing may be applied on error.
        assert!(!m.any_bit_set());
    }
}
