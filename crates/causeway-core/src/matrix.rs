//! Actor matrix storage.
//!
//! An actor is a 64-bit vector; its identity is its index in the matrix.
//! The matrix is created with a fixed capacity and never grows. Cloning is
//! a deep copy so a tick can diff its input against its output for
//! entropy and hash measurement.

use causeway_foundation::state_entropy_words;
use serde::{Deserialize, Serialize};

/// Bit width of a single actor.
pub const ACTOR_BITS: u8 = 64;

/// Fixed-capacity sequence of bit-vector actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorMatrix {
    actors: Vec<u64>,
}

impl ActorMatrix {
    /// Create a matrix of `capacity` zeroed actors.
    pub fn new(capacity: usize) -> Self {
        Self {
            actors: vec![0; capacity],
        }
    }

    /// Number of actors. Equals the creation capacity.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Test a single bit. O(1).
    ///
    /// `idx` must be `< len()`; rule indices are validated at deploy time,
    /// not here.
    #[inline]
    pub fn get_bit(&self, idx: usize, pos: u8) -> bool {
        debug_assert!(pos < ACTOR_BITS);
        self.actors[idx] & (1u64 << pos) != 0
    }

    /// Set a single bit. O(1).
    #[inline]
    pub fn set_bit(&mut self, idx: usize, pos: u8) {
        debug_assert!(pos < ACTOR_BITS);
        self.actors[idx] |= 1u64 << pos;
    }

    /// Clear a single bit. O(1).
    #[inline]
    pub fn clear_bit(&mut self, idx: usize, pos: u8) {
        debug_assert!(pos < ACTOR_BITS);
        self.actors[idx] &= !(1u64 << pos);
    }

    /// Full bit pattern of one actor.
    #[inline]
    pub fn actor(&self, idx: usize) -> u64 {
        self.actors[idx]
    }

    /// Raw word view, used for entropy and hash measurement.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.actors
    }

    /// True if any bit anywhere in the matrix is set.
    #[inline]
    pub fn any_bit_set(&self) -> bool {
        self.actors.iter().any(|w| *w != 0)
    }

    /// Entropy summary of the current state (`0..=64`).
    pub fn entropy(&self) -> u64 {
        state_entropy_words(&self.actors)
    }

    /// Zero every actor, keeping capacity.
    pub fn reset(&mut self) {
        self.actors.fill(0);
    }
}
