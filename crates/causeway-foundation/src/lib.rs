//! Foundation primitives shared across the Causeway workspace.
//!
//! Everything here is deterministic: derived hashes and entropy summaries
//! are pure functions of their inputs, and the clock is behind a trait so
//! tests can control time explicitly.

pub mod clock;
pub mod entropy;
pub mod stable_hash;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use entropy::{state_entropy, state_entropy_words};
pub use stable_hash::{FNV1A_OFFSET_BASIS_64, FNV1A_PRIME_64, fnv1a64, fnv1a64_mix, fnv1a64_u64};
