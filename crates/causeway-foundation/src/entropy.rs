//! Cheap state-entropy summary for drift detection.
//!
//! The telemetry layer compares pre- and post-tick entropy of the actor
//! state; a delta beyond a configured threshold is an anomaly signal. The
//! summary is a rotate-XOR diffusion of the state bytes folded to a
//! population count, so values live in `0..=64` and thresholds stay small
//! integers. It is a drift detector, not a cryptographic digest.

/// Diffuse state bytes into a `0..=64` entropy summary.
///
/// All-zero state yields 0. Identical state always yields an identical
/// summary.
#[inline]
pub fn state_entropy(bytes: &[u8]) -> u64 {
    let mut acc = 0u64;
    for &b in bytes {
        acc = acc.rotate_left(7) ^ (b as u64);
    }
    acc.count_ones() as u64
}

/// Entropy summary over `u64` words, little-endian byte order.
#[inline]
pub fn state_entropy_words(words: &[u64]) -> u64 {
    let mut acc = 0u64;
    for &w in words {
        for b in w.to_le_bytes() {
            acc = acc.rotate_left(7) ^ (b as u64);
        }
    }
    acc.count_ones() as u64
}
