//! Stable hashing for rule fingerprints and span hashes.
//!
//! Rule-set fingerprints and per-tick execution hashes must be a
//! deterministic consequence of explicit inputs, identical across runs and
//! platforms. These helpers provide a stable FNV-1a 64-bit implementation.
//!
//! NOTE: FNV-1a is **not** cryptographically secure. It is a divergence
//! detector, not an integrity mechanism.

/// 64-bit FNV-1a offset basis.
pub const FNV1A_OFFSET_BASIS_64: u64 = 0xcbf29ce484222325;
/// 64-bit FNV-1a prime.
pub const FNV1A_PRIME_64: u64 = 0x0000_0100_0000_01B3;

/// Mix bytes into an existing FNV-1a 64-bit hash state.
///
/// Use [`FNV1A_OFFSET_BASIS_64`] as the state for a fresh hash.
#[inline]
pub const fn fnv1a64_mix(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0usize;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV1A_PRIME_64);
        i += 1;
    }
    hash
}

/// Hash an arbitrary byte slice with FNV-1a 64-bit.
#[inline]
pub const fn fnv1a64(bytes: &[u8]) -> u64 {
    fnv1a64_mix(FNV1A_OFFSET_BASIS_64, bytes)
}

/// Mix a `u64` into the hash state, little-endian.
///
/// Used to fold rule encodings into spec/exec hashes one record at a time.
#[inline]
pub const fn fnv1a64_u64(hash: u64, value: u64) -> u64 {
    fnv1a64_mix(hash, &value.to_le_bytes())
}
