//! Stable hashing utilities for deterministic identifiers.
//!
//! Task identifiers must be reproducible from explicit inputs (owning account,
//! invoked message, submission sequence) so that a task snapshot written by one
//! worker names the same task when it is thawed by another. These helpers
//! provide a stable FNV-1a 64-bit implementation for that purpose.
//!
//! NOTE: FNV-1a is **not** cryptographically secure. Signing and notarization
//! of documents live outside the virtual machine.

/// 64-bit FNV-1a offset basis.
pub const FNV1A_OFFSET_BASIS_64: u64 = 0xcbf29ce484222325;
/// 64-bit FNV-1a prime.
pub const FNV1A_PRIME_64: u64 = 0x0000_0100_0000_01B3;

/// Mix bytes into an existing FNV-1a 64-bit hash state.
///
/// For each byte, XOR it into the hash and multiply by the FNV prime.
///
/// # Example
/// ```
/// use tessera_foundation::stable_hash::{fnv1a64_mix, FNV1A_OFFSET_BASIS_64};
///
/// let hash = FNV1A_OFFSET_BASIS_64;
/// let hash = fnv1a64_mix(hash, b"account");
/// let hash = fnv1a64_mix(hash, b"message");
/// ```
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

/// Hash a UTF-8 string with FNV-1a 64-bit.
#[inline]
pub const fn fnv1a64_str(s: &str) -> u64 {
    fnv1a64(s.as_bytes())
}

/// Hash a document name given as segments, as if rendered `/a/b/c`.
///
/// ```
/// # use tessera_foundation::stable_hash::{fnv1a64_name, fnv1a64_str};
/// assert_eq!(fnv1a64_name(&["tessera", "bags"]), fnv1a64_str("/tessera/bags"));
/// ```
#[inline]
pub const fn fnv1a64_name(segments: &[&str]) -> u64 {
    let mut h = FNV1A_OFFSET_BASIS_64;
    let mut i = 0usize;
    while i < segments.len() {
        h = fnv1a64_mix(h, b"/");
        h = fnv1a64_mix(h, segments[i].as_bytes());
        i += 1;
    }
    h
}
