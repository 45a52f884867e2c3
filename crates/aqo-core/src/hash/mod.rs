//! Constant-insensitive, order-insensitive hashing of expression trees,
//! clause lists, and relation sets.
//!
//! Ported from `hash.c`. The original hashes a canonicalized string
//! rendering of each expression node via PostgreSQL's `hash_any`; this
//! crate's input is already a typed tree (see [`expr::Expr`]), so
//! constants and source-location metadata are stripped at the type level
//! instead of by string surgery, and the byte hash itself is FNV-1a
//! rather than `hash_any`; both are translations of the same algorithm,
//! not behavior changes. The property under test (stability, and
//! permutation-invariance) is preserved; bit-for-bit parity with the
//! original's hash values is not a goal.

pub mod expr;
pub mod fss;

pub use expr::Expr;
pub use fss::{
    clause_hash, fss_for_object, grouping_hash, ClauseInput, EquivalenceClass, FeatureSubspace,
    RelationSignature,
};

/// 32-bit hash type used throughout, matching the original's `int` hash
/// values (`fss`, clause hashes, relation signatures).
pub type Hash32 = i32;

/// Deterministic FNV-1a hash of a byte string, the crate's substitute for
/// PostgreSQL's `hash_any`.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> Hash32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as i32
}

/// Hashes an array of 32-bit hashes together (`get_int_array_hash`): the
/// slice's little-endian byte representation is hashed as one string.
#[must_use]
pub fn hash_int_array(values: &[Hash32]) -> Hash32 {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    hash_bytes(&bytes)
}

/// Hashes an array of hashes after sorting a copy of it
/// (`get_unsorted_unsafe_int_array_hash`), making the result
/// order-insensitive.
#[must_use]
pub fn hash_unordered_int_array(values: &[Hash32]) -> Hash32 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    hash_int_array(&sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_hash_is_permutation_invariant() {
        let a = [3, 1, 2];
        let b = [2, 3, 1];
        assert_eq!(hash_unordered_int_array(&a), hash_unordered_int_array(&b));
    }

    #[test]
    fn ordered_hash_is_order_sensitive() {
        let a = [1, 2, 3];
        let b = [3, 2, 1];
        assert_ne!(hash_int_array(&a), hash_int_array(&b));
    }
}
