//! Canonical serialization for deterministic fingerprints.
//!
//! Point-count cache keys and system fingerprints must be identical
//! across runs and across machines, or persisted caches would silently
//! stop matching.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable Vec order: vectors serialize in index order
//! - No HashMap allowed: use BTreeMap for maps in hashed data
//! - Degree vectors are sorted by the caller before hashing

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// This function produces deterministic output for the same input,
/// suitable for fingerprint computation and cache persistence.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_vectors_hash_deterministically() {
        let degrees: Vec<Vec<i64>> = vec![vec![0, 2, 1], vec![1, 0, 3]];
        let h1 = canonical_hash(&degrees);
        let h2 = canonical_hash(&degrees);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_different_systems_hash_differently() {
        let a: Vec<Vec<i64>> = vec![vec![0, 2, 1]];
        let b: Vec<Vec<i64>> = vec![vec![0, 2, 2]];
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn test_hex_form_is_fixed_width() {
        let hex = canonical_hash_hex(&vec![1u64, 2, 3]);
        assert_eq!(hex.len(), 16);
    }
}
