//! Memo table for point counts, keyed by system shape.
//!
//! ## Canonical form
//!
//! Systems reaching the cache are nonlinear and support-restricted.
//! Before lookup, the system is put in canonical form: polynomials
//! sorted, variables ordered by their per-equation degree vectors and
//! relabeled `X0, X1, ...`, then sorted again. The degree-vector matrix
//! also yields a 64-bit fingerprint used to bucket rows.
//!
//! A hit requires the fingerprint *and* the canonical system to match.
//! The fingerprint alone is a conservative filter: it may reject
//! systems a stronger equivalence would identify, but two differing
//! systems never share one row.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::canonical::canonical_hash;
use crate::symbolic::{parse_expr, Monomial, ParseError, Poly, Var};

/// Bumped whenever the persisted layout or canonical form changes.
pub const COUNT_CACHE_SCHEMA_VERSION: u32 = 1;

/// Errors while persisting or restoring the cache.
#[derive(Debug, Error)]
pub enum CacheIoError {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Malformed JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The file was written by an incompatible version.
    #[error("cache schema {found} does not match expected {expected}")]
    SchemaMismatch {
        /// Schema found in the file.
        found: u32,
        /// Schema this build writes.
        expected: u32,
    },
    /// A persisted polynomial no longer parses.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Shape of a counted system: ambient dimension, number of equations,
/// number of distinct variables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CacheKey {
    /// Ambient affine dimension the count was taken in.
    pub dimension: usize,
    /// Number of equations.
    pub equations: usize,
    /// Number of distinct variables in the system.
    pub variables: usize,
}

impl CacheKey {
    /// Key for a support-restricted system.
    pub fn for_system(dimension: usize, system: &[Poly]) -> Self {
        let variables = system
            .iter()
            .flat_map(|p| p.variables())
            .collect::<BTreeSet<_>>()
            .len();
        CacheKey {
            dimension,
            equations: system.len(),
            variables,
        }
    }
}

/// A system in canonical variables, with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSystem {
    /// Relabeled, sorted polynomials.
    pub polys: Vec<Poly>,
    /// Hash of the sorted degree-vector matrix.
    pub fingerprint: u64,
}

/// Puts a system in canonical form.
///
/// Variables are ordered by their degree vectors across the sorted
/// system (ties broken by name) and renamed `X0, X1, ...`; the rename
/// is simultaneous, so clashes with original names cannot occur.
pub fn canonicalize(system: &[Poly]) -> CanonicalSystem {
    let mut sorted: Vec<Poly> = system.to_vec();
    sorted.sort();

    let variables: BTreeSet<Var> = sorted.iter().flat_map(|p| p.variables()).collect();
    let mut keyed: Vec<(Vec<i64>, Var)> = variables
        .into_iter()
        .map(|v| {
            let degrees = sorted.iter().map(|p| p.degree_in(&v)).collect();
            (degrees, v)
        })
        .collect();
    keyed.sort();

    let matrix: Vec<&Vec<i64>> = keyed.iter().map(|(d, _)| d).collect();
    let fingerprint = canonical_hash(&matrix);

    let images: BTreeMap<Var, Monomial> = keyed
        .iter()
        .enumerate()
        .map(|(i, (_, v))| {
            let fresh = Var::new(format!("X{i}"));
            (v.clone(), Monomial::from_exponents([(fresh, 1)]))
        })
        .collect();

    let mut polys: Vec<Poly> = sorted
        .iter()
        .map(|p| p.substitute_monomials(&images))
        .collect();
    polys.sort();

    CanonicalSystem { polys, fingerprint }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheRow {
    fingerprint: u64,
    system: Vec<Poly>,
    count: Poly,
}

#[derive(Serialize, Deserialize)]
struct PersistedRow {
    fingerprint: u64,
    system: Vec<String>,
    count: String,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    key: CacheKey,
    rows: Vec<PersistedRow>,
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    schema: u32,
    entries: Vec<PersistedEntry>,
}

/// The memo table. An explicit value threaded through call sites; no
/// process-global state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountCache {
    entries: BTreeMap<CacheKey, Vec<CacheRow>>,
}

impl CountCache {
    /// An empty cache.
    pub fn new() -> Self {
        CountCache::default()
    }

    /// Number of stored rows across all keys.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every row.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Finds a stored count for the canonicalized system.
    pub fn lookup(&self, key: &CacheKey, canonical: &CanonicalSystem) -> Option<Poly> {
        let rows = self.entries.get(key)?;
        rows.iter()
            .find(|row| row.fingerprint == canonical.fingerprint && row.system == canonical.polys)
            .map(|row| {
                debug!(?key, fingerprint = row.fingerprint, "count cache hit");
                row.count.clone()
            })
    }

    /// Stores a count, replacing any row for the same canonical system.
    pub fn insert(&mut self, key: CacheKey, canonical: CanonicalSystem, count: Poly) {
        let rows = self.entries.entry(key).or_default();
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.fingerprint == canonical.fingerprint && row.system == canonical.polys)
        {
            row.count = count;
            return;
        }
        rows.push(CacheRow {
            fingerprint: canonical.fingerprint,
            system: canonical.polys,
            count,
        });
    }

    /// Writes the cache as JSON, polynomials in display form.
    pub fn save(&self, path: &Path) -> Result<(), CacheIoError> {
        let persisted = PersistedCache {
            schema: COUNT_CACHE_SCHEMA_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(key, rows)| PersistedEntry {
                    key: *key,
                    rows: rows
                        .iter()
                        .map(|row| PersistedRow {
                            fingerprint: row.fingerprint,
                            system: row.system.iter().map(Poly::to_string).collect(),
                            count: row.count.to_string(),
                        })
                        .collect(),
                })
                .collect(),
        };
        fs::write(path, serde_json::to_vec_pretty(&persisted)?)?;
        Ok(())
    }

    /// Restores a cache written by [`CountCache::save`].
    pub fn load(path: &Path) -> Result<Self, CacheIoError> {
        let persisted: PersistedCache = serde_json::from_slice(&fs::read(path)?)?;
        if persisted.schema != COUNT_CACHE_SCHEMA_VERSION {
            return Err(CacheIoError::SchemaMismatch {
                found: persisted.schema,
                expected: COUNT_CACHE_SCHEMA_VERSION,
            });
        }
        let mut entries = BTreeMap::new();
        for entry in persisted.entries {
            let mut rows = Vec::with_capacity(entry.rows.len());
            for row in entry.rows {
                rows.push(CacheRow {
                    fingerprint: row.fingerprint,
                    system: row
                        .system
                        .iter()
                        .map(|s| parse_expr(s))
                        .collect::<Result<_, _>>()?,
                    count: parse_expr(&row.count)?,
                });
            }
            entries.insert(entry.key, rows);
        }
        Ok(CountCache { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly(text: &str) -> Poly {
        parse_expr(text).unwrap()
    }

    #[test]
    fn test_canonical_form_forgets_names() {
        let left = canonicalize(&[poly("a^2*b - 1")]);
        let right = canonicalize(&[poly("x^2*y - 1")]);
        assert_eq!(left, right);
        assert_eq!(left.polys, vec![poly("X1^2*X0 - 1")]);
    }

    #[test]
    fn test_different_shapes_get_different_fingerprints() {
        let a = canonicalize(&[poly("x^2*y - 1")]);
        let b = canonicalize(&[poly("x^3*y - 1")]);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_lookup_needs_exact_canonical_match() {
        let mut cache = CountCache::new();
        let key = CacheKey::for_system(2, &[poly("x^2*y - 1")]);
        cache.insert(key, canonicalize(&[poly("x^2*y - 1")]), poly("p - 1"));

        assert_eq!(
            cache.lookup(&key, &canonicalize(&[poly("u^2*v - 1")])),
            Some(poly("p - 1"))
        );
        assert_eq!(cache.lookup(&key, &canonicalize(&[poly("x^3*y - 1")])), None);
    }

    #[test]
    fn test_round_trip_through_disk() {
        let mut cache = CountCache::new();
        let key = CacheKey::for_system(2, &[poly("x*y - 1")]);
        cache.insert(key, canonicalize(&[poly("x*y - 1")]), poly("p - 1"));

        let path = std::env::temp_dir().join(format!(
            "zeta-atlas-cache-{}-{:x}.json",
            std::process::id(),
            cache.len()
        ));
        cache.save(&path).unwrap();
        let restored = CountCache::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(restored, cache);
    }

    #[test]
    fn test_schema_mismatch_is_reported() {
        let path = std::env::temp_dir().join(format!(
            "zeta-atlas-badschema-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, br#"{"schema": 999, "entries": []}"#).unwrap();
        let err = CountCache::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(
            err,
            CacheIoError::SchemaMismatch {
                found: 999,
                expected: COUNT_CACHE_SCHEMA_VERSION
            }
        ));
    }
}
