//! # zeta-atlas
//!
//! Local zeta functions from blow-up atlases.
//!
//! The crate answers one question:
//!
//! > Given the resolution data of a singular variety, what is the local
//! > zeta function `Z(p, t)` of the integral it defines?
//!
//! ## Core Contract
//!
//! 1. Load an atlas: the blow-up tree, one chart per leaf, and the
//!    intersection lattice of each chart's exceptional divisors
//! 2. Split every non-monomial chart into monomial subcharts along its
//!    lattice strata, weighting each by a p-rational point count
//! 3. Integrate each monomial piece over its valuation cone and sum the
//!    results into a single rational function in `p` and `t`
//!
//! ## Architecture
//!
//! ```text
//! Edges + Chart payloads → Atlas → Monomialize → GeneratingFunctionAssembler → Z(p, t)
//!            ↓                          ↓
//!      AlgebraEngine            PointCounter (cache → toric → oracle)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Keyed collections are `BTreeMap`/`BTreeSet`; nothing iterates in
//!   hash order
//! - Point-count cache keys are canonical JSON hashes, stable across
//!   runs and machines
//! - The only randomized step, substitution-order search, is seedable

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod symbolic;
pub mod types;
pub mod canonical;
pub mod counting;
pub mod edges;
pub mod engine;
pub mod monomialize;
pub mod genfun;
pub mod atlas;
pub mod reference;

// Re-exports
pub use symbolic::{
    factor_poly, fresh_names, parse_expr, parse_factored, parse_ring, Factored, Factorizer,
    MixedRadix, Monomial, Poly, QMatrix, RatFn, SymbolicError, Var,
};
pub use types::{
    ring_printout, Chart, ChartId, ConeCondition, Integrand, IntegrandError, IntersectionLattice,
    LatticeError, QuasiMonomial, TermExponents, Vertex,
};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use counting::{
    canonicalize, CacheKey, CanonicalSystem, CountCache, CountError, CountOracle, OracleReply,
    PointCounter, QueueOracle, ScriptedToric, StdinOracle, ToricCounter, ToricOutcome,
    COUNT_CACHE_SCHEMA_VERSION,
};
pub use edges::{parse_edges, EdgeError, EdgeGraph};
pub use engine::{
    load_chart, AlgebraEngine, ChartPayload, EngineError, LatticePayload, LoadError,
    ScriptedEngine,
};
pub use monomialize::{subcharts, MonomializeError};
pub use genfun::{
    ConeMatrix, ConeSolver, GenFunError, GeneratingFunctionAssembler, Series, SolverError,
    SubstitutionSolver,
};
pub use atlas::{build_root_integrand, map_integrand, Atlas, AtlasError, RootConvention};
pub use reference::{matches_reference, reference_zeta};

/// Name of the symbol standing for the residue field size.
pub const FIELD_SIZE_SYMBOL: &str = "p";

/// Name of the twist symbol standing for `p^(-s)`.
pub const TWIST_SYMBOL: &str = "t";

/// The field-size symbol as a variable.
pub fn field_var() -> Var {
    Var::new(FIELD_SIZE_SYMBOL)
}

/// The twist symbol as a variable.
pub fn twist_var() -> Var {
    Var::new(TWIST_SYMBOL)
}
