//! Rational point counting over the residue field.
//!
//! ## Strategy chain
//!
//! Counts are produced by the first strategy that applies, in order:
//!
//! 1. no equations left: the whole affine space, `p^dim`;
//! 2. pure linear system: row-reduce, `p^(dim - rank)`;
//! 3. linear and nonlinear mixed: substitute the row-reduced linear
//!    solutions into the nonlinear part and recurse, restoring a
//!    `p` power for every variable the elimination freed;
//! 4. independent binomial system: closed form
//!    `(p-1)^(vars-eqns) * p^(dim-vars)`;
//! 5. memo table of earlier counts, keyed by canonical form;
//! 6. the optional toric backend;
//! 7. the oracle, or a deterministic placeholder symbol when nobody
//!    answers.
//!
//! Placeholders are named from the caller's label, so a rerun without
//! any cache still produces the same symbols.

pub mod cache;
pub mod oracle;
pub mod toric;

pub use cache::{
    canonicalize, CacheIoError, CacheKey, CanonicalSystem, CountCache,
    COUNT_CACHE_SCHEMA_VERSION,
};
pub use oracle::{CountOracle, OracleReply, QueueOracle, StdinOracle};
pub use toric::{ScriptedToric, ToricCounter, ToricOutcome};

use std::collections::{BTreeMap, BTreeSet};

use num_rational::BigRational;
use num_traits::Zero;
use thiserror::Error;
use tracing::{debug, warn};

use crate::field_var;
use crate::symbolic::{parse_expr, Poly, QMatrix, SymbolicError, Var};
use crate::types::ring_printout;

/// Errors in the counting chain. External-strategy failures are not
/// errors; they fall through to the next strategy.
#[derive(Debug, Error)]
pub enum CountError {
    /// Arithmetic during linear elimination failed.
    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
}

/// Counts rational points of polynomial systems, with a memo table, an
/// optional toric backend, and an optional oracle of last resort.
pub struct PointCounter {
    cache: CountCache,
    toric: Option<Box<dyn ToricCounter>>,
    oracle: Option<Box<dyn CountOracle>>,
}

impl PointCounter {
    /// A counter over an existing memo table, with no external
    /// strategies attached.
    pub fn new(cache: CountCache) -> Self {
        PointCounter {
            cache,
            toric: None,
            oracle: None,
        }
    }

    /// Attaches a toric backend.
    pub fn with_toric(mut self, toric: Box<dyn ToricCounter>) -> Self {
        self.toric = Some(toric);
        self
    }

    /// Attaches an oracle of last resort.
    pub fn with_oracle(mut self, oracle: Box<dyn CountOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// The memo table.
    pub fn cache(&self) -> &CountCache {
        &self.cache
    }

    /// Mutable access to the memo table, for persistence and resets.
    pub fn cache_mut(&mut self) -> &mut CountCache {
        &mut self.cache
    }

    /// Releases the memo table.
    pub fn into_cache(self) -> CountCache {
        self.cache
    }

    /// Counts the points of `system` inside affine space of the given
    /// dimension. `label` names any placeholder this count may need.
    ///
    /// The result is a polynomial in the field-size symbol, possibly
    /// involving placeholder symbols for strata nobody could count.
    pub fn count(
        &mut self,
        dimension: usize,
        system: &[Poly],
        label: &str,
    ) -> Result<Poly, CountError> {
        let mut normalized: BTreeSet<Poly> = BTreeSet::new();
        for poly in system {
            if poly.is_zero() {
                continue;
            }
            if poly.variables().is_empty() {
                // a nonzero constant equation has no solutions
                return Ok(Poly::zero());
            }
            normalized.insert(poly.clone());
        }
        let system: Vec<Poly> = normalized.into_iter().collect();

        let support: BTreeSet<Var> = system.iter().flat_map(|q| q.variables()).collect();
        if support.len() > dimension {
            warn!(
                variables = support.len(),
                dimension, "system uses more variables than the ambient dimension"
            );
        }
        let free = dimension.saturating_sub(support.len());

        let core = self.count_restricted(support.len(), &system, label)?;
        Ok(core * Poly::var(field_var()).pow_i64(free as i64)?)
    }

    /// The chain proper, on a system already restricted to its support.
    fn count_restricted(
        &mut self,
        dimension: usize,
        system: &[Poly],
        label: &str,
    ) -> Result<Poly, CountError> {
        let p = Poly::var(field_var());
        if system.is_empty() {
            return Ok(p.pow_i64(dimension as i64)?);
        }

        let (linear, nonlinear): (Vec<Poly>, Vec<Poly>) = system
            .iter()
            .cloned()
            .partition(|q| q.total_degree() == 1);

        if !linear.is_empty() {
            let Some((images, rank)) = solve_linear(&linear) else {
                debug!(label, "inconsistent linear system");
                return Ok(Poly::zero());
            };
            if nonlinear.is_empty() {
                debug!(label, rank, "pure linear system");
                return Ok(p.pow_i64((dimension - rank) as i64)?);
            }

            let mut substituted: BTreeSet<Poly> = BTreeSet::new();
            for q in &nonlinear {
                let image = q.substitute(&images)?;
                if image.is_zero() {
                    continue;
                }
                if image.variables().is_empty() {
                    debug!(label, "elimination exposed an inconsistency");
                    return Ok(Poly::zero());
                }
                substituted.insert(image);
            }
            let reduced: Vec<Poly> = substituted.into_iter().collect();
            let support: BTreeSet<Var> = reduced.iter().flat_map(|q| q.variables()).collect();
            let core = self.count_restricted(support.len(), &reduced, label)?;
            // every non-pivot variable the substitution dropped ranges freely
            let freed = dimension - rank - support.len();
            debug!(label, rank, freed, "eliminated linear equations");
            return Ok(core * p.pow_i64(freed as i64)?);
        }

        if let Some(count) = binomial_count(dimension, system)? {
            debug!(label, count = %count, "independent binomial system");
            return Ok(count);
        }

        let key = CacheKey::for_system(dimension, system);
        let canonical = canonicalize(system);
        if let Some(count) = self.cache.lookup(&key, &canonical) {
            return Ok(count);
        }

        let support: Vec<Var> = system
            .iter()
            .flat_map(|q| q.variables())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if let Some(toric) = self.toric.as_mut() {
            match toric.count(&support, system) {
                ToricOutcome::Counted(count) => {
                    debug!(label, count = %count, "toric backend counted");
                    self.cache.insert(key, canonical, count.clone());
                    return Ok(count);
                }
                ToricOutcome::CannotCount => {
                    debug!(label, "toric backend cannot count this system");
                }
                ToricOutcome::Failed(reason) => {
                    warn!(label, %reason, "toric backend failed");
                }
            }
        }

        let prompt = count_prompt(&support, system);
        if let Some(oracle) = self.oracle.as_mut() {
            loop {
                match oracle.ask(&prompt) {
                    OracleReply::Answer(text) => match parse_expr(&text) {
                        Ok(count) => {
                            debug!(label, count = %count, "oracle supplied a count");
                            self.cache.insert(key, canonical.clone(), count.clone());
                            return Ok(count);
                        }
                        Err(err) => {
                            warn!(label, reply = %text, %err, "count reply did not parse, asking again");
                        }
                    },
                    OracleReply::Unknown => {
                        let count = placeholder(label);
                        warn!(label, count = %count, "count declared unknown, storing placeholder");
                        self.cache.insert(key, canonical.clone(), count.clone());
                        return Ok(count);
                    }
                    OracleReply::Silent => break,
                }
            }
        }

        let count = placeholder(label);
        warn!(label, count = %count, "no strategy produced a count, fabricating placeholder");
        Ok(count)
    }
}

/// Row-reduces a consistent linear system into pivot-variable images.
/// `None` means the system has no solutions.
fn solve_linear(linear: &[Poly]) -> Option<(BTreeMap<Var, Poly>, usize)> {
    let columns: Vec<Var> = linear
        .iter()
        .flat_map(|q| q.variables())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let rows: Vec<Vec<BigRational>> = linear
        .iter()
        .map(|q| {
            let mut row: Vec<BigRational> =
                columns.iter().map(|v| linear_coefficient(q, v)).collect();
            row.push(-q.constant_term());
            row
        })
        .collect();

    let (reduced, pivots) = QMatrix::from_rows(rows).rref();
    if pivots.contains(&columns.len()) {
        return None;
    }

    let mut images = BTreeMap::new();
    for (r, &pivot) in pivots.iter().enumerate() {
        let mut image = Poly::constant(reduced.entry(r, columns.len()).clone());
        for (j, var) in columns.iter().enumerate() {
            if j == pivot {
                continue;
            }
            let c = reduced.entry(r, j);
            if !c.is_zero() {
                image = image - Poly::var(var.clone()).mul_coeff(c);
            }
        }
        images.insert(columns[pivot].clone(), image);
    }
    Some((images, pivots.len()))
}

fn linear_coefficient(q: &Poly, v: &Var) -> BigRational {
    q.terms()
        .find(|(m, _)| m.exponent(v) == 1)
        .map(|(_, c)| c.clone())
        .unwrap_or_else(BigRational::zero)
}

/// Closed form for systems of independent binomials: every equation has
/// two terms, a nonzero constant one and a monomial with some variable
/// of degree 1, and no variable is shared between equations.
fn binomial_count(dimension: usize, system: &[Poly]) -> Result<Option<Poly>, CountError> {
    let mut seen: BTreeSet<Var> = BTreeSet::new();
    let mut total_vars = 0usize;
    for q in system {
        if q.number_of_terms() != 2 || q.constant_term().is_zero() {
            return Ok(None);
        }
        let vars = q.variables();
        if vars.is_empty() || vars.iter().any(|v| seen.contains(v)) {
            return Ok(None);
        }
        let has_linear_variable = q
            .terms()
            .any(|(m, _)| m.total_degree() != 0 && vars.iter().any(|v| m.exponent(v) == 1));
        if !has_linear_variable {
            return Ok(None);
        }
        total_vars += vars.len();
        seen.extend(vars);
    }

    let p = Poly::var(field_var());
    let units = (p.clone() - Poly::one()).pow_i64((total_vars - system.len()) as i64)?;
    let bulk = p.pow_i64(dimension.saturating_sub(total_vars) as i64)?;
    Ok(Some(units * bulk))
}

fn count_prompt(support: &[Var], system: &[Poly]) -> String {
    let lines = system
        .iter()
        .map(Poly::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Count the number of points on:\n{}\ndefined by:\n{lines}",
        ring_printout("QQ", support)
    )
}

fn placeholder(label: &str) -> Poly {
    Poly::var(Var::new(format!("C{}", label.replace('.', "_"))))
}
