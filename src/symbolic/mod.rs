//! Exact symbolic arithmetic for the chart pipeline.
//!
//! Everything downstream of the loader manipulates polynomials with
//! `BigRational` coefficients and integer (possibly negative) exponents:
//! cone inequalities, birational maps, Jacobians, point counts, and the
//! final rational function in the field-size and twist symbols. This
//! module keeps that arithmetic in one place:
//!
//! - [`poly`] — Laurent polynomials over named variables.
//! - [`factor`] — factored forms and a cached partial factorizer.
//! - [`parse`] — the text formats crossing the algebra-engine boundary.
//! - [`matrix`] — exact row reduction for linear-system elimination.
//! - [`ratfn`] — rational functions with an explicit denominator list.
//! - [`odometer`] — mixed-radix enumeration used by lattice builders.
//!
//! All containers are `BTreeMap`/`BTreeSet` based so that iteration
//! order, `Display` output, and hashes are stable across runs.

pub mod factor;
pub mod matrix;
pub mod odometer;
pub mod parse;
pub mod poly;
pub mod ratfn;

use std::collections::BTreeSet;

use thiserror::Error;

pub use factor::{factor_poly, Factored, Factorizer};
pub use matrix::QMatrix;
pub use odometer::MixedRadix;
pub use parse::{
    parse_bracketed, parse_comma_list, parse_expr, parse_factored, parse_ring, parse_wrapped_list,
    ListNode, ParseError, RingDescriptor,
};
pub use poly::{Monomial, Poly, Var};
pub use ratfn::RatFn;

/// Failures of symbolic manipulation itself, as opposed to parse errors
/// or failures of an external collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymbolicError {
    /// A negative power of a polynomial with more than one term was
    /// requested; only monomials are invertible here.
    #[error("cannot raise a {terms}-term polynomial to a negative power")]
    NegativePower {
        /// Number of terms in the offending base.
        terms: usize,
    },
    /// A substitution sent a negatively-exponentiated variable to a
    /// non-monomial image.
    #[error("substitution for `{0}` is not invertible")]
    NonInvertibleSubstitution(Var),
    /// Division by the zero polynomial.
    #[error("division by zero polynomial")]
    DivisionByZero,
    /// A substitution produced a vanishing denominator factor.
    #[error("substitution makes a denominator factor vanish")]
    VanishingDenominator,
}

/// Returns `count` variable names `prefix1, prefix2, ...`, skipping any
/// candidate already present in `used`.
///
/// The scan continues past collisions, so the full `count` is always
/// produced no matter how many candidates are taken.
pub fn fresh_names(prefix: &str, count: usize, used: &BTreeSet<Var>) -> Vec<Var> {
    let mut out = Vec::with_capacity(count);
    let mut i = 1usize;
    while out.len() < count {
        let candidate = Var::new(format!("{prefix}{i}"));
        if !used.contains(&candidate) {
            out.push(candidate);
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_names_skip_collisions() {
        let used: BTreeSet<Var> = [Var::new("z1"), Var::new("z3")].into_iter().collect();
        let names = fresh_names("z", 3, &used);
        assert_eq!(
            names,
            vec![Var::new("z2"), Var::new("z4"), Var::new("z5")]
        );
    }

    #[test]
    fn test_fresh_names_empty_request() {
        let used = BTreeSet::new();
        assert!(fresh_names("z", 0, &used).is_empty());
    }
}
