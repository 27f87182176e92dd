//! Factored polynomial forms and a cached partial factorizer.
//!
//! Chart data crosses the engine boundary already factored, and the
//! monomialization rewrite works factor-by-factor, so the pipeline keeps
//! polynomials as a unit times a list of `(base, exponent)` pairs for as
//! long as possible. [`factor_poly`] refines a base further: it splits
//! off rational and monomial content and hunts rational roots of
//! univariate remainders. It does not attempt full multivariate
//! factorization; callers that know likely factors (the divisor list of
//! a lattice) pass them as hints instead.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use parking_lot::RwLock;

use super::poly::{Monomial, Poly, Var};
use super::SymbolicError;

/// Default capacity of the factorization memo.
const FACTOR_CACHE_CAPACITY: usize = 4096;

/// Rational-root candidates are only enumerated below this magnitude.
const ROOT_SEARCH_BOUND: i64 = 1_000_000;

/// A polynomial kept as `unit * Π base_i ^ exp_i`.
///
/// Normal form: no zero exponents, no constant bases (folded into the
/// unit), every base sign-normalized to a positive leading coefficient
/// and primitive integer content, bases sorted and merged. The zero
/// polynomial is represented by a zero unit with no factors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Factored {
    /// The scalar prefactor.
    pub unit: BigRational,
    /// Sorted `(base, exponent)` pairs.
    pub factors: Vec<(Poly, i64)>,
}

impl Factored {
    /// Normalizing constructor; see the type-level invariants.
    pub fn new(unit: BigRational, factors: impl IntoIterator<Item = (Poly, i64)>) -> Self {
        let mut u = unit;
        let mut normalized: Vec<(Poly, i64)> = Vec::new();
        for (base, exp) in factors {
            if exp == 0 || u.is_zero() {
                continue;
            }
            if base.is_zero() {
                u = BigRational::zero();
                normalized.clear();
                break;
            }
            if let Some(c) = base.as_constant() {
                u *= rat_pow(&c, exp);
                continue;
            }
            let (content, prim) = base.primitive_parts();
            u *= rat_pow(&content, exp);
            normalized.push((prim, exp));
        }
        if u.is_zero() {
            return Factored {
                unit: u,
                factors: Vec::new(),
            };
        }
        normalized.sort_by(|(a, _), (b, _)| a.cmp(b));
        let mut merged: Vec<(Poly, i64)> = Vec::new();
        for (base, exp) in normalized {
            match merged.last_mut() {
                Some((prev, prev_exp)) if *prev == base => *prev_exp += exp,
                _ => merged.push((base, exp)),
            }
        }
        merged.retain(|(_, e)| *e != 0);
        Factored {
            unit: u,
            factors: merged,
        }
    }

    /// The multiplicative identity.
    pub fn one() -> Self {
        Factored {
            unit: BigRational::one(),
            factors: Vec::new(),
        }
    }

    /// A single unrefined base.
    pub fn from_poly(p: Poly) -> Self {
        Factored::new(BigRational::one(), [(p, 1)])
    }

    /// A bare constant.
    pub fn from_unit(c: BigRational) -> Self {
        Factored {
            unit: c,
            factors: Vec::new(),
        }
    }

    /// True for the constant `1`.
    pub fn is_one(&self) -> bool {
        self.factors.is_empty() && self.unit.is_one()
    }

    /// True for the zero element.
    pub fn is_zero(&self) -> bool {
        self.unit.is_zero()
    }

    /// True when no polynomial factors remain.
    pub fn is_constant(&self) -> bool {
        self.factors.is_empty()
    }

    /// Union of the variables of all bases.
    pub fn variables(&self) -> std::collections::BTreeSet<Var> {
        self.factors
            .iter()
            .flat_map(|(base, _)| base.variables())
            .collect()
    }

    /// Multiplies out all factors. Fails when a negative exponent sits
    /// on a multi-term base.
    pub fn expand(&self) -> Result<Poly, SymbolicError> {
        let mut acc = Poly::constant(self.unit.clone());
        for (base, exp) in &self.factors {
            acc = &acc * &base.pow_i64(*exp)?;
        }
        Ok(acc)
    }

    /// Product of two factored forms.
    pub fn mul(&self, other: &Factored) -> Factored {
        Factored::new(
            self.unit.clone() * other.unit.clone(),
            self.factors
                .iter()
                .cloned()
                .chain(other.factors.iter().cloned()),
        )
    }

    /// Multiplies one more factor in.
    pub fn mul_factor(&self, base: Poly, exp: i64) -> Factored {
        Factored::new(
            self.unit.clone(),
            self.factors.iter().cloned().chain([(base, exp)]),
        )
    }

    /// Raises the whole product to the power `k`.
    pub fn pow(&self, k: i64) -> Factored {
        if k == 0 {
            return Factored::one();
        }
        Factored::new(
            rat_pow(&self.unit, k),
            self.factors.iter().map(|(b, e)| (b.clone(), e * k)),
        )
    }

    /// Same product with the unit's sign dropped.
    pub fn abs(&self) -> Factored {
        Factored {
            unit: self.unit.abs(),
            factors: self.factors.clone(),
        }
    }
}

impl fmt::Display for Factored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        let mut wrote = false;
        if !self.unit.is_one() || self.factors.is_empty() {
            write!(f, "{}", self.unit)?;
            wrote = true;
        }
        for (base, exp) in &self.factors {
            if wrote {
                f.write_str("*")?;
            }
            wrote = true;
            let bare = base.number_of_terms() == 1;
            if bare {
                write!(f, "{base}")?;
            } else {
                write!(f, "({base})")?;
            }
            if *exp != 1 {
                write!(f, "^{exp}")?;
            }
        }
        Ok(())
    }
}

/// Signed rational power; negative exponents go through the reciprocal.
fn rat_pow(c: &BigRational, e: i64) -> BigRational {
    if e == 0 {
        return BigRational::one();
    }
    let base = if e < 0 { c.recip() } else { c.clone() };
    let mut acc = BigRational::one();
    for _ in 0..e.unsigned_abs() {
        acc *= base.clone();
    }
    acc
}

/// Splits a polynomial into content, per-variable monomial content, and
/// a remainder that is further refined by rational-root extraction when
/// univariate. Multivariate remainders are kept whole.
pub fn factor_poly(p: &Poly) -> Factored {
    if p.is_zero() {
        return Factored::from_unit(BigRational::zero());
    }
    let (content, prim) = p.primitive_parts();
    let mut factors: Vec<(Poly, i64)> = Vec::new();

    // Monomial content per variable, including Laurent parts.
    let mut rest = prim;
    for v in rest.variables() {
        let m = rest.min_exponent(&v);
        if m != 0 {
            factors.push((Poly::var(v.clone()), m));
            rest = rest.mul_monomial(&Monomial::from_exponents([(v.clone(), -m)]));
        }
    }

    if let Some(c) = rest.as_constant() {
        return Factored::new(content * c, factors);
    }

    let vars = rest.variables();
    if vars.len() == 1 {
        if let Some(v) = vars.into_iter().next() {
            let (leftover, linear) = extract_rational_roots(rest, &v);
            factors.extend(linear);
            rest = leftover;
        }
    }
    if !rest.is_one() {
        factors.push((rest, 1));
    }
    Factored::new(content, factors)
}

/// Divides out all monic-primitive linear factors with rational roots.
fn extract_rational_roots(poly: Poly, v: &Var) -> (Poly, Vec<(Poly, i64)>) {
    let mut rest = poly;
    let mut found: Vec<(Poly, i64)> = Vec::new();
    let c0 = rest.constant_term();
    let lead_coeff = rest
        .terms()
        .find(|(m, _)| m.exponent(v) == rest.degree_in(v))
        .map(|(_, c)| c.clone())
        .unwrap_or_else(BigRational::one);
    // Primitive parts have integer coefficients.
    let (Some(c0_mag), Some(lead_mag)) = (
        c0.numer().abs().to_i64(),
        lead_coeff.numer().abs().to_i64(),
    ) else {
        return (rest, found);
    };
    if c0_mag == 0 || c0_mag > ROOT_SEARCH_BOUND || lead_mag > ROOT_SEARCH_BOUND {
        return (rest, found);
    }
    for a in divisors_of(c0_mag) {
        for b in divisors_of(lead_mag) {
            for sign in [1i64, -1] {
                // Candidate root a*sign/b gives the factor b*v - a*sign.
                let candidate = Poly::var(v.clone()).mul_coeff(&BigRational::from_integer(
                    BigInt::from(b),
                )) - Poly::int(a * sign);
                let candidate = candidate.primitive();
                let mut count = 0i64;
                while let Some(q) = rest.div_exact(&candidate) {
                    rest = q;
                    count += 1;
                }
                if count > 0 {
                    found.push((candidate, count));
                }
                if rest.as_constant().is_some() {
                    return (rest, found);
                }
            }
        }
    }
    (rest, found)
}

/// Positive divisors of `n`, unordered cost-wise but returned sorted.
fn divisors_of(n: i64) -> Vec<i64> {
    let n = n.abs();
    if n == 0 {
        return vec![];
    }
    let mut out = Vec::new();
    let mut d = 1;
    while d * d <= n {
        if n % d == 0 {
            out.push(d);
            if d != n / d {
                out.push(n / d);
            }
        }
        d += 1;
    }
    out.sort_unstable();
    out
}

/// A memoizing front end over [`factor_poly`].
///
/// Factorization shows up on every cone side and Jacobian of every
/// subchart, frequently with the same bases, so results are kept in an
/// LRU cache behind a lock.
pub struct Factorizer {
    cache: RwLock<LruCache<Poly, Factored>>,
}

impl Default for Factorizer {
    fn default() -> Self {
        Factorizer::new(FACTOR_CACHE_CAPACITY)
    }
}

impl Factorizer {
    /// Creates a factorizer with the given memo capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Factorizer {
            cache: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Factors a polynomial, consulting the memo first.
    pub fn factor(&self, p: &Poly) -> Factored {
        if let Some(hit) = self.cache.write().get(p) {
            return hit.clone();
        }
        let computed = factor_poly(p);
        self.cache.write().put(p.clone(), computed.clone());
        computed
    }

    /// Refactors every base of an existing factored form and merges the
    /// refinements.
    pub fn factor_factored(&self, f: &Factored) -> Factored {
        let mut acc = Factored::from_unit(f.unit.clone());
        for (base, exp) in &f.factors {
            acc = acc.mul(&self.factor(base).pow(*exp));
        }
        acc
    }

    /// Factors with a list of likely bases tried first by exact
    /// division. Hinted splits are not memoized since the hint set
    /// varies per caller.
    pub fn factor_with_hints(&self, p: &Poly, hints: &[Poly]) -> Factored {
        if p.is_zero() {
            return Factored::from_unit(BigRational::zero());
        }
        let mut rest = p.clone();
        let mut found: Vec<(Poly, i64)> = Vec::new();
        for hint in hints {
            if hint.as_constant().is_some() {
                continue;
            }
            let mut count = 0i64;
            while let Some(q) = rest.div_exact(hint) {
                rest = q;
                count += 1;
            }
            if count > 0 {
                found.push((hint.clone(), count));
            }
        }
        let tail = self.factor(&rest);
        Factored::new(tail.unit.clone(), tail.factors.iter().cloned().chain(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Var {
        Var::new("x")
    }

    fn y() -> Var {
        Var::new("y")
    }

    #[test]
    fn test_constants_fold_into_unit() {
        // 2x + 2y = 2 * (x + y)
        let p = (Poly::var(x()) + Poly::var(y())).mul_coeff(&BigRational::from_integer(2.into()));
        let f = factor_poly(&p);
        assert_eq!(f.unit, BigRational::from_integer(2.into()));
        assert_eq!(f.factors, vec![(Poly::var(x()) + Poly::var(y()), 1)]);
    }

    #[test]
    fn test_monomial_content_is_extracted() {
        // x^2*y - x = x * (x*y - 1)
        let p = Poly::var(x()) * Poly::var(x()) * Poly::var(y()) - Poly::var(x());
        let f = factor_poly(&p);
        let expected_rest = Poly::var(x()) * Poly::var(y()) - Poly::one();
        assert!(f.factors.contains(&(Poly::var(x()), 1)));
        assert!(f.factors.contains(&(expected_rest, 1)));
    }

    #[test]
    fn test_univariate_roots_are_found() {
        // x^2 - 3x + 2 = (x - 1)(x - 2)
        let p = Poly::var(x()) * Poly::var(x())
            - Poly::var(x()).mul_coeff(&BigRational::from_integer(3.into()))
            + Poly::int(2);
        let f = factor_poly(&p);
        assert_eq!(f.unit, BigRational::one());
        assert_eq!(f.factors.len(), 2);
        assert!(f.factors.contains(&(Poly::var(x()) - Poly::one(), 1)));
        assert!(f.factors.contains(&(Poly::var(x()) - Poly::int(2), 1)));
    }

    #[test]
    fn test_repeated_roots_carry_multiplicity() {
        // (x + 1)^2
        let base = Poly::var(x()) + Poly::one();
        let f = factor_poly(&(&base * &base));
        assert_eq!(f.factors, vec![(base, 2)]);
    }

    #[test]
    fn test_multivariate_remainder_stays_whole() {
        let p = Poly::var(x()) * Poly::var(y()) + Poly::one();
        let f = factor_poly(&p);
        assert_eq!(f.factors, vec![(p, 1)]);
    }

    #[test]
    fn test_expand_round_trips() {
        let p = Poly::var(x()) * Poly::var(x()) * Poly::var(y()) - Poly::var(x());
        let f = factor_poly(&p);
        assert_eq!(f.expand().unwrap(), p);
    }

    #[test]
    fn test_negative_exponent_on_sum_fails_to_expand() {
        let f = Factored::new(
            BigRational::one(),
            [(Poly::var(x()) + Poly::one(), -1)],
        );
        assert!(f.expand().is_err());
    }

    #[test]
    fn test_hints_split_what_root_search_cannot() {
        // x^2 - y^2 with hint x - y
        let p = Poly::var(x()) * Poly::var(x()) - Poly::var(y()) * Poly::var(y());
        let fz = Factorizer::default();
        let f = fz.factor_with_hints(&p, &[Poly::var(x()) - Poly::var(y())]);
        assert!(f
            .factors
            .contains(&(Poly::var(x()) - Poly::var(y()), 1)));
        assert!(f
            .factors
            .contains(&(Poly::var(x()) + Poly::var(y()), 1)));
    }

    #[test]
    fn test_factorizer_memoizes() {
        let fz = Factorizer::new(4);
        let p = Poly::var(x()) * Poly::var(x()) - Poly::one();
        let a = fz.factor(&p);
        let b = fz.factor(&p);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sign_normalization_moves_into_unit() {
        // -(x - 1) has unit -1 and base x - 1
        let p = -(Poly::var(x()) - Poly::one());
        let f = factor_poly(&p);
        assert_eq!(f.unit, BigRational::from_integer((-1).into()));
        assert_eq!(f.factors, vec![(Poly::var(x()) - Poly::one(), 1)]);
    }
}
