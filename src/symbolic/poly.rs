//! Laurent polynomials with exact rational coefficients.
//!
//! A [`Poly`] is a finite sum of terms `c * x1^e1 * ... * xk^ek` where
//! the coefficients are `BigRational` and the exponents are `i64`,
//! possibly negative. Negative exponents appear naturally here: the
//! field-size symbol enters integrands as `p^-1`, and cone substitutions
//! produce images such as `p^-2 * t`. Operations that only make sense on
//! genuine (nonnegative-exponent) polynomials, such as exact division,
//! clear the Laurent part first.
//!
//! Terms are stored in a `BTreeMap` keyed by [`Monomial`], so equality,
//! ordering, hashing, and printing are all canonical.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use super::SymbolicError;

/// An interned-by-value variable name.
///
/// Names compare and sort as strings, which fixes the term order used
/// everywhere else in the crate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Var(String);

impl Var {
    /// Creates a variable from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Var(name.into())
    }

    /// The variable's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A power product of variables with integer exponents.
///
/// Zero exponents are never stored; the empty product is `1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Monomial {
    exponents: BTreeMap<Var, i64>,
}

impl Monomial {
    /// The empty product.
    pub fn one() -> Self {
        Monomial::default()
    }

    /// A single variable to the first power.
    pub fn var(v: Var) -> Self {
        Monomial::from_exponents([(v, 1)])
    }

    /// Builds a monomial from `(variable, exponent)` pairs, dropping
    /// zero exponents and summing duplicates.
    pub fn from_exponents(pairs: impl IntoIterator<Item = (Var, i64)>) -> Self {
        let mut exponents: BTreeMap<Var, i64> = BTreeMap::new();
        for (v, e) in pairs {
            let entry = exponents.entry(v).or_insert(0);
            *entry += e;
        }
        exponents.retain(|_, e| *e != 0);
        Monomial { exponents }
    }

    /// The exponent of `v`, zero if absent.
    pub fn exponent(&self, v: &Var) -> i64 {
        self.exponents.get(v).copied().unwrap_or(0)
    }

    /// Iterates over `(variable, exponent)` pairs in name order.
    pub fn exponents(&self) -> impl Iterator<Item = (&Var, i64)> {
        self.exponents.iter().map(|(v, e)| (v, *e))
    }

    /// Sum of all exponents.
    pub fn total_degree(&self) -> i64 {
        self.exponents.values().sum()
    }

    /// True for the empty product.
    pub fn is_one(&self) -> bool {
        self.exponents.is_empty()
    }

    /// True when every exponent is nonnegative.
    pub fn is_genuine(&self) -> bool {
        self.exponents.values().all(|e| *e >= 0)
    }

    /// The variables appearing with nonzero exponent.
    pub fn variables(&self) -> impl Iterator<Item = &Var> {
        self.exponents.keys()
    }

    /// Product of two monomials.
    pub fn mul(&self, other: &Monomial) -> Monomial {
        Monomial::from_exponents(
            self.exponents()
                .map(|(v, e)| (v.clone(), e))
                .chain(other.exponents().map(|(v, e)| (v.clone(), e))),
        )
    }

    /// The reciprocal monomial.
    pub fn inverse(&self) -> Monomial {
        Monomial {
            exponents: self
                .exponents
                .iter()
                .map(|(v, e)| (v.clone(), -e))
                .collect(),
        }
    }

    /// Raises every exponent by the factor `k`.
    pub fn pow(&self, k: i64) -> Monomial {
        if k == 0 {
            return Monomial::one();
        }
        Monomial {
            exponents: self
                .exponents
                .iter()
                .map(|(v, e)| (v.clone(), e * k))
                .collect(),
        }
    }

    /// True when `self` divides `other` with nonnegative quotient
    /// exponents. Both sides are expected to be genuine.
    pub fn divides(&self, other: &Monomial) -> bool {
        self.exponents
            .iter()
            .all(|(v, e)| other.exponent(v) >= *e)
    }

    /// Quotient `other / self` as a (possibly Laurent) monomial.
    pub fn div_into(&self, other: &Monomial) -> Monomial {
        other.mul(&self.inverse())
    }

    /// Graded-lexicographic comparison: total degree first, then the
    /// exponent vector in variable-name order.
    pub fn grlex_cmp(&self, other: &Monomial) -> Ordering {
        match self.total_degree().cmp(&other.total_degree()) {
            Ordering::Equal => {}
            ord => return ord,
        }
        let vars: BTreeSet<&Var> = self
            .exponents
            .keys()
            .chain(other.exponents.keys())
            .collect();
        for v in vars {
            match self.exponent(v).cmp(&other.exponent(v)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponents.is_empty() {
            return f.write_str("1");
        }
        let mut first = true;
        for (v, e) in &self.exponents {
            if !first {
                f.write_str("*")?;
            }
            first = false;
            if *e == 1 {
                write!(f, "{v}")?;
            } else {
                write!(f, "{v}^{e}")?;
            }
        }
        Ok(())
    }
}

/// A Laurent polynomial: a `Monomial -> BigRational` term map with no
/// zero coefficients.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Poly {
    terms: BTreeMap<Monomial, BigRational>,
}

impl Poly {
    /// The zero polynomial.
    pub fn zero() -> Self {
        Poly::default()
    }

    /// The constant `1`.
    pub fn one() -> Self {
        Poly::constant(BigRational::one())
    }

    /// A constant polynomial.
    pub fn constant(c: BigRational) -> Self {
        let mut p = Poly::zero();
        p.add_term(Monomial::one(), c);
        p
    }

    /// A constant polynomial from a machine integer.
    pub fn int(n: i64) -> Self {
        Poly::constant(BigRational::from_integer(BigInt::from(n)))
    }

    /// A single variable.
    pub fn var(v: Var) -> Self {
        Poly::monomial(Monomial::var(v))
    }

    /// A monomial with coefficient `1`.
    pub fn monomial(m: Monomial) -> Self {
        let mut p = Poly::zero();
        p.add_term(m, BigRational::one());
        p
    }

    /// Builds a polynomial from `(monomial, coefficient)` pairs.
    pub fn from_terms(pairs: impl IntoIterator<Item = (Monomial, BigRational)>) -> Self {
        let mut p = Poly::zero();
        for (m, c) in pairs {
            p.add_term(m, c);
        }
        p
    }

    /// Adds one term, merging with an existing monomial and dropping
    /// the entry when the coefficient cancels to zero.
    pub fn add_term(&mut self, m: Monomial, c: BigRational) {
        if c.is_zero() {
            return;
        }
        match self.terms.get_mut(&m) {
            Some(entry) => {
                *entry += c;
                if entry.is_zero() {
                    self.terms.remove(&m);
                }
            }
            None => {
                self.terms.insert(m, c);
            }
        }
    }

    /// True for the zero polynomial.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// True for the constant `1`.
    pub fn is_one(&self) -> bool {
        self.as_constant().map(|c| c.is_one()).unwrap_or(false)
    }

    /// True for the constants `1` and `-1`.
    pub fn is_unit(&self) -> bool {
        self.as_constant()
            .map(|c| c.numer().magnitude() == c.denom().magnitude())
            .unwrap_or(false)
    }

    /// Returns the constant value when the polynomial has no variable
    /// part; the zero polynomial is the constant `0`.
    pub fn as_constant(&self) -> Option<BigRational> {
        if self.terms.is_empty() {
            return Some(BigRational::zero());
        }
        if self.terms.len() == 1 {
            if let Some(c) = self.terms.get(&Monomial::one()) {
                return Some(c.clone());
            }
        }
        None
    }

    /// Returns the variable `v` when the polynomial is exactly `v`.
    pub fn as_variable(&self) -> Option<&Var> {
        if self.terms.len() != 1 {
            return None;
        }
        let (monomial, coeff) = self.terms.iter().next()?;
        if !coeff.is_one() {
            return None;
        }
        let mut exponents = monomial.exponents();
        match (exponents.next(), exponents.next()) {
            (Some((v, 1)), None) => Some(v),
            _ => None,
        }
    }

    /// Number of terms.
    pub fn number_of_terms(&self) -> usize {
        self.terms.len()
    }

    /// Iterates over `(monomial, coefficient)` pairs in map order.
    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, &BigRational)> {
        self.terms.iter()
    }

    /// The graded-lexicographically largest term.
    pub fn leading_grlex(&self) -> Option<(&Monomial, &BigRational)> {
        self.terms
            .iter()
            .max_by(|(a, _), (b, _)| a.grlex_cmp(b))
    }

    /// Largest exponent of `v` over all terms; zero for the zero
    /// polynomial or an absent variable.
    pub fn degree_in(&self, v: &Var) -> i64 {
        self.terms
            .keys()
            .map(|m| m.exponent(v))
            .max()
            .unwrap_or(0)
    }

    /// Smallest exponent of `v` over all terms (zero for the zero
    /// polynomial). Negative exactly when the Laurent part involves `v`.
    pub fn min_exponent(&self, v: &Var) -> i64 {
        self.terms
            .keys()
            .map(|m| m.exponent(v))
            .min()
            .unwrap_or(0)
    }

    /// Largest total degree over all terms.
    pub fn total_degree(&self) -> i64 {
        self.terms
            .keys()
            .map(|m| m.total_degree())
            .max()
            .unwrap_or(0)
    }

    /// The set of variables appearing in some term.
    pub fn variables(&self) -> BTreeSet<Var> {
        self.terms
            .keys()
            .flat_map(|m| m.variables().cloned())
            .collect()
    }

    /// True when `v` appears in some term.
    pub fn has_var(&self, v: &Var) -> bool {
        self.terms.keys().any(|m| m.exponent(v) != 0)
    }

    /// Coefficient of the constant monomial.
    pub fn constant_term(&self) -> BigRational {
        self.terms
            .get(&Monomial::one())
            .cloned()
            .unwrap_or_else(BigRational::zero)
    }

    /// Scales every coefficient.
    pub fn mul_coeff(&self, c: &BigRational) -> Poly {
        if c.is_zero() {
            return Poly::zero();
        }
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, k)| (m.clone(), k * c))
                .collect(),
        }
    }

    /// Multiplies every term by a monomial.
    pub fn mul_monomial(&self, m: &Monomial) -> Poly {
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(k, c)| (k.mul(m), c.clone()))
                .collect(),
        }
    }

    /// Nonnegative power by repeated squaring.
    pub fn pow(&self, mut e: u32) -> Poly {
        let mut base = self.clone();
        let mut acc = Poly::one();
        while e > 0 {
            if e & 1 == 1 {
                acc = &acc * &base;
            }
            base = &base * &base;
            e >>= 1;
        }
        acc
    }

    /// Signed power. Negative exponents require a single-term base,
    /// whose monomial and coefficient are inverted.
    pub fn pow_i64(&self, e: i64) -> Result<Poly, SymbolicError> {
        if e >= 0 {
            return Ok(self.pow(e as u32));
        }
        if self.is_zero() {
            return Err(SymbolicError::DivisionByZero);
        }
        if self.terms.len() != 1 {
            return Err(SymbolicError::NegativePower {
                terms: self.terms.len(),
            });
        }
        let (m, c) = self
            .terms
            .iter()
            .next()
            .map(|(m, c)| (m.clone(), c.clone()))
            .ok_or(SymbolicError::DivisionByZero)?;
        let inv = Poly::from_terms([(m.inverse(), c.recip())]);
        Ok(inv.pow((-e) as u32))
    }

    /// Substitutes variables by polynomial images. Variables absent from
    /// the map are left alone. A negative exponent on a substituted
    /// variable demands a single-term image.
    pub fn substitute(&self, images: &BTreeMap<Var, Poly>) -> Result<Poly, SymbolicError> {
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            let mut acc = Poly::constant(c.clone());
            let mut stay = Monomial::one();
            for (v, e) in m.exponents() {
                match images.get(v) {
                    Some(img) => {
                        let raised = img.pow_i64(e).map_err(|err| match err {
                            SymbolicError::NegativePower { .. } => {
                                SymbolicError::NonInvertibleSubstitution(v.clone())
                            }
                            other => other,
                        })?;
                        acc = &acc * &raised;
                    }
                    None => stay = stay.mul(&Monomial::from_exponents([(v.clone(), e)])),
                }
            }
            out = &out + &acc.mul_monomial(&stay);
        }
        Ok(out)
    }

    /// Substitutes variables by monomial images; always total since
    /// monomials are invertible.
    pub fn substitute_monomials(&self, images: &BTreeMap<Var, Monomial>) -> Poly {
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            let mut target = Monomial::one();
            for (v, e) in m.exponents() {
                match images.get(v) {
                    Some(img) => target = target.mul(&img.pow(e)),
                    None => target = target.mul(&Monomial::from_exponents([(v.clone(), e)])),
                }
            }
            out.add_term(target, c.clone());
        }
        out
    }

    /// Exact division. Returns `None` when `divisor` does not divide
    /// `self` in the Laurent sense. Division by zero is `None` for a
    /// nonzero dividend and `Some(0)` for a zero one.
    pub fn div_exact(&self, divisor: &Poly) -> Option<Poly> {
        if self.is_zero() {
            return Some(Poly::zero());
        }
        if divisor.is_zero() {
            return None;
        }
        // Clear Laurent parts so leading-term division terminates.
        let shift_n = self.laurent_shift();
        let shift_d = divisor.laurent_shift();
        let num = self.mul_monomial(&shift_n);
        let den = divisor.mul_monomial(&shift_d);
        let q = genuine_div(&num, &den)?;
        // self / divisor = (num / den) * shift_d / shift_n.
        Some(q.mul_monomial(&shift_d.mul(&shift_n.inverse())))
    }

    /// Monomial that clears all negative exponents when multiplied in.
    fn laurent_shift(&self) -> Monomial {
        let mut shift: Vec<(Var, i64)> = Vec::new();
        for v in self.variables() {
            let m = self.min_exponent(&v);
            if m < 0 {
                shift.push((v, -m));
            }
        }
        Monomial::from_exponents(shift)
    }

    /// Splits off the rational content: returns `(content, primitive)`
    /// with `self = content * primitive`, where the primitive part has
    /// coprime integer coefficients and a positive leading coefficient.
    /// The zero polynomial yields `(0, 0)`.
    pub fn primitive_parts(&self) -> (BigRational, Poly) {
        if self.is_zero() {
            return (BigRational::zero(), Poly::zero());
        }
        use num_integer::Integer;
        let mut num_gcd = BigInt::zero();
        let mut den_lcm = BigInt::one();
        for c in self.terms.values() {
            num_gcd = num_gcd.gcd(c.numer());
            den_lcm = den_lcm.lcm(c.denom());
        }
        let mut content = BigRational::new(num_gcd, den_lcm);
        let leading_neg = self
            .leading_grlex()
            .map(|(_, c)| c.is_negative())
            .unwrap_or(false);
        if leading_neg {
            content = -content;
        }
        let prim = self.mul_coeff(&content.recip());
        (content, prim)
    }

    /// The primitive part alone; see [`Poly::primitive_parts`].
    pub fn primitive(&self) -> Poly {
        self.primitive_parts().1
    }

    /// Evaluates the polynomial at an integer point modulo `p`.
    /// Returns `None` when a coefficient is non-integral, an exponent is
    /// negative, or a variable is missing from the assignment.
    pub fn eval_mod(&self, assignment: &BTreeMap<Var, i64>, p: i64) -> Option<i64> {
        let mut total: i64 = 0;
        for (m, c) in &self.terms {
            if !c.denom().is_one() {
                return None;
            }
            let coeff = c.numer().mod_floor_i64(p)?;
            let mut value = coeff;
            for (v, e) in m.exponents() {
                if e < 0 {
                    return None;
                }
                let x = assignment.get(v)?.rem_euclid(p);
                let mut acc: i64 = 1;
                for _ in 0..e {
                    acc = (acc * x).rem_euclid(p);
                }
                value = (value * acc).rem_euclid(p);
            }
            total = (total + value).rem_euclid(p);
        }
        Some(total)
    }
}

/// Leading-term division for genuine polynomials.
fn genuine_div(num: &Poly, den: &Poly) -> Option<Poly> {
    let (lead_m, lead_c) = den.leading_grlex().map(|(m, c)| (m.clone(), c.clone()))?;
    let mut rem = num.clone();
    let mut quot = Poly::zero();
    while !rem.is_zero() {
        let (rm, rc) = rem.leading_grlex().map(|(m, c)| (m.clone(), c.clone()))?;
        if !lead_m.divides(&rm) {
            return None;
        }
        let qm = lead_m.div_into(&rm);
        let qc = rc / lead_c.clone();
        let piece = Poly::from_terms([(qm, qc)]);
        rem = &rem - &(&piece * den);
        quot = &quot + &piece;
    }
    Some(quot)
}

trait ModFloor {
    fn mod_floor_i64(&self, p: i64) -> Option<i64>;
}

impl ModFloor for BigInt {
    fn mod_floor_i64(&self, p: i64) -> Option<i64> {
        use num_integer::Integer;
        let m = self.mod_floor(&BigInt::from(p));
        m.to_i64()
    }
}

impl Add for &Poly {
    type Output = Poly;
    fn add(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), c.clone());
        }
        out
    }
}

impl Add for Poly {
    type Output = Poly;
    fn add(self, rhs: Poly) -> Poly {
        &self + &rhs
    }
}

impl AddAssign<&Poly> for Poly {
    fn add_assign(&mut self, rhs: &Poly) {
        for (m, c) in &rhs.terms {
            self.add_term(m.clone(), c.clone());
        }
    }
}

impl Sub for &Poly {
    type Output = Poly;
    fn sub(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), -c.clone());
        }
        out
    }
}

impl Sub for Poly {
    type Output = Poly;
    fn sub(self, rhs: Poly) -> Poly {
        &self - &rhs
    }
}

impl Mul for &Poly {
    type Output = Poly;
    fn mul(self, rhs: &Poly) -> Poly {
        let mut out = Poly::zero();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &rhs.terms {
                out.add_term(m1.mul(m2), c1 * c2);
            }
        }
        out
    }
}

impl Mul for Poly {
    type Output = Poly;
    fn mul(self, rhs: Poly) -> Poly {
        &self * &rhs
    }
}

impl Neg for &Poly {
    type Output = Poly;
    fn neg(self) -> Poly {
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (m.clone(), -c.clone()))
                .collect(),
        }
    }
}

impl Neg for Poly {
    type Output = Poly;
    fn neg(self) -> Poly {
        -&self
    }
}

impl Sum for Poly {
    fn sum<I: Iterator<Item = Poly>>(iter: I) -> Poly {
        iter.fold(Poly::zero(), |acc, p| &acc + &p)
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        let mut ordered: Vec<(&Monomial, &BigRational)> = self.terms.iter().collect();
        ordered.sort_by(|(a, _), (b, _)| b.grlex_cmp(a));
        for (i, (m, c)) in ordered.iter().enumerate() {
            let neg = c.is_negative();
            let mag = c.abs();
            if i == 0 {
                if neg {
                    f.write_str("-")?;
                }
            } else if neg {
                f.write_str(" - ")?;
            } else {
                f.write_str(" + ")?;
            }
            if m.is_one() {
                write!(f, "{mag}")?;
            } else if mag.is_one() {
                write!(f, "{m}")?;
            } else {
                write!(f, "{mag}*{m}")?;
            }
        }
        Ok(())
    }
}
