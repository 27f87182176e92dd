//! Rational functions as quotients of Laurent polynomials.
//!
//! Cone solvers and the final zeta forms live here. The normal form
//! keeps the denominator primitive with a positive leading coefficient
//! and pushes all rational content into the numerator, so structurally
//! equal values compare equal; [`RatFn::equivalent`] decides equality
//! up to cancellation by cross-multiplying.
//!
//! Substitution can make a denominator factor vanish even when the
//! overall value is finite (a removable singularity). Such factors are
//! reported as [`SymbolicError::VanishingDenominator`]; callers cancel
//! them with [`RatFn::reduce`] after a partial substitution and retry.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Neg, Sub};

use num_rational::BigRational;
use num_traits::{One, Zero};

use super::factor::factor_poly;
use super::poly::{Poly, Var};
use super::SymbolicError;

/// A quotient of two polynomials.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RatFn {
    numerator: Poly,
    denominator: Poly,
}

impl RatFn {
    /// Builds a quotient, rejecting a zero denominator.
    pub fn new(numerator: Poly, denominator: Poly) -> Result<Self, SymbolicError> {
        if denominator.is_zero() {
            return Err(SymbolicError::DivisionByZero);
        }
        Ok(Self::normalized(numerator, denominator))
    }

    /// A polynomial viewed as a quotient by one.
    pub fn from_poly(p: Poly) -> Self {
        RatFn {
            numerator: p,
            denominator: Poly::one(),
        }
    }

    /// The zero function.
    pub fn zero() -> Self {
        Self::from_poly(Poly::zero())
    }

    /// The constant one.
    pub fn one() -> Self {
        Self::from_poly(Poly::one())
    }

    /// A rational constant.
    pub fn constant(c: BigRational) -> Self {
        Self::from_poly(Poly::constant(c))
    }

    /// Numerator in normal form.
    pub fn numerator(&self) -> &Poly {
        &self.numerator
    }

    /// Denominator in normal form.
    pub fn denominator(&self) -> &Poly {
        &self.denominator
    }

    /// True when the numerator is zero.
    pub fn is_zero(&self) -> bool {
        self.numerator.is_zero()
    }

    /// True for the constant one.
    pub fn is_one(&self) -> bool {
        self.numerator.is_one() && self.denominator.is_one()
    }

    /// Union of the variables of both sides.
    pub fn variables(&self) -> std::collections::BTreeSet<Var> {
        let mut vars = self.numerator.variables();
        vars.extend(self.denominator.variables());
        vars
    }

    // Denominator must be nonzero.
    fn normalized(numerator: Poly, denominator: Poly) -> Self {
        if numerator.is_zero() {
            return RatFn {
                numerator,
                denominator: Poly::one(),
            };
        }
        let (cn, pn) = numerator.primitive_parts();
        let (cd, pd) = denominator.primitive_parts();
        RatFn {
            numerator: pn.mul_coeff(&(cn / cd)),
            denominator: pd,
        }
    }

    /// Cancels denominator factors that divide the numerator and
    /// re-normalizes. Removable singularities disappear here.
    pub fn reduce(&self) -> Self {
        if self.denominator.is_one() || self.numerator.is_zero() {
            return self.clone();
        }
        let den_factors = factor_poly(&self.denominator);
        let mut num = self.numerator.clone();
        let mut remaining: Vec<(Poly, i64)> = Vec::new();
        for (base, exp) in &den_factors.factors {
            let mut left = *exp;
            if base.as_constant().is_none() {
                while left > 0 {
                    match num.div_exact(base) {
                        Some(q) => {
                            num = q;
                            left -= 1;
                        }
                        None => break,
                    }
                }
            }
            if left != 0 {
                remaining.push((base.clone(), left));
            }
        }
        let mut den = Poly::constant(den_factors.unit.clone());
        for (base, exp) in &remaining {
            // Negative exponents only occur on single-variable bases.
            if let Ok(power) = base.pow_i64(*exp) {
                den = &den * &power;
            }
        }
        Self::normalized(num, den)
    }

    /// Replaces variables on both sides and re-normalizes.
    ///
    /// Fails when a replacement makes the denominator vanish; the
    /// caller may substitute a subset, [`reduce`](Self::reduce), and
    /// try again.
    pub fn substitute(&self, map: &BTreeMap<Var, Poly>) -> Result<Self, SymbolicError> {
        let num = self.numerator.substitute(map)?;
        let den = self.denominator.substitute(map)?;
        if den.is_zero() {
            return Err(SymbolicError::VanishingDenominator);
        }
        Ok(Self::normalized(num, den))
    }

    /// Multiplies by a bare polynomial.
    pub fn mul_poly(&self, p: &Poly) -> Self {
        Self::normalized(&self.numerator * p, self.denominator.clone())
    }

    /// Scales by a rational constant.
    pub fn scale(&self, c: &BigRational) -> Self {
        Self::normalized(self.numerator.mul_coeff(c), self.denominator.clone())
    }

    /// Equality up to cancellation, by cross-multiplication.
    pub fn equivalent(&self, other: &RatFn) -> bool {
        &self.numerator * &other.denominator == &other.numerator * &self.denominator
    }
}

impl fmt::Display for RatFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator.is_one() {
            return write!(f, "{}", self.numerator);
        }
        let num_bare = self.numerator.number_of_terms() <= 1;
        let den_bare = self.denominator.number_of_terms() == 1;
        match (num_bare, den_bare) {
            (true, true) => write!(f, "{}/{}", self.numerator, self.denominator),
            (true, false) => write!(f, "{}/({})", self.numerator, self.denominator),
            (false, true) => write!(f, "({})/{}", self.numerator, self.denominator),
            (false, false) => write!(f, "({})/({})", self.numerator, self.denominator),
        }
    }
}

impl Add for RatFn {
    type Output = RatFn;

    fn add(self, rhs: RatFn) -> RatFn {
        let num = &self.numerator * &rhs.denominator + &rhs.numerator * &self.denominator;
        let den = &self.denominator * &rhs.denominator;
        Self::normalized(num, den)
    }
}

impl Sub for RatFn {
    type Output = RatFn;

    fn sub(self, rhs: RatFn) -> RatFn {
        self + (-rhs)
    }
}

impl Mul for RatFn {
    type Output = RatFn;

    fn mul(self, rhs: RatFn) -> RatFn {
        Self::normalized(
            &self.numerator * &rhs.numerator,
            &self.denominator * &rhs.denominator,
        )
    }
}

impl Neg for RatFn {
    type Output = RatFn;

    fn neg(self) -> RatFn {
        RatFn {
            numerator: -self.numerator,
            denominator: self.denominator,
        }
    }
}

impl Sum for RatFn {
    fn sum<I: Iterator<Item = RatFn>>(iter: I) -> RatFn {
        iter.fold(RatFn::zero(), |acc, x| acc + x)
    }
}
