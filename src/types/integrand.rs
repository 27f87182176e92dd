//! Integrands of chart-local cone integrals.
//!
//! An integrand is a product of absolute values `|term|^(a + b*s)`
//! over the chart's measure, together with factors that sit outside
//! the integral: powers of the field-size symbol pulled out of the
//! terms, and the point-count weights accumulated while splitting a
//! chart into subcharts.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;

use num_traits::{One, Signed, Zero};
use thiserror::Error;

use crate::symbolic::{factor_poly, Poly, RatFn, SymbolicError, Var};
use crate::{field_var, twist_var};

/// Failures while evaluating an integrand's outside factors.
#[derive(Debug, Error)]
pub enum IntegrandError {
    /// A factor outside the integral other than the field-size power
    /// cannot depend on the formal parameter.
    #[error("factor `{factor}` outside the integral carries parameter exponent {parameter}")]
    TwistedOutsideFactor {
        /// The offending factor base.
        factor: String,
        /// Its parameter exponent.
        parameter: i64,
    },
    /// Arithmetic on the factor bases failed.
    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
}

/// The exponent pair `(a, b)` of `|term|^(a + b*s)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermExponents {
    /// Constant part of the exponent.
    pub constant: i64,
    /// Coefficient of the formal parameter `s`.
    pub parameter: i64,
}

impl TermExponents {
    /// Builds the pair `(a, b)`.
    pub fn new(constant: i64, parameter: i64) -> Self {
        TermExponents { constant, parameter }
    }

    /// Whether both exponents vanish.
    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.parameter == 0
    }

    /// Multiplies both exponents, as when a term base is raised to a
    /// power during factoring.
    pub fn scaled(&self, k: i64) -> Self {
        TermExponents {
            constant: self.constant * k,
            parameter: self.parameter * k,
        }
    }
}

impl Add for TermExponents {
    type Output = TermExponents;

    fn add(self, rhs: TermExponents) -> TermExponents {
        TermExponents {
            constant: self.constant + rhs.constant,
            parameter: self.parameter + rhs.parameter,
        }
    }
}

impl fmt::Display for TermExponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.constant, self.parameter)
    }
}

/// A cleaned product of absolute-value terms with outside factors.
///
/// Construction normalizes: every term is fully factored, exponent
/// pairs of equal bases are summed, sign units and vanishing pairs are
/// dropped, and powers of the field-size symbol migrate out of the
/// term list into the factor list with negated exponents. The factor
/// list always carries exactly one field-size entry, `(0, 0)` when no
/// power was extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integrand {
    terms: BTreeMap<Poly, TermExponents>,
    factors: BTreeMap<Poly, TermExponents>,
}

impl Integrand {
    /// Normalizes raw term and factor lists into an integrand.
    pub fn new(
        terms: impl IntoIterator<Item = (Poly, TermExponents)>,
        factors: impl IntoIterator<Item = (Poly, TermExponents)>,
    ) -> Self {
        let mut cleaned: BTreeMap<Poly, TermExponents> = BTreeMap::new();
        for (term, exponents) in terms {
            if exponents.is_zero() {
                continue;
            }
            let factored = factor_poly(&term);
            let unit = factored.unit.abs();
            if !unit.is_one() && !unit.is_zero() {
                merge(&mut cleaned, Poly::constant(unit), exponents);
            }
            for (base, multiplicity) in factored.factors {
                merge(&mut cleaned, base, exponents.scaled(multiplicity));
            }
        }

        let mut outside: BTreeMap<Poly, TermExponents> = BTreeMap::new();
        for (base, exponents) in factors {
            merge(&mut outside, base, exponents);
        }

        let p = Poly::var(field_var());
        if let Some(exponents) = cleaned.remove(&p) {
            merge(&mut outside, p.clone(), exponents.scaled(-1));
        }
        outside.entry(p).or_default();

        cleaned.retain(|_, e| !e.is_zero());

        Integrand {
            terms: cleaned,
            factors: outside,
        }
    }

    /// An integrand with no terms, integrating the constant `1`.
    pub fn trivial() -> Self {
        Integrand::new([], [])
    }

    /// The cleaned terms in base order.
    pub fn terms(&self) -> impl Iterator<Item = (&Poly, TermExponents)> {
        self.terms.iter().map(|(base, e)| (base, *e))
    }

    /// The outside factors in base order, field-size entry included.
    pub fn factors(&self) -> impl Iterator<Item = (&Poly, TermExponents)> {
        self.factors.iter().map(|(base, e)| (base, *e))
    }

    /// Exponent pair of a term base, `(0, 0)` when absent.
    pub fn exponents_for(&self, base: &Poly) -> TermExponents {
        self.terms.get(base).copied().unwrap_or_default()
    }

    /// Exponent pair of a bare-variable term, `(0, 0)` when absent.
    pub fn variable_exponents(&self, v: &Var) -> TermExponents {
        self.exponents_for(&Poly::var(v.clone()))
    }

    /// Variables appearing in any term base.
    pub fn variables(&self) -> std::collections::BTreeSet<Var> {
        self.terms.keys().flat_map(|base| base.variables()).collect()
    }

    /// Evaluates the outside factors into a rational function of the
    /// field-size and twist symbols. The field-size entry `(a, b)`
    /// contributes `p^a * t^(-b)`; any other base must carry parameter
    /// exponent zero and contributes its own power, which lands in the
    /// denominator when the exponent is negative.
    pub fn p_factor(&self) -> Result<RatFn, IntegrandError> {
        let p = Poly::var(field_var());
        let t = Poly::var(twist_var());
        let mut numerator = Poly::one();
        let mut denominator = Poly::one();
        for (base, exponents) in &self.factors {
            if *base == p {
                numerator =
                    numerator * p.pow_i64(exponents.constant)? * t.pow_i64(-exponents.parameter)?;
            } else {
                if exponents.parameter != 0 {
                    return Err(IntegrandError::TwistedOutsideFactor {
                        factor: base.to_string(),
                        parameter: exponents.parameter,
                    });
                }
                if exponents.constant >= 0 {
                    numerator = numerator * base.pow(exponents.constant as u32);
                } else {
                    denominator = denominator * base.pow((-exponents.constant) as u32);
                }
            }
        }
        Ok(RatFn::new(numerator, denominator)?)
    }
}

impl fmt::Display for Integrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            f.write_str("|1|")?;
        }
        for (k, (base, e)) in self.terms.iter().enumerate() {
            if k > 0 {
                f.write_str(" * ")?;
            }
            write!(f, "|{base}|^{e}")?;
        }
        let mut outside = self
            .factors
            .iter()
            .filter(|(_, e)| !e.is_zero())
            .peekable();
        if outside.peek().is_some() {
            f.write_str(" with ")?;
            for (k, (base, e)) in outside.enumerate() {
                if k > 0 {
                    f.write_str(" * ")?;
                }
                write!(f, "({base})^{e}")?;
            }
        }
        Ok(())
    }
}

fn merge(map: &mut BTreeMap<Poly, TermExponents>, base: Poly, exponents: TermExponents) {
    let entry = map.entry(base.clone()).or_default();
    *entry = *entry + exponents;
    if entry.is_zero() && !is_field_size_base(&base) {
        map.remove(&base);
    }
}

fn is_field_size_base(base: &Poly) -> bool {
    *base == Poly::var(field_var())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Poly {
        Poly::var(Var::new(name))
    }

    fn e(a: i64, b: i64) -> TermExponents {
        TermExponents::new(a, b)
    }

    #[test]
    fn test_clean_factors_and_merges_terms() {
        let x = var("x");
        let y = var("y");
        let integrand = Integrand::new(
            [
                (x.clone(), e(1, 0)),
                (x.clone() * x.clone() * y.clone(), e(1, 1)),
            ],
            [],
        );
        assert_eq!(integrand.exponents_for(&x), e(3, 2));
        assert_eq!(integrand.exponents_for(&y), e(1, 1));
    }

    #[test]
    fn test_sign_units_are_dropped() {
        let x = var("x");
        let integrand = Integrand::new([(-x.clone(), e(2, 1))], []);
        assert_eq!(integrand.exponents_for(&x), e(2, 1));
        assert_eq!(integrand.terms().count(), 1);
    }

    #[test]
    fn test_duplicate_terms_merge_and_unit_terms_vanish() {
        let x = var("x");
        let integrand = Integrand::new(
            [
                (x.clone(), e(1, 0)),
                (x.clone(), e(2, 0)),
                (-Poly::one(), e(1, 0)),
            ],
            [],
        );
        let terms: Vec<_> = integrand.terms().collect();
        assert_eq!(terms, vec![(&x, e(3, 0))]);
    }

    #[test]
    fn test_field_size_powers_move_outside() {
        let p = Poly::var(field_var());
        let t = Poly::var(twist_var());
        let x = var("x");
        let term = p.clone() * p.clone() * x.clone();
        let integrand = Integrand::new([(term, e(1, 1))], []);

        assert_eq!(integrand.exponents_for(&x), e(1, 1));
        assert_eq!(integrand.exponents_for(&p), e(0, 0));
        // |p^2|^(1+s) = p^-2 t^2
        let expected = RatFn::from_poly(p.pow_i64(-2).unwrap() * t.pow_i64(2).unwrap());
        assert!(integrand.p_factor().unwrap().equivalent(&expected));
    }

    #[test]
    fn test_missing_field_size_entry_defaults_to_one() {
        let integrand = Integrand::new([(var("x"), e(1, 0))], []);
        assert_eq!(integrand.factors().count(), 1);
        assert!(integrand.p_factor().unwrap().equivalent(&RatFn::one()));
    }

    #[test]
    fn test_outside_count_factors_multiply_in() {
        let p = Poly::var(field_var());
        let weight = p.clone() - Poly::one();
        let integrand = Integrand::new([], [(weight.clone(), e(2, 0))]);
        let expected = RatFn::from_poly(weight.clone() * weight);
        assert!(integrand.p_factor().unwrap().equivalent(&expected));
    }

    #[test]
    fn test_negative_outside_factor_divides() {
        let p = Poly::var(field_var());
        let weight = p - Poly::one();
        let integrand = Integrand::new([], [(weight.clone(), e(-2, 0))]);
        let expected = RatFn::new(Poly::one(), weight.clone() * weight).unwrap();
        assert!(integrand.p_factor().unwrap().equivalent(&expected));
    }

    #[test]
    fn test_parameter_exponent_outside_is_rejected() {
        let p = Poly::var(field_var());
        let weight = p - Poly::one();
        let integrand = Integrand::new([], [(weight, e(1, 1))]);
        assert!(matches!(
            integrand.p_factor(),
            Err(IntegrandError::TwistedOutsideFactor { .. })
        ));
    }

    #[test]
    fn test_construction_is_idempotent() {
        let x = var("x");
        let y = var("y");
        let first = Integrand::new(
            [(x.clone() * y.clone(), e(1, 0)), (y, e(-1, 2))],
            [],
        );
        let again = Integrand::new(
            first.terms().map(|(b, e)| (b.clone(), e)),
            first.factors().map(|(b, e)| (b.clone(), e)),
        );
        assert_eq!(first, again);
    }
}
