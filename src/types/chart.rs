//! Charts of a resolution atlas.
//!
//! ## Overview
//!
//! A chart is one affine piece of a blow-up atlas: a polynomial ring, a
//! birational map back to the root coordinates, cone inequalities
//! describing the valuation region the chart integrates over, its
//! exceptional divisors, and a Jacobian determinant. The root chart is
//! the ambient space itself; leaf charts additionally carry an
//! intersection lattice used to split them into monomial subcharts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use num_rational::BigRational;
use num_traits::{One, Signed};

use crate::symbolic::{Factored, Factorizer, Poly, Var};
use crate::types::{ChartId, IntersectionLattice};

/// One cone inequality: the valuation of `lhs` is bounded by the
/// valuation of `rhs`, i.e. `lhs` divides `rhs` on the region.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConeCondition {
    /// Dividing side, kept factored as loaded.
    pub lhs: Factored,
    /// Divisible side, kept factored as loaded.
    pub rhs: Factored,
}

impl fmt::Display for ConeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lhs, self.rhs)
    }
}

/// Result of the quasi-monomiality probe.
///
/// The probe only gathers data: which roots each variable would have to
/// avoid or hit, and which constants appear. Acting on the profile is a
/// case split that is out of scope here, so the profile is advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuasiMonomial {
    /// Some irreducible cone factor involves more than one variable, so
    /// affine translation cannot reduce the chart to monomial form.
    Obstructed,
    /// Every irreducible cone factor is univariate.
    Profile {
        /// Distinct roots of the degree-1 factors, per variable.
        roots: BTreeMap<Var, BTreeSet<BigRational>>,
        /// Non-unit constant factors, by absolute value.
        constants: BTreeSet<BigRational>,
    },
}

/// One affine chart of the atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    /// Identifier within the atlas.
    pub id: ChartId,
    /// Coefficient field of the chart's ring, as printed by the engine.
    pub coefficients: String,
    /// Ring variables, in engine order. The field-size symbol is never
    /// one of them.
    pub variables: Vec<Var>,
    /// Birational map back to the root coordinates, one factored entry
    /// per root variable.
    pub birational_map: Vec<Factored>,
    /// Center of the blow-up that produced this chart.
    pub center: Vec<Poly>,
    /// Cone inequalities carving out the chart's valuation region.
    pub cone: Vec<ConeCondition>,
    /// Exceptional divisors as loaded, one group per divisor index.
    pub exceptional_divisors: Vec<Vec<Poly>>,
    /// Defining equations of a non-affine ambient space. Empty for
    /// charts living in plain affine space.
    pub ambient_factor: Vec<Poly>,
    /// Conditions that hold on every stratum of this chart.
    pub focus: Vec<Poly>,
    /// Jacobian determinant of the accumulated coordinate change.
    pub jacobian: Factored,
    /// Map from the immediate parent chart, when recorded.
    pub last_map: Option<Vec<Poly>>,
    /// Intersection lattice of the exceptional divisors. Present on
    /// leaf charts, absent on the root.
    pub lattice: Option<IntersectionLattice>,
    /// Point-count weight accumulated while splitting into subcharts,
    /// a polynomial in the field-size symbol.
    pub integral_factor: Poly,
    /// Parent chart, absent for the root.
    pub parent: Option<ChartId>,
    /// Directory the chart was loaded from, kept for nested loads.
    pub directory: Option<String>,
    /// Memoized monomial subcharts.
    pub subcharts: Option<Vec<Chart>>,
}

impl Chart {
    /// Number of ring variables.
    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    /// Whether the chart lives in plain affine space.
    pub fn is_affine(&self) -> bool {
        self.ambient_factor.is_empty()
    }

    /// The ring variables as a set.
    pub fn variable_set(&self) -> BTreeSet<Var> {
        self.variables.iter().cloned().collect()
    }

    /// Whether every cone side expands to a single signed monomial.
    ///
    /// The test is syntactic on the fully distributed polynomial. A
    /// side that cannot be expanded (a negative power of a sum) counts
    /// as non-monomial.
    pub fn is_monomial(&self) -> bool {
        self.cone
            .iter()
            .all(|c| side_is_monomial(&c.lhs) && side_is_monomial(&c.rhs))
    }

    /// Probes whether affine translation could monomialize the cone.
    ///
    /// Every cone side is refined into irreducible factors. A factor in
    /// more than one variable is an obstruction and short-circuits to
    /// [`QuasiMonomial::Obstructed`]. Otherwise each degree-1 factor
    /// `a*x + b` records the root `-b/a` against `x`, and non-unit
    /// constants are collected separately.
    pub fn quasi_monomial(&self, factorizer: &Factorizer) -> QuasiMonomial {
        let mut roots: BTreeMap<Var, BTreeSet<BigRational>> = BTreeMap::new();
        let mut constants: BTreeSet<BigRational> = BTreeSet::new();
        for condition in &self.cone {
            for side in [&condition.lhs, &condition.rhs] {
                if side.is_zero() {
                    continue;
                }
                let refined = factorizer.factor_factored(side);
                let unit = refined.unit.abs();
                if !unit.is_one() {
                    constants.insert(unit);
                }
                for (base, _) in &refined.factors {
                    let vars = base.variables();
                    if vars.len() > 1 {
                        return QuasiMonomial::Obstructed;
                    }
                    let Some(var) = vars.into_iter().next() else {
                        continue;
                    };
                    if base.total_degree() == 1 {
                        if let Some(root) = linear_root(base, &var) {
                            roots.entry(var).or_default().insert(root);
                        }
                    }
                }
            }
        }
        QuasiMonomial::Profile { roots, constants }
    }
}

impl fmt::Display for Chart {
    /// Mimics the engine's ring printout.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ring_printout(&self.coefficients, &self.variables))
    }
}

/// Formats a ring the way the algebra engine prints one. Shared by
/// chart display and the prompts shown when a human supplies a count.
pub fn ring_printout(coefficients: &str, variables: &[Var]) -> String {
    let names = variables
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "coefficients: {coefficients}\n\
         number of vars: {count}\n\
         \u{20}   block 1: ordering dp\n\
         \u{20}     names: {names}\n\
         \u{20}   block 2: ordering C",
        count = variables.len(),
    )
}

fn side_is_monomial(side: &Factored) -> bool {
    match side.expand() {
        Ok(poly) => poly.number_of_terms() <= 1,
        Err(_) => false,
    }
}

/// Root of `a*x + b`, when the polynomial really is linear in `x`.
fn linear_root(base: &Poly, var: &Var) -> Option<BigRational> {
    let mut linear_coeff = None;
    for (monomial, coeff) in base.terms() {
        match monomial.exponent(var) {
            0 => {}
            1 => linear_coeff = Some(coeff.clone()),
            _ => return None,
        }
    }
    let a = linear_coeff?;
    Some(-base.constant_term() / a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn rat(n: i64) -> BigRational {
        BigRational::from(BigInt::from(n))
    }

    fn var(name: &str) -> Poly {
        Poly::var(Var::new(name))
    }

    fn bare_chart(cone: Vec<ConeCondition>) -> Chart {
        Chart {
            id: ChartId::root(),
            coefficients: "QQ".to_string(),
            variables: vec![Var::new("x"), Var::new("y")],
            birational_map: Vec::new(),
            center: Vec::new(),
            cone,
            exceptional_divisors: Vec::new(),
            ambient_factor: Vec::new(),
            focus: Vec::new(),
            jacobian: Factored::one(),
            last_map: None,
            lattice: None,
            integral_factor: Poly::one(),
            parent: None,
            directory: None,
            subcharts: None,
        }
    }

    fn condition(lhs: Poly, rhs: Poly) -> ConeCondition {
        ConeCondition {
            lhs: Factored::from_poly(lhs),
            rhs: Factored::from_poly(rhs),
        }
    }

    #[test]
    fn test_monomial_detection_expands_sides() {
        let x = var("x");
        let y = var("y");
        let monomial = bare_chart(vec![condition(x.clone(), x.clone() * x.clone() * y.clone())]);
        assert!(monomial.is_monomial());

        let mixed = bare_chart(vec![condition(x.clone(), x + y)]);
        assert!(!mixed.is_monomial());
    }

    #[test]
    fn test_empty_cone_is_monomial() {
        assert!(bare_chart(Vec::new()).is_monomial());
    }

    #[test]
    fn test_inverted_sum_side_is_not_monomial() {
        let side = Factored::new(rat(1), [(var("x") + var("y"), -1)]);
        let chart = bare_chart(vec![ConeCondition {
            lhs: Factored::from_poly(var("x")),
            rhs: side,
        }]);
        assert!(!chart.is_monomial());
    }

    #[test]
    fn test_quasi_monomial_profile_collects_roots_and_constants() {
        let x = var("x");
        let y = var("y");
        // x*(x - 1) against 2*(y + 3)
        let lhs = x.clone() * (x - Poly::one());
        let rhs = (y + Poly::int(3)).mul_coeff(&rat(2));
        let chart = bare_chart(vec![condition(lhs, rhs)]);

        let factorizer = Factorizer::default();
        match chart.quasi_monomial(&factorizer) {
            QuasiMonomial::Profile { roots, constants } => {
                assert_eq!(
                    roots[&Var::new("x")],
                    [rat(0), rat(1)].into_iter().collect::<BTreeSet<_>>()
                );
                assert_eq!(
                    roots[&Var::new("y")],
                    [rat(-3)].into_iter().collect::<BTreeSet<_>>()
                );
                assert_eq!(constants, [rat(2)].into_iter().collect::<BTreeSet<_>>());
            }
            QuasiMonomial::Obstructed => panic!("profile expected"),
        }
    }

    #[test]
    fn test_multivariate_factor_obstructs() {
        let chart = bare_chart(vec![condition(
            var("x"),
            var("x") * var("y") - Poly::one(),
        )]);
        let factorizer = Factorizer::default();
        assert_eq!(
            chart.quasi_monomial(&factorizer),
            QuasiMonomial::Obstructed
        );
    }

    #[test]
    fn test_ring_printout_shape() {
        let chart = bare_chart(Vec::new());
        let expected = "coefficients: QQ\n\
                        number of vars: 2\n\
                        \u{20}   block 1: ordering dp\n\
                        \u{20}     names: x y\n\
                        \u{20}   block 2: ordering C";
        assert_eq!(chart.to_string(), expected);
    }
}
