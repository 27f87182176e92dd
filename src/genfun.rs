//! Cone integrals of monomial charts.
//!
//! A monomial chart contributes an integral over the valuation vectors of
//! its variables, a region cut out by the chart's cone conditions. The
//! integral is assembled in four stages:
//!
//! ## Cleaning
//!
//! Conditions with left side `1` hold everywhere and are dropped. A
//! condition with right side `1` forces its left side to be a unit: if the
//! field-size symbol appears there the region is empty and the integral is
//! zero, otherwise the left side's variables are pinned to valuation zero
//! and leave the measure.
//!
//! ## The cone matrix
//!
//! Surviving conditions become inequality rows `c + a_1 e_1 + ... >= 0`
//! over the exponent vector, one coefficient per active variable plus a
//! constant column holding the field-size valuation difference. The first
//! rows are always the nonnegativity rows of the free orthant.
//!
//! ## Series solving
//!
//! A [`ConeSolver`] turns the matrix into the generating series
//! `sum Z^e` over the cone's lattice points. The built-in
//! [`SubstitutionSolver`] handles the cones monomialization produces by
//! peeling rows off with unimodular substitutions.
//!
//! ## Assembly
//!
//! Each series symbol is sent to `p^(-a-1) t^b`, where `(a, b)` are the
//! integrand exponents of the matching variable, and the result is scaled
//! by the integrand's outside factor and the unit-group measure
//! `(1 - p^-1)^n`. When the one-shot substitution hits a vanishing
//! denominator, a randomized partial-substitution search cancels the
//! removable factor first.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;
use tracing::debug;

use crate::symbolic::{fresh_names, Factored, Monomial, Poly, RatFn, SymbolicError, Var};
use crate::types::{Chart, ConeCondition, Integrand, IntegrandError, TermExponents};
use crate::{field_var, twist_var};

/// Number of shuffled substitution orders tried by the fallback search.
const SUBSTITUTION_ATTEMPTS: usize = 8;

/// Failure of a cone series solver.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The cone cannot be rewritten as a free monoid by this solver.
    #[error("cone is not reducible to free substitutions: {0}")]
    UnsupportedCone(String),
    /// Arithmetic failure while building the series.
    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
}

/// Failure while assembling a chart's cone integral.
#[derive(Debug, Error)]
pub enum GenFunError {
    /// The cone series solver gave up.
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// Substitution failed even after the fallback search.
    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
    /// The integrand carries a twisted factor outside the measure.
    #[error(transparent)]
    Integrand(#[from] IntegrandError),
}

/// Inequality matrix of a chart's valuation cone.
///
/// Each row `[c, a_1, ..., a_n]` encodes `c + a_1 e_1 + ... + a_n e_n >= 0`
/// over the exponent vector `e`. The first `n` rows are the nonnegativity
/// rows of the orthant; rows pushed afterwards encode divisibility
/// conditions, with the field-size valuation difference in the constant
/// column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConeMatrix {
    variables: usize,
    rows: Vec<Vec<i64>>,
}

impl ConeMatrix {
    /// Matrix of the free orthant on `variables` exponents.
    pub fn orthant(variables: usize) -> Self {
        let rows = (0..variables)
            .map(|i| {
                let mut row = vec![0i64; variables + 1];
                row[i + 1] = 1;
                row
            })
            .collect();
        ConeMatrix { variables, rows }
    }

    /// Appends an inequality row `[c, a_1, ..., a_n]`.
    pub fn push_row(&mut self, row: Vec<i64>) {
        debug_assert_eq!(row.len(), self.variables + 1);
        self.rows.push(row);
    }

    /// Number of exponent variables.
    pub fn variables(&self) -> usize {
        self.variables
    }

    /// All inequality rows, nonnegativity rows included.
    pub fn rows(&self) -> &[Vec<i64>] {
        &self.rows
    }
}

impl fmt::Display for ConeMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            for (j, entry) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{entry}")?;
            }
        }
        write!(f, "]")
    }
}

/// A rational series kept in product form.
///
/// The value is `numerator / prod(denominators)`. Denominator factors stay
/// unexpanded so substitution can watch each factor for vanishing and
/// [`Series::reduce`] can divide factors out of the numerator exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    numerator: Poly,
    denominators: Vec<Poly>,
}

impl Series {
    /// Series from a numerator and a list of denominator factors.
    pub fn new(numerator: Poly, denominators: Vec<Poly>) -> Self {
        Series {
            numerator,
            denominators,
        }
    }

    /// The constant series one.
    pub fn one() -> Self {
        Series::new(Poly::one(), Vec::new())
    }

    /// The zero series.
    pub fn zero() -> Self {
        Series::new(Poly::zero(), Vec::new())
    }

    /// Whether the series is identically zero.
    pub fn is_zero(&self) -> bool {
        self.numerator.is_zero()
    }

    /// Variables appearing in the numerator or any denominator factor.
    pub fn variables(&self) -> BTreeSet<Var> {
        let mut vars = self.numerator.variables();
        for factor in &self.denominators {
            vars.extend(factor.variables());
        }
        vars
    }

    /// Applies `images` to the numerator and every denominator factor.
    ///
    /// Fails with [`SymbolicError::VanishingDenominator`] when a factor
    /// collapses to zero under the substitution.
    pub fn substitute(&self, images: &BTreeMap<Var, Poly>) -> Result<Series, SymbolicError> {
        let numerator = self.numerator.substitute(images)?;
        let mut denominators = Vec::with_capacity(self.denominators.len());
        for factor in &self.denominators {
            let image = factor.substitute(images)?;
            if image.is_zero() {
                return Err(SymbolicError::VanishingDenominator);
            }
            denominators.push(image);
        }
        Ok(Series {
            numerator,
            denominators,
        })
    }

    /// Cancels denominator factors that divide the numerator exactly.
    pub fn reduce(mut self) -> Series {
        let mut kept = Vec::new();
        for factor in std::mem::take(&mut self.denominators) {
            if factor.is_one() {
                continue;
            }
            match self.numerator.div_exact(&factor) {
                Some(quotient) => self.numerator = quotient,
                None => kept.push(factor),
            }
        }
        self.denominators = kept;
        self
    }

    /// Multiplies the numerator by `p`.
    pub fn mul_poly(mut self, p: &Poly) -> Series {
        self.numerator = &self.numerator * p;
        self
    }

    /// Divides by a nonzero polynomial, pushing it onto the factor list.
    pub fn div_poly(mut self, p: &Poly) -> Series {
        debug_assert!(!p.is_zero());
        if !p.is_one() {
            self.denominators.push(p.clone());
        }
        self
    }

    /// Collapses the product form into a single rational function.
    pub fn into_ratfn(self) -> Result<RatFn, SymbolicError> {
        let mut denominator = Poly::one();
        for factor in &self.denominators {
            denominator = &denominator * factor;
        }
        RatFn::new(self.numerator, denominator)
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.numerator)?;
        for factor in &self.denominators {
            write!(f, " / ({factor})")?;
        }
        Ok(())
    }
}

/// Strategy that turns a cone matrix into the generating series
/// `sum Z^e` over the cone's lattice points.
///
/// `symbols[i]` is the series variable tracking the exponent `e_i`.
pub trait ConeSolver {
    /// Computes the generating series of `cone` in the given symbols.
    fn generating_function(
        &mut self,
        cone: &ConeMatrix,
        symbols: &[Var],
    ) -> Result<Series, SolverError>;
}

/// Solver that peels cone rows off by unimodular substitutions.
///
/// A row `e_i >= c + sum c_j e_j` with unit pivot coefficient is consumed
/// by substituting `e_i = c + sum c_j e_j + f` for a fresh `f >= 0`, which
/// shifts the running weight monomials. Rows bounding a lone variable
/// above contribute a finite geometric sum; rows forcing variables to
/// zero freeze them out of the product. When every row is consumed the
/// cone is a free monoid and the series is `prod 1 / (1 - weight)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstitutionSolver;

impl ConeSolver for SubstitutionSolver {
    fn generating_function(
        &mut self,
        cone: &ConeMatrix,
        symbols: &[Var],
    ) -> Result<Series, SolverError> {
        let n = cone.variables();
        debug_assert_eq!(symbols.len(), n);
        let mut rows: Vec<Vec<i64>> = cone.rows().to_vec();
        let mut weights: Vec<Monomial> = symbols
            .iter()
            .map(|z| Monomial::from_exponents([(z.clone(), 1)]))
            .collect();
        let mut frozen = vec![false; n];
        let mut numerator = Poly::one();

        loop {
            rows.retain(|row| !always_holds(row));
            if rows.iter().any(|row| infeasible(row)) {
                return Ok(Series::zero());
            }
            if rows.is_empty() {
                break;
            }
            if let Some(idx) = rows.iter().position(|row| pins_to_zero(row)) {
                let row = rows.remove(idx);
                for j in 0..n {
                    if row[j + 1] < 0 {
                        frozen[j] = true;
                        for other in &mut rows {
                            other[j + 1] = 0;
                        }
                    }
                }
                continue;
            }
            if let Some((idx, j)) =
                (0..rows.len()).find_map(|i| bounded_column(&rows, i).map(|j| (i, j)))
            {
                let row = rows.remove(idx);
                let mut sum = Poly::zero();
                for k in 0..=row[0] {
                    sum = &sum + &Poly::monomial(weights[j].pow(k));
                }
                numerator = &numerator * &sum;
                frozen[j] = true;
                continue;
            }
            if let Some((idx, pivot)) =
                (0..rows.len()).find_map(|i| pivot_column(&rows[i]).map(|j| (i, j)))
            {
                let row = rows.remove(idx);
                let shift = -row[0];
                if shift > 0 {
                    numerator = &numerator * &Poly::monomial(weights[pivot].pow(shift));
                }
                for other in &mut rows {
                    let r = other[pivot + 1];
                    if r == 0 {
                        continue;
                    }
                    other[0] += r * shift;
                    for j in 0..n {
                        if j != pivot {
                            other[j + 1] += r * (-row[j + 1]);
                        }
                    }
                }
                let pivot_weight = weights[pivot].clone();
                for j in 0..n {
                    if j == pivot {
                        continue;
                    }
                    let c = -row[j + 1];
                    if c > 0 {
                        weights[j] = weights[j].mul(&pivot_weight.pow(c));
                    }
                }
                continue;
            }
            return Err(SolverError::UnsupportedCone(format!(
                "no unit pivot in {}",
                render_rows(&rows)
            )));
        }

        let denominators = (0..n)
            .filter(|&i| !frozen[i])
            .map(|i| &Poly::one() - &Poly::monomial(weights[i].clone()))
            .collect();
        Ok(Series::new(numerator, denominators))
    }
}

/// Holds on the whole orthant.
fn always_holds(row: &[i64]) -> bool {
    row.iter().all(|&a| a >= 0)
}

/// Holds nowhere on the orthant.
fn infeasible(row: &[i64]) -> bool {
    row[0] < 0 && row[1..].iter().all(|&a| a <= 0)
}

/// `0 >= sum c_j e_j` with every `c_j >= 0`: the variables carrying a
/// positive coefficient are pinned to exponent zero.
fn pins_to_zero(row: &[i64]) -> bool {
    row[0] == 0 && row[1..].iter().all(|&a| a <= 0) && row[1..].iter().any(|&a| a < 0)
}

/// Detects a row `e_j <= c` whose variable appears in no other row,
/// returning the column `j`.
fn bounded_column(rows: &[Vec<i64>], idx: usize) -> Option<usize> {
    let row = &rows[idx];
    if row[0] <= 0 || row[1..].iter().any(|&a| a > 0) {
        return None;
    }
    let negatives: Vec<usize> = row[1..]
        .iter()
        .enumerate()
        .filter(|&(_, &a)| a < 0)
        .map(|(j, _)| j)
        .collect();
    match negatives.as_slice() {
        [j] if row[*j + 1] == -1 => {
            let j = *j;
            let alone = rows
                .iter()
                .enumerate()
                .all(|(k, other)| k == idx || other[j + 1] == 0);
            alone.then_some(j)
        }
        _ => None,
    }
}

/// Detects a row `e_j >= c + sum c_k e_k` with unit coefficient on `e_j`,
/// returning the column `j`.
fn pivot_column(row: &[i64]) -> Option<usize> {
    if row[0] > 0 {
        return None;
    }
    let mut pivot = None;
    for (j, &a) in row[1..].iter().enumerate() {
        if a > 0 {
            if a != 1 || pivot.is_some() {
                return None;
            }
            pivot = Some(j);
        }
    }
    pivot
}

fn render_rows(rows: &[Vec<i64>]) -> String {
    let body = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("; ");
    format!("[{body}]")
}

/// Outcome of normalizing a chart's cone conditions.
struct CleanedCone {
    /// Variables still carrying measure, in chart order.
    active: Vec<Var>,
    /// Conditions surviving the cleanup.
    conditions: Vec<ConeCondition>,
    /// The region is empty and the integral vanishes outright.
    vanishes: bool,
}

fn clean_cone_data(chart: &Chart) -> CleanedCone {
    let mut active = chart.variables.clone();
    let mut conditions = Vec::new();
    for condition in &chart.cone {
        if condition.lhs.is_one() {
            continue;
        }
        if condition.rhs.is_one() {
            let lhs_vars = condition.lhs.variables();
            if lhs_vars.contains(&field_var()) {
                return CleanedCone {
                    active: Vec::new(),
                    conditions: Vec::new(),
                    vanishes: true,
                };
            }
            active.retain(|v| !lhs_vars.contains(v));
            continue;
        }
        conditions.push(condition.clone());
    }
    CleanedCone {
        active,
        conditions,
        vanishes: false,
    }
}

fn cone_matrix(active: &[Var], conditions: &[ConeCondition]) -> ConeMatrix {
    let mut matrix = ConeMatrix::orthant(active.len());
    let p = field_var();
    for condition in conditions {
        let mut row = vec![0i64; active.len() + 1];
        row[0] = side_degree(&condition.rhs, &p) - side_degree(&condition.lhs, &p);
        for (j, v) in active.iter().enumerate() {
            row[j + 1] = side_degree(&condition.rhs, v) - side_degree(&condition.lhs, v);
        }
        matrix.push_row(row);
    }
    matrix
}

/// Degree of a factored product in one variable, exponents included.
fn side_degree(side: &Factored, v: &Var) -> i64 {
    side.factors
        .iter()
        .map(|(base, exp)| exp * base.degree_in(v))
        .sum()
}

/// Substitution image `p^(-a-1) t^b` for a variable weighted
/// `|x|^(a + b s)` by the integrand.
fn power_image(exponents: TermExponents) -> Poly {
    Poly::monomial(Monomial::from_exponents([
        (field_var(), -exponents.constant - 1),
        (twist_var(), exponents.parameter),
    ]))
}

/// Haar measure of the unit group to the `count`th power, `(1 - p^-1)^count`.
fn unit_measure(count: usize) -> Poly {
    let unit = &Poly::one() - &Poly::monomial(Monomial::from_exponents([(field_var(), -1)]));
    unit.pow(count as u32)
}

/// Assembles monomial chart integrals into rational functions of the
/// field-size and twist symbols.
pub struct GeneratingFunctionAssembler {
    solver: Box<dyn ConeSolver>,
    rng: StdRng,
}

impl GeneratingFunctionAssembler {
    /// Assembler backed by the built-in [`SubstitutionSolver`].
    pub fn new() -> Self {
        GeneratingFunctionAssembler {
            solver: Box::new(SubstitutionSolver),
            rng: StdRng::from_entropy(),
        }
    }

    /// Replaces the cone series solver.
    pub fn with_solver(mut self, solver: Box<dyn ConeSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Seeds the substitution-order shuffle, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Integral of `integrand` over the valuation region of `chart`.
    ///
    /// The chart must be monomial. Returns the reduced rational function
    /// in the field-size and twist symbols.
    pub fn chart_integral(
        &mut self,
        chart: &Chart,
        integrand: &Integrand,
    ) -> Result<RatFn, GenFunError> {
        let cleaned = clean_cone_data(chart);
        if cleaned.vanishes {
            debug!(chart = %chart.id, "cone forces the uniformizer to be a unit, integral is zero");
            return Ok(RatFn::zero());
        }
        let matrix = cone_matrix(&cleaned.active, &cleaned.conditions);
        let mut used: BTreeSet<Var> = chart.variable_set();
        used.insert(field_var());
        used.insert(twist_var());
        let symbols = fresh_names("Z", cleaned.active.len(), &used);
        debug!(
            chart = %chart.id,
            active = cleaned.active.len(),
            rows = matrix.rows().len(),
            "solving cone series"
        );
        let series = self.solver.generating_function(&matrix, &symbols)?;

        let images: BTreeMap<Var, Poly> = symbols
            .iter()
            .zip(&cleaned.active)
            .map(|(z, x)| (z.clone(), power_image(integrand.variable_exponents(x))))
            .collect();
        let substituted = match series.substitute(&images) {
            Ok(s) => s,
            Err(SymbolicError::VanishingDenominator) => {
                debug!(
                    chart = %chart.id,
                    "one-shot substitution vanished a denominator, searching prefix orders"
                );
                self.prefix_substitution(&series, &images)?
            }
            Err(err) => return Err(err.into()),
        };

        let outside = integrand.p_factor()?;
        let weighted = substituted
            .mul_poly(outside.numerator())
            .div_poly(outside.denominator())
            .mul_poly(&unit_measure(cleaned.active.len()));
        Ok(weighted.reduce().into_ratfn()?.reduce())
    }

    /// Randomized partial-substitution search for removable singularities.
    ///
    /// Shuffles the substitution keys, applies the longest prefix that
    /// stays finite, keeps the attempt leaving the fewest free variables,
    /// cancels, and finishes with the remaining images.
    fn prefix_substitution(
        &mut self,
        series: &Series,
        images: &BTreeMap<Var, Poly>,
    ) -> Result<Series, GenFunError> {
        let pairs: Vec<(Var, Poly)> = images
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut best = (usize::MAX, series.clone(), pairs.clone());
        for _ in 0..SUBSTITUTION_ATTEMPTS {
            let mut order = pairs.clone();
            order.shuffle(&mut self.rng);
            let mut current = series.clone();
            let mut applied = 0;
            for (key, image) in &order {
                let single = BTreeMap::from([(key.clone(), image.clone())]);
                match current.substitute(&single) {
                    Ok(next) => {
                        current = next;
                        applied += 1;
                    }
                    Err(_) => break,
                }
            }
            let free = current.variables().len();
            if free < best.0 {
                best = (free, current, order[applied..].to_vec());
            }
        }
        let (_, partial, remaining) = best;
        let simplified = partial.reduce();
        let rest: BTreeMap<Var, Poly> = remaining.into_iter().collect();
        Ok(simplified.substitute(&rest)?)
    }
}

impl Default for GeneratingFunctionAssembler {
    fn default() -> Self {
        Self::new()
    }
}
