//! The blow-up atlas and its zeta integral.
//!
//! An atlas is a directory of resolution data: an edge file describing
//! the blow-up tree, one chart file per vertex, and optional nested
//! subtrees in subdirectories. Loading walks the tree, pulls every leaf
//! chart through the algebra engine, and attaches the root integrand.
//!
//! ## The root integrand
//!
//! The root chart's variables fill a lower-triangular matrix row by
//! row. The diagonal entry of row `k` enters the integrand as
//! `|x|^(k - rows + s)` and the whole integral is normalized by
//! `(1 - p^-1)^-rows`, so that the unit box integrates to one.
//!
//! ## The fold
//!
//! Each leaf chart with an intersection lattice contributes one
//! integral. Monomial charts are integrated as they are; the rest are
//! split into monomial subcharts first, one per lattice vertex, each
//! weighted by its stratum's point count. The root integrand is pushed
//! through the chart's birational map and Jacobian before assembly, and
//! the contributions sum to a single rational function of the
//! field-size and twist symbols.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;

use num_integer::Roots;
use num_traits::{One, Signed};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::counting::PointCounter;
use crate::edges::{edge_path, EdgeError, EdgeGraph};
use crate::engine::{load_chart, AlgebraEngine, LoadError};
use crate::field_var;
use crate::genfun::{GenFunError, GeneratingFunctionAssembler};
use crate::monomialize::{subcharts, MonomializeError};
use crate::symbolic::{Factored, Factorizer, Poly, RatFn, SymbolicError, Var};
use crate::types::{Chart, ChartId, Integrand, TermExponents};

const INDENT: &str = "    ";

/// Failures while loading an atlas or folding its chart integrals.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// An edge file could not be read.
    #[error(transparent)]
    Edges(#[from] EdgeError),
    /// A chart failed to load or parse.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// A leaf vertex label does not name a chart.
    #[error("leaf vertex `{label}` does not name a chart")]
    LeafLabel {
        /// The offending vertex label.
        label: String,
    },
    /// The root variable count does not fill a triangular matrix.
    #[error("{count} variables do not fill a lower-triangular matrix")]
    NonTriangular {
        /// Number of root variables.
        count: usize,
    },
    /// A chart could not be split into monomial subcharts.
    #[error(transparent)]
    Monomialize(#[from] MonomializeError),
    /// A chart integral could not be assembled.
    #[error(transparent)]
    GenFun(#[from] GenFunError),
    /// A symbolic operation failed.
    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
}

/// Which end of the root variable list holds the diagonal entries of
/// the triangular layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RootConvention {
    /// Rows are listed from the first variable onward.
    #[default]
    LeadingTerm,
    /// Rows are listed from the last variable backward.
    TrailingTerm,
}

/// Builds the integrand on the root chart.
///
/// The variable count must be a triangular number `rows*(rows+1)/2`.
/// Row `k`'s diagonal entry contributes the term `|x|^(k - rows + s)`
/// and the outside factor `(1 - p^-1)^-rows` normalizes the unit box.
pub fn build_root_integrand(
    variables: &[Var],
    convention: RootConvention,
) -> Result<Integrand, AtlasError> {
    let n = variables.len();
    let square = 1 + 8 * n;
    let side = square.sqrt();
    if side * side != square {
        return Err(AtlasError::NonTriangular { count: n });
    }
    let rows = (side - 1) / 2;

    let mut ordered: Vec<&Var> = variables.iter().collect();
    if convention == RootConvention::TrailingTerm {
        ordered.reverse();
    }
    let mut terms = Vec::with_capacity(rows);
    for k in 0..rows {
        let diagonal = (k + 1) * (k + 2) / 2 - 1;
        terms.push((
            Poly::var(ordered[diagonal].clone()),
            TermExponents::new(k as i64 - rows as i64, 1),
        ));
    }
    let p = Poly::var(field_var());
    let unit_box = Poly::one() - p.pow_i64(-1)?;
    Ok(Integrand::new(
        terms,
        [(unit_box, TermExponents::new(-(rows as i64), 0))],
    ))
}

/// Rewrites an integrand on the root chart in the coordinates of
/// `chart`.
///
/// Term bases that are root variables are replaced by their birational
/// images factor by factor, scaling the exponent pair by each factor's
/// multiplicity. The Jacobian determinant enters with the twist-free
/// pair `(m, 0)` per factor, and a non-trivial point-count weight on
/// the chart joins the outside factors. Bases that are not root
/// variables pass through unchanged.
pub fn map_integrand(root_variables: &[Var], base: &Integrand, chart: &Chart) -> Integrand {
    let images: BTreeMap<Poly, &Factored> = root_variables
        .iter()
        .zip(&chart.birational_map)
        .map(|(v, image)| (Poly::var(v.clone()), image))
        .collect();

    let mut terms: Vec<(Poly, TermExponents)> = Vec::new();
    for (term, exponents) in base.terms() {
        let Some(image) = images.get(term) else {
            terms.push((term.clone(), exponents));
            continue;
        };
        let unit = image.unit.abs();
        if !unit.is_one() {
            terms.push((Poly::constant(unit), exponents));
        }
        for (factor, multiplicity) in &image.factors {
            terms.push((factor.clone(), exponents.scaled(*multiplicity)));
        }
    }

    if !chart.jacobian.is_one() {
        let unit = chart.jacobian.unit.abs();
        if !unit.is_one() {
            terms.push((Poly::constant(unit), TermExponents::new(1, 0)));
        }
        for (factor, multiplicity) in &chart.jacobian.factors {
            terms.push((factor.clone(), TermExponents::new(*multiplicity, 0)));
        }
    }

    let mut factors: Vec<(Poly, TermExponents)> =
        base.factors().map(|(b, e)| (b.clone(), e)).collect();
    if !chart.integral_factor.is_one() {
        factors.push((chart.integral_factor.clone(), TermExponents::new(1, 0)));
    }

    Integrand::new(terms, factors)
}

/// A loaded atlas: the blow-up tree, its leaf charts, and the root
/// integrand.
pub struct Atlas {
    /// Directory the atlas was loaded from, with a trailing slash.
    pub directory: String,
    /// The blow-up tree, nested subtree files spliced in.
    pub edges: EdgeGraph,
    /// Number of distinct charts in the tree.
    pub number_of_charts: usize,
    /// Leaf vertex ids, in order of first appearance.
    pub leaves: Vec<ChartId>,
    /// The root chart, loaded without a lattice.
    pub root: Chart,
    /// The leaf charts, in `leaves` order.
    pub charts: Vec<Chart>,
    /// The integrand on the root chart.
    pub integrand: Integrand,
    factorizer: Factorizer,
}

impl Atlas {
    /// Loads the atlas rooted in `directory`.
    ///
    /// Reads the edge file and any nested subtree edge files, loads the
    /// root chart without a lattice and every leaf chart with one, then
    /// builds the root integrand.
    pub fn load(
        engine: &mut dyn AlgebraEngine,
        directory: &str,
        convention: RootConvention,
    ) -> Result<Atlas, AtlasError> {
        let directory = if directory.ends_with('/') {
            directory.to_string()
        } else {
            format!("{directory}/")
        };
        info!(directory = %directory, "loading atlas");

        let edges = load_edge_tree(&directory)?;
        let number_of_charts = edges.total_charts();
        let leaves = edges.leaves();
        let factorizer = Factorizer::default();

        let root = load_chart(engine, &factorizer, 1, &directory, false)?;
        let mut charts = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            charts.push(load_leaf(engine, &factorizer, leaf, &directory)?);
        }
        let integrand = build_root_integrand(&root.variables, convention)?;
        info!(
            charts = number_of_charts,
            leaves = leaves.len(),
            "atlas loaded"
        );

        Ok(Atlas {
            directory,
            edges,
            number_of_charts,
            leaves,
            root,
            charts,
            integrand,
            factorizer,
        })
    }

    /// The factorization memo shared by loading and splitting.
    pub fn factorizer(&self) -> &Factorizer {
        &self.factorizer
    }

    /// Sums the integrals of every leaf chart carrying an intersection
    /// lattice.
    ///
    /// Monomial charts are integrated whole. Any other chart is split
    /// into monomial subcharts first, which consults `counter` for the
    /// point count of each stratum. Charts without a lattice are
    /// skipped.
    pub fn zeta_integral(
        &mut self,
        counter: &mut PointCounter,
        assembler: &mut GeneratingFunctionAssembler,
    ) -> Result<RatFn, AtlasError> {
        let mut total = RatFn::zero();
        for chart in &mut self.charts {
            if chart.lattice.is_none() {
                warn!(chart = %chart.id, "chart has no intersection lattice, skipping");
                continue;
            }
            if chart.is_monomial() {
                debug!(chart = %chart.id, "chart is monomial, integrating whole");
                let mapped = map_integrand(&self.root.variables, &self.integrand, chart);
                total = total + assembler.chart_integral(chart, &mapped)?;
                continue;
            }
            let chart_id = chart.id.clone();
            let children = subcharts(chart, counter, &self.factorizer)?;
            info!(chart = %chart_id, integrals = children.len(), "solving subchart integrals");
            for child in children {
                let mapped = map_integrand(&self.root.variables, &self.integrand, child);
                total = total + assembler.chart_integral(child, &mapped)?;
            }
        }
        Ok(total.reduce())
    }
}

impl fmt::Display for Atlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ring, dimension) = match self.charts.first() {
            Some(chart) => (chart.coefficients.as_str(), chart.dimension()),
            None => (self.root.coefficients.as_str(), self.root.dimension()),
        };
        let integrals: usize = self
            .charts
            .iter()
            .map(|c| c.lattice.as_ref().map_or(0, |l| l.vertices().len()))
            .sum();
        writeln!(f, "An atlas over {ring} in {dimension} dimensions.")?;
        writeln!(f, "{INDENT}Directory: {}", self.directory)?;
        writeln!(f, "{INDENT}Number of charts: {}", self.number_of_charts)?;
        writeln!(f, "{INDENT}Number of leaves: {}", self.leaves.len())?;
        write!(f, "{INDENT}Number of integrals: {integrals}")
    }
}

/// Reads `<directory>/Edges` and splices in nested subtree files.
fn load_edge_tree(directory: &str) -> Result<EdgeGraph, AtlasError> {
    let graph = EdgeGraph::from_directory(directory)?;
    splice_nested(graph, directory)
}

/// Grafts the subtree of every leaf vertex `k` with an `Edges<k>` file,
/// descending into subtree directories.
fn splice_nested(mut graph: EdgeGraph, directory: &str) -> Result<EdgeGraph, AtlasError> {
    for leaf in graph.leaves() {
        let Ok(number) = leaf.as_str().parse::<u64>() else {
            continue;
        };
        let path = edge_path(directory, Some(number));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(source) if source.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => return Err(AtlasError::Edges(EdgeError::Io { path, source })),
        };
        debug!(path = %path, vertex = number, "splicing nested edge file");
        let nested = format!("{directory}{number}/");
        let subtree = splice_nested(EdgeGraph::parse(&text), &nested)?;
        graph.graft(&leaf, &subtree);
    }
    Ok(graph)
}

/// Loads the chart of a leaf vertex, descending through compound labels
/// into nested subtree directories.
fn load_leaf(
    engine: &mut dyn AlgebraEngine,
    factorizer: &Factorizer,
    leaf: &ChartId,
    directory: &str,
) -> Result<Chart, AtlasError> {
    match leaf.as_str().split_once('.') {
        None => {
            let number = leaf.as_str().parse::<u64>().map_err(|_| AtlasError::LeafLabel {
                label: leaf.to_string(),
            })?;
            Ok(load_chart(engine, factorizer, number, directory, true)?)
        }
        Some((parent, rest)) => {
            if parent.parse::<u64>().is_err() {
                return Err(AtlasError::LeafLabel {
                    label: leaf.to_string(),
                });
            }
            let nested = format!("{directory}{parent}/");
            let mut chart = load_leaf(engine, factorizer, &ChartId::new(rest), &nested)?;
            chart.id = leaf.clone();
            Ok(chart)
        }
    }
}
