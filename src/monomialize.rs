//! Splitting a chart into monomial subcharts.
//!
//! A chart whose cone data is not monomial cannot be integrated directly.
//! Its intersection lattice partitions the chart's points into strata,
//! one per vertex: on the stratum of a vertex exactly the divisors it
//! names vanish to positive valuation, while every other divisor is a
//! unit. Substituting `d -> p * z` for each vanishing divisor and `d -> 1`
//! for the units turns the birational map, the cone, and the Jacobian
//! into monomials in the fresh `z` variables. The change of variables
//! costs a Jacobian correction `p^b`, with `b` the number of chart
//! variables supporting the divisors, and each stratum's share of the
//! measure is its adjusted p-rational point count.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use crate::counting::{CountError, PointCounter};
use crate::field_var;
use crate::symbolic::{fresh_names, Factored, Factorizer, Poly, Var};
use crate::types::{Chart, ChartId, ConeCondition, Vertex};

/// Failures while splitting a chart along its intersection lattice.
#[derive(Debug, Error)]
pub enum MonomializeError {
    /// The chart carries no intersection lattice to split along.
    #[error("chart {chart} has no intersection lattice")]
    MissingLattice {
        /// The chart that cannot be split.
        chart: ChartId,
    },
    /// A stratum produced a subchart whose cone data is not monomial.
    #[error("subchart of {chart} at vertex {vertex} is not monomial")]
    NonMonomialSubchart {
        /// The chart being split.
        chart: ChartId,
        /// The offending lattice vertex.
        vertex: String,
    },
    /// Point counting on the lattice failed.
    #[error(transparent)]
    Count(#[from] CountError),
}

/// Returns the monomial subcharts of `chart`, one per lattice vertex.
///
/// Results are memoized on the chart. The first call counts the
/// p-rational points of every vertex and multiplies each subchart's
/// integral factor by the adjusted count of its stratum. Every returned
/// subchart is monomial; a stratum that fails to become monomial is a
/// fatal error, since it means the chart was not locally monomial to
/// begin with.
pub fn subcharts<'a>(
    chart: &'a mut Chart,
    counter: &mut PointCounter,
    factorizer: &Factorizer,
) -> Result<&'a [Chart], MonomializeError> {
    if chart.subcharts.is_none() {
        let id = chart.id.clone();
        let (counts, vertices, divisors) = {
            let Some(lattice) = chart.lattice.as_mut() else {
                return Err(MonomializeError::MissingLattice { chart: id });
            };
            let counts = lattice.p_rational_points(counter, &id)?.to_vec();
            (
                counts,
                lattice.vertices().to_vec(),
                lattice.divisors().to_vec(),
            )
        };
        debug!(chart = %id, strata = vertices.len(), "splitting into monomial subcharts");

        let mut subs = Vec::with_capacity(vertices.len());
        for (k, vertex) in vertices.iter().enumerate() {
            let mut sub = construct_subchart(chart, &divisors, vertex, factorizer);
            sub.integral_factor = &sub.integral_factor * &counts[k];
            if !sub.is_monomial() {
                return Err(MonomializeError::NonMonomialSubchart {
                    chart: id,
                    vertex: vertex.to_string(),
                });
            }
            debug!(subchart = %sub.id, variables = sub.dimension(), "constructed subchart");
            subs.push(sub);
        }
        chart.subcharts = Some(subs);
    }
    Ok(chart.subcharts.as_deref().unwrap_or_default())
}

/// Builds the subchart of the stratum where exactly the divisors named by
/// `vertex` vanish.
fn construct_subchart(
    chart: &Chart,
    divisors: &[Poly],
    vertex: &Vertex,
    factorizer: &Factorizer,
) -> Chart {
    let normalized: Vec<Poly> = divisors.iter().map(|d| d.primitive_parts().1).collect();
    let support: BTreeSet<Var> = normalized.iter().flat_map(|d| d.variables()).collect();

    let vanishing: Vec<usize> = vertex.indices().collect();
    let mut used = chart.variable_set();
    used.insert(field_var());
    let fresh = fresh_names("z", vanishing.len(), &used);

    let p = Poly::var(field_var());
    let replacements: BTreeMap<Poly, Poly> = vanishing
        .iter()
        .zip(&fresh)
        .map(|(&i, z)| (normalized[i].clone(), &p * &Poly::var(z.clone())))
        .collect();

    debug!(
        chart = %chart.id,
        vertex = %vertex,
        vanishing = vanishing.len(),
        units = divisors.len() - vanishing.len(),
        "rewriting chart data along the stratum"
    );

    // Divisor factors become p*z or drop to a unit; factors outside the
    // divisor support survive unchanged. A support-touching factor that
    // matches no divisor is a unit on the stratum by local monomiality.
    let rewrite_factor = |base: &Poly, exp: i64| -> Option<(Poly, i64)> {
        if base.variables().is_disjoint(&support) {
            Some((base.clone(), exp))
        } else {
            replacements.get(base).map(|image| (image.clone(), exp))
        }
    };
    let rewrite = |side: &Factored| -> Factored {
        let mut unit = side.unit.clone();
        let mut factors: Vec<(Poly, i64)> = Vec::new();
        for (base, exp) in &side.factors {
            let refined = factorizer.factor_with_hints(base, &normalized).pow(*exp);
            unit *= refined.unit;
            for (b, e) in &refined.factors {
                factors.extend(rewrite_factor(b, *e));
            }
        }
        Factored::new(unit, factors)
    };

    let birational_map: Vec<Factored> = chart.birational_map.iter().map(|f| rewrite(f)).collect();
    let cone: Vec<ConeCondition> = chart
        .cone
        .iter()
        .map(|c| ConeCondition {
            lhs: rewrite(&c.lhs),
            rhs: rewrite(&c.rhs),
        })
        .collect();
    let jacobian = rewrite(&chart.jacobian).mul_factor(p, support.len() as i64);

    let mut variables: BTreeSet<Var> = BTreeSet::new();
    for entry in birational_map.iter().chain([&jacobian]) {
        variables.extend(entry.variables());
    }
    for condition in &cone {
        variables.extend(condition.lhs.variables());
        variables.extend(condition.rhs.variables());
    }
    variables.remove(&field_var());

    Chart {
        id: chart.id.child(vertex.indices()),
        coefficients: chart.coefficients.clone(),
        variables: variables.into_iter().collect(),
        birational_map,
        center: chart.center.clone(),
        cone,
        exceptional_divisors: chart.exceptional_divisors.clone(),
        ambient_factor: chart.ambient_factor.clone(),
        focus: chart.focus.clone(),
        jacobian,
        last_map: chart.last_map.clone(),
        lattice: None,
        integral_factor: Poly::one(),
        parent: Some(chart.id.clone()),
        directory: chart.directory.clone(),
        subcharts: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::CountCache;
    use crate::symbolic::parse_expr;
    use crate::types::IntersectionLattice;

    fn poly(text: &str) -> Poly {
        parse_expr(text).unwrap()
    }

    fn names(list: &[&str]) -> Vec<Var> {
        list.iter().map(|n| Var::new(*n)).collect()
    }

    fn crossing_lattice() -> IntersectionLattice {
        IntersectionLattice::new(
            vec![poly("x"), poly("y")],
            vec![
                Vertex::empty(),
                Vertex::from_indices([0]),
                Vertex::from_indices([1]),
                Vertex::from_indices([0, 1]),
            ],
            vec![(1, 3), (2, 3)],
            Vec::new(),
        )
        .unwrap()
    }

    fn crossing_chart() -> Chart {
        Chart {
            id: ChartId::root(),
            coefficients: "QQ".into(),
            variables: names(&["x", "y"]),
            birational_map: vec![
                Factored::from_poly(poly("x")),
                Factored::from_poly(poly("y")),
            ],
            center: Vec::new(),
            cone: vec![ConeCondition {
                lhs: Factored::from_poly(poly("x*y")),
                rhs: Factored::from_poly(poly("x^2")),
            }],
            exceptional_divisors: Vec::new(),
            ambient_factor: Vec::new(),
            focus: Vec::new(),
            jacobian: Factored::one(),
            last_map: None,
            lattice: Some(crossing_lattice()),
            integral_factor: Poly::one(),
            parent: None,
            directory: None,
            subcharts: None,
        }
    }

    #[test]
    fn test_stratum_rewrites_divisors_to_fresh_variables() {
        let chart = crossing_chart();
        let divisors = vec![poly("x"), poly("y")];
        let factorizer = Factorizer::new(64);
        let sub = construct_subchart(
            &chart,
            &divisors,
            &Vertex::from_indices([0]),
            &factorizer,
        );

        assert_eq!(sub.id.as_str(), "11");
        assert_eq!(sub.variables, names(&["z1"]));
        // x -> p*z1, y -> unit
        assert_eq!(sub.birational_map[0].expand().unwrap(), poly("p*z1"));
        assert_eq!(sub.birational_map[1].expand().unwrap(), Poly::one());
        // x*y | x^2 becomes p*z1 | (p*z1)^2
        assert_eq!(sub.cone[0].lhs.expand().unwrap(), poly("p*z1"));
        assert_eq!(sub.cone[0].rhs.expand().unwrap(), poly("p^2*z1^2"));
        // Jacobian picks up p^2 from the two supporting variables.
        assert_eq!(sub.jacobian.expand().unwrap(), poly("p^2"));
        assert_eq!(sub.parent.as_ref().map(|p| p.as_str()), Some("1"));
        assert!(sub.is_monomial());
    }

    #[test]
    fn test_subcharts_weight_each_stratum_by_adjusted_count() {
        let mut chart = crossing_chart();
        let mut counter = PointCounter::new(CountCache::new());
        let factorizer = Factorizer::new(64);

        let subs = subcharts(&mut chart, &mut counter, &factorizer)
            .unwrap()
            .to_vec();
        assert_eq!(subs.len(), 4);
        // Adjusted counts on the crossing: (p-1)^2, p-1, p-1, 1.
        assert_eq!(subs[0].integral_factor, poly("p^2 - 2*p + 1"));
        assert_eq!(subs[1].integral_factor, poly("p - 1"));
        assert_eq!(subs[2].integral_factor, poly("p - 1"));
        assert_eq!(subs[3].integral_factor, Poly::one());
        assert!(subs.iter().all(|sub| sub.is_monomial()));
        assert_eq!(subs[3].variables, names(&["z1", "z2"]));
    }

    #[test]
    fn test_subcharts_are_memoized() {
        let mut chart = crossing_chart();
        let mut counter = PointCounter::new(CountCache::new());
        let factorizer = Factorizer::new(64);

        let first = subcharts(&mut chart, &mut counter, &factorizer)
            .unwrap()
            .to_vec();
        let again = subcharts(&mut chart, &mut counter, &factorizer)
            .unwrap()
            .to_vec();
        assert_eq!(first, again);
    }

    #[test]
    fn test_missing_lattice_is_reported() {
        let mut chart = crossing_chart();
        chart.lattice = None;
        let mut counter = PointCounter::new(CountCache::new());
        let factorizer = Factorizer::new(64);
        assert!(matches!(
            subcharts(&mut chart, &mut counter, &factorizer),
            Err(MonomializeError::MissingLattice { .. })
        ));
    }

    #[test]
    fn test_non_monomial_stratum_is_fatal() {
        let mut chart = crossing_chart();
        chart.variables = names(&["x", "y", "w"]);
        chart.cone.push(ConeCondition {
            lhs: Factored::from_poly(poly("w + 1")),
            rhs: Factored::from_poly(poly("x")),
        });
        let mut counter = PointCounter::new(CountCache::new());
        let factorizer = Factorizer::new(64);
        assert!(matches!(
            subcharts(&mut chart, &mut counter, &factorizer),
            Err(MonomializeError::NonMonomialSubchart { .. })
        ));
    }
}
