//! Chart construction from engine payloads.
//!
//! ## Loading sequence
//!
//! Loading a chart mirrors an interactive engine session: load the
//! chart and lattice procedure libraries from the parent directory, run
//! the chart procedure, then parse each printed field. The intersection
//! lattice is requested afterwards, and only for charts whose ambient
//! space is plain affine space; the lattice construction procedure does
//! not handle a nontrivial ambient factor.

use thiserror::Error;
use tracing::{debug, warn};

use super::{
    AlgebraEngine, EngineError, LatticePayload, CHART_LIBRARY, LATTICE_LIBRARY,
};
use crate::symbolic::{
    parse_bracketed, parse_expr, parse_ring, parse_wrapped_list, Factored, Factorizer, ListNode,
    ParseError, Poly,
};
use crate::types::{Chart, ChartId, ConeCondition, IntersectionLattice, LatticeError, Vertex};

/// Errors turning an engine payload into a [`Chart`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// An engine request failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A payload field failed to parse.
    #[error("cannot parse {field} payload")]
    Parse {
        /// Which payload field was being parsed.
        field: &'static str,
        /// The parser's complaint.
        #[source]
        source: ParseError,
    },
    /// A cone entry did not come as a pair of sides.
    #[error("cone entry {index} is not a pair of sides")]
    ConePair {
        /// 0-based position of the offending entry.
        index: usize,
    },
    /// A lattice numeric row held a non-integer token.
    #[error("lattice {field} row `{row}` is not a list of integers")]
    LatticeRow {
        /// Which payload field the row came from.
        field: &'static str,
        /// The offending row text.
        row: String,
    },
    /// A lattice edge row did not hold exactly two 1-based indices.
    #[error("lattice edge row {row:?} is not a pair of vertex indices")]
    EdgeRow {
        /// The offending row.
        row: Vec<i64>,
    },
    /// The parsed rows do not assemble into a lattice.
    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

/// Loads chart `number` from the resolution files in `directory`.
///
/// The directory may carry a trailing slash; engine requests use the
/// stripped form. `get_lattice` controls whether the intersection
/// lattice is requested at all, which the root chart never needs.
pub fn load_chart(
    engine: &mut dyn AlgebraEngine,
    factorizer: &Factorizer,
    number: u64,
    directory: &str,
    get_lattice: bool,
) -> Result<Chart, LoadError> {
    let directory = directory.strip_suffix('/').unwrap_or(directory).to_string();
    let parent = super::parent_directory(&directory);
    for library in [CHART_LIBRARY, LATTICE_LIBRARY] {
        let path = format!("{parent}{library}");
        debug!(library = %path, "loading engine library");
        engine.load_library(&path)?;
    }

    let payload = engine.chart_payload(number, &directory)?;

    let ring = parse_ring(&payload.ring).map_err(|source| LoadError::Parse {
        field: "ring",
        source,
    })?;

    let ambient_factor = parse_ambient(&payload.ambient_factor)?;
    if !ambient_factor.is_empty() {
        warn!(chart = number, "ambient space not necessarily affine");
    }

    let birational_map = poly_entries("birational map", &payload.birational_map)?
        .iter()
        .map(|poly| factorizer.factor(poly))
        .collect();
    let center = poly_entries("center", &payload.center)?;
    let cone = parse_cone(&payload.cone, factorizer)?;

    let mut exceptional_divisors = Vec::with_capacity(payload.divisors.len());
    for group in &payload.divisors {
        exceptional_divisors.push(poly_entries("divisors", group)?);
    }

    let jacobian = parse_jacobian(number, &payload.jacobian, factorizer)?;

    let last_map = if payload.last_map.trim().is_empty() {
        None
    } else {
        Some(poly_entries("last map", &payload.last_map)?)
    };
    let focus = poly_entries("focus", &payload.focus)?;

    let lattice = if get_lattice && ambient_factor.is_empty() {
        let rows = engine.lattice_payload(number, &directory)?;
        let mut lattice = parse_lattice(&rows)?;
        lattice.merge_focus(&focus);
        Some(lattice)
    } else {
        if get_lattice {
            warn!(
                chart = number,
                "cannot build an intersection lattice over a nontrivial ambient space"
            );
        }
        None
    };

    let chart = Chart {
        id: ChartId::from_number(number),
        coefficients: ring.coefficients,
        variables: ring.variables,
        birational_map,
        center,
        cone,
        exceptional_divisors,
        ambient_factor,
        focus,
        jacobian,
        last_map,
        lattice,
        integral_factor: Poly::one(),
        parent: None,
        directory: Some(directory),
        subcharts: None,
    };
    debug!(
        chart = %chart.id,
        variables = chart.dimension(),
        cone = chart.cone.len(),
        lattice = chart.lattice.is_some(),
        "loaded chart"
    );
    Ok(chart)
}

/// Splits a printout into expression entries: one per line, wrapping
/// commas stripped, blank lines dropped.
fn poly_entries(field: &'static str, text: &str) -> Result<Vec<Poly>, LoadError> {
    text.lines()
        .map(|line| line.trim().trim_end_matches(','))
        .filter(|line| !line.is_empty())
        .map(|line| parse_expr(line).map_err(|source| LoadError::Parse { field, source }))
        .collect()
}

/// Ambient-space equations. The engine prints the single line `0` for a
/// plain affine chart.
fn parse_ambient(text: &str) -> Result<Vec<Poly>, LoadError> {
    let first = text.lines().map(str::trim).find(|line| !line.is_empty());
    match first {
        None | Some("0") => Ok(Vec::new()),
        Some(_) => poly_entries("ambient factor", text),
    }
}

fn parse_cone(text: &str, factorizer: &Factorizer) -> Result<Vec<ConeCondition>, LoadError> {
    let node = parse_bracketed(text);
    let entries = match &node {
        ListNode::List(entries) => entries.as_slice(),
        ListNode::Leaf(body) if body.is_empty() => &[],
        ListNode::Leaf(_) => return Err(LoadError::ConePair { index: 0 }),
    };
    let mut cone = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Some([lhs, rhs]) = entry.as_list().and_then(|pair| <&[ListNode; 2]>::try_from(pair).ok())
        else {
            return Err(LoadError::ConePair { index });
        };
        cone.push(ConeCondition {
            lhs: cone_side(lhs, index, factorizer)?,
            rhs: cone_side(rhs, index, factorizer)?,
        });
    }
    Ok(cone)
}

/// One cone side: parsed, fully factored, and sign-normalized, since
/// only the valuation of the side matters.
fn cone_side(
    node: &ListNode,
    index: usize,
    factorizer: &Factorizer,
) -> Result<Factored, LoadError> {
    let text = node.as_leaf().ok_or(LoadError::ConePair { index })?;
    let poly = parse_expr(text).map_err(|source| LoadError::Parse {
        field: "cone",
        source,
    })?;
    Ok(factorizer.factor(&poly).abs())
}

/// The Jacobian determinant, sign-normalized. An engine run that never
/// defined one, which is the normal state for the root chart, yields 1.
fn parse_jacobian(
    number: u64,
    text: &str,
    factorizer: &Factorizer,
) -> Result<Factored, LoadError> {
    let body: String = text
        .lines()
        .map(|line| line.trim().trim_end_matches(','))
        .collect();
    if body.is_empty() {
        debug!(chart = number, "engine defines no Jacobian, defaulting to 1");
        return Ok(Factored::one());
    }
    let poly = parse_expr(&body).map_err(|source| LoadError::Parse {
        field: "jacobian",
        source,
    })?;
    Ok(factorizer.factor(&poly).abs())
}

fn parse_lattice(payload: &LatticePayload) -> Result<IntersectionLattice, LoadError> {
    let vertex_rows = int_rows("vertex", &payload.vertices)?;
    let components = int_rows("component", &payload.components)?;
    let edge_rows = int_rows("edge", &payload.edges)?;

    let mut entries = parse_wrapped_list(&payload.divisors);
    if entries.is_empty() {
        entries = payload
            .divisors
            .lines()
            .map(|line| line.trim().trim_end_matches(',').to_string())
            .filter(|line| !line.is_empty())
            .collect();
    }
    let divisors = entries
        .iter()
        .map(|entry| {
            parse_expr(entry).map_err(|source| LoadError::Parse {
                field: "lattice divisors",
                source,
            })
        })
        .collect::<Result<Vec<Poly>, LoadError>>()?;

    // a positive flag marks the divisor as present on the vertex
    let vertices: Vec<Vertex> = vertex_rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(_, &flag)| flag > 0)
                .map(|(i, _)| i)
                .collect()
        })
        .collect();

    let mut edges = Vec::with_capacity(edge_rows.len());
    for row in edge_rows {
        if row.len() != 2 || row[0] < 1 || row[1] < 1 {
            return Err(LoadError::EdgeRow { row });
        }
        edges.push(((row[0] - 1) as usize, (row[1] - 1) as usize));
    }

    Ok(IntersectionLattice::new(
        divisors, vertices, edges, components,
    )?)
}

/// Numeric rows: one per line, comma or whitespace separated; `[k]:`
/// index headers between rows are skipped.
fn int_rows(field: &'static str, text: &str) -> Result<Vec<Vec<i64>>, LoadError> {
    let mut rows = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || is_index_header(line) {
            continue;
        }
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| token.parse::<i64>())
            .collect::<Result<Vec<i64>, _>>()
            .map_err(|_| LoadError::LatticeRow {
                field,
                row: line.to_string(),
            })?;
        rows.push(row);
    }
    Ok(rows)
}

fn is_index_header(line: &str) -> bool {
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix("]:"))
        .is_some_and(|key| !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()))
}
