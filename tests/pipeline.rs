//! End-to-end tests of the zeta pipeline: resolution files on disk, a
//! scripted algebra engine, and the fold from loading to the closing
//! rational function.
//!
//! Each test exercises the whole chain:
//! 1. Edge-file parsing and leaf discovery
//! 2. Chart and lattice loading through the engine
//! 3. Root integrand construction
//! 4. Monomial splitting and stratum counting where needed
//! 5. Cone series assembly and the final sum

use std::fs;
use std::path::PathBuf;

use zeta_atlas::{
    parse_expr, ring_printout, Atlas, ChartPayload, CountCache, GeneratingFunctionAssembler,
    LatticePayload, PointCounter, RatFn, RootConvention, ScriptedEngine, Var,
};

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

fn ratio(numerator: &str, denominator: &str) -> RatFn {
    RatFn::new(parse_expr(numerator).unwrap(), parse_expr(denominator).unwrap()).unwrap()
}

/// Writes edge files into a scratch directory and returns its path
/// without a trailing slash, which is also the form the engine doubles
/// are keyed under.
fn scratch_directory(name: &str, files: &[(&str, &str)]) -> String {
    let dir = std::env::temp_dir().join(name);
    fs::create_dir_all(&dir).unwrap();
    for (file, text) in files {
        fs::write(dir.join(file), text).unwrap();
    }
    dir.display().to_string()
}

fn remove_scratch(directory: &str, files: &[(&str, &str)]) {
    for (file, _) in files {
        fs::remove_file(PathBuf::from(directory).join(file)).ok();
    }
}

/// A cone group whose left side is 1; it holds everywhere and keeps the
/// payload shaped like real engine output.
fn trivial_cone(side: &str) -> String {
    format!("[1]:\n   [1]:\n      1\n   [2]:\n      {side}\n")
}

/// Root chart on the 2x2 lower-triangular matrix variables.
fn triangular_root() -> ChartPayload {
    ChartPayload {
        ring: ring_printout("QQ", &[Var::new("x11"), Var::new("x21"), Var::new("x22")]),
        ambient_factor: "0".to_string(),
        birational_map: "x11,\nx21,\nx22".to_string(),
        center: "x11".to_string(),
        cone: trivial_cone("x11"),
        ..ChartPayload::default()
    }
}

/// A leaf that changes nothing: identity map, unit Jacobian.
fn identity_leaf(cone: String) -> ChartPayload {
    ChartPayload {
        ring: ring_printout("QQ", &[Var::new("x11"), Var::new("x21"), Var::new("x22")]),
        ambient_factor: "0".to_string(),
        birational_map: "x11,\nx21,\nx22".to_string(),
        center: "x11".to_string(),
        cone,
        divisors: vec!["x11".to_string()],
        ..ChartPayload::default()
    }
}

/// Lattice with a single divisor: one proper vertex plus the dense one.
fn point_lattice() -> LatticePayload {
    LatticePayload {
        vertices: "1\n0".to_string(),
        components: "1\n1".to_string(),
        edges: String::new(),
        divisors: "_[1]=x11".to_string(),
    }
}

/// Captures pipeline logs for failing tests; filter with `RUST_LOG`.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn solved(
    engine: &mut ScriptedEngine,
    directory: &str,
) -> (Atlas, PointCounter, RatFn) {
    init_tracing();
    let mut atlas = Atlas::load(engine, directory, RootConvention::LeadingTerm).unwrap();
    let mut counter = PointCounter::new(CountCache::new());
    let mut assembler = GeneratingFunctionAssembler::new().with_seed(17);
    let zeta = atlas.zeta_integral(&mut counter, &mut assembler).unwrap();
    (atlas, counter, zeta)
}

// ─────────────────────────────────────────────────────────────────────────────
// Monomial charts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_monomial_atlas_folds_to_a_product_of_geometric_series() {
    let files = [("Edges", "1--2;\n")];
    let dir = scratch_directory("zeta_pipeline_monomial", &files);
    let mut engine = ScriptedEngine::new()
        .with_chart(&dir, 1, triangular_root())
        .with_chart(&dir, 2, identity_leaf(trivial_cone("x11")))
        .with_lattice(&dir, 2, point_lattice());

    let (atlas, _, zeta) = solved(&mut engine, &dir);

    assert_eq!(atlas.number_of_charts, 2);
    assert_eq!(atlas.leaves.len(), 1);
    assert_eq!(atlas.root.variables.len(), 3);
    // |x11|^(s-2) |x22|^(s-1) over the unit box: the diagonal entries
    // contribute geometric series, the off-diagonal entry integrates
    // away.
    assert!(zeta.equivalent(&ratio("1", "(1 - p*t)*(1 - t)")));

    // The root chart never asks for a lattice.
    assert!(engine
        .requests()
        .iter()
        .all(|request| request != &format!("lattice 1 {dir}")));
    remove_scratch(&dir, &files);
}

#[test]
fn test_cone_condition_couples_the_diagonal_entries() {
    let files = [("Edges", "1--2;\n")];
    let dir = scratch_directory("zeta_pipeline_cone", &files);
    let cone = format!(
        "{}{}",
        trivial_cone("x11"),
        "[2]:\n   [1]:\n      x11\n   [2]:\n      x22\n"
    );
    let mut engine = ScriptedEngine::new()
        .with_chart(&dir, 1, triangular_root())
        .with_chart(&dir, 2, identity_leaf(cone))
        .with_lattice(&dir, 2, point_lattice());

    let (_, _, zeta) = solved(&mut engine, &dir);

    // val(x11) <= val(x22) telescopes the two diagonal series.
    assert!(zeta.equivalent(&ratio("1", "(1 - p*t^2)*(1 - t)")));
    remove_scratch(&dir, &files);
}

// ─────────────────────────────────────────────────────────────────────────────
// Stratified charts
// ─────────────────────────────────────────────────────────────────────────────

/// Root chart on a single variable.
fn line_root() -> ChartPayload {
    ChartPayload {
        ring: ring_printout("QQ", &[Var::new("x")]),
        ambient_factor: "0".to_string(),
        birational_map: "x".to_string(),
        center: "x".to_string(),
        cone: trivial_cone("x"),
        ..ChartPayload::default()
    }
}

/// A leaf whose cone carries the binomial divisor x + y, so the chart
/// is not monomial and must be split along its lattice.
fn crossing_leaf() -> ChartPayload {
    ChartPayload {
        ring: ring_printout("QQ", &[Var::new("x"), Var::new("y")]),
        ambient_factor: "0".to_string(),
        birational_map: "x".to_string(),
        center: "x,\ny".to_string(),
        cone: "[1]:\n   [1]:\n      x + y\n   [2]:\n      1\n".to_string(),
        divisors: vec!["x".to_string(), "x + y".to_string()],
        ..ChartPayload::default()
    }
}

fn crossing_lattice() -> LatticePayload {
    LatticePayload {
        vertices: "1,0\n0,1\n1,1\n0,0".to_string(),
        components: "1\n1\n1\n1".to_string(),
        edges: "4,1\n4,2\n1,3\n2,3".to_string(),
        divisors: "_[1]=x\n_[2]=x+y".to_string(),
    }
}

#[test]
fn test_non_monomial_chart_splits_into_counted_strata() {
    let files = [("Edges", "1--2;\n")];
    let dir = scratch_directory("zeta_pipeline_strata", &files);
    let mut engine = ScriptedEngine::new()
        .with_chart(&dir, 1, line_root())
        .with_chart(&dir, 2, crossing_leaf())
        .with_lattice(&dir, 2, crossing_lattice());

    let (_, counter, zeta) = solved(&mut engine, &dir);

    // The two strata where x + y vanishes pull the uniformizer into a
    // unit condition and contribute nothing; the dense stratum and the
    // stratum of x alone sum to (1 - p^-1)/(1 - t).
    assert!(zeta.equivalent(&ratio("p - 1", "p - p*t")));
    // Every stratum system is linear, so elimination answered all
    // counts without consulting the cache or any backend.
    assert!(counter.cache().is_empty());
    remove_scratch(&dir, &files);
}

// ─────────────────────────────────────────────────────────────────────────────
// Nested subtrees
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_nested_subtree_loads_through_its_subdirectory() {
    let files = [("Edges", "1--2;\n"), ("Edges2", "1--3;\n")];
    let dir = scratch_directory("zeta_pipeline_nested", &files);
    let nested = format!("{dir}/2");
    let mut engine = ScriptedEngine::new()
        .with_chart(&dir, 1, triangular_root())
        .with_chart(&nested, 3, identity_leaf(trivial_cone("x11")))
        .with_lattice(&nested, 3, point_lattice());

    let (atlas, _, zeta) = solved(&mut engine, &dir);

    assert_eq!(atlas.number_of_charts, 3);
    assert_eq!(atlas.leaves.len(), 1);
    assert_eq!(atlas.leaves[0].as_str(), "2.3");
    assert_eq!(atlas.charts[0].id.as_str(), "2.3");
    assert!(zeta.equivalent(&ratio("1", "(1 - p*t)*(1 - t)")));

    // The root loads from the atlas directory, the leaf from the
    // grafted subtree's own subdirectory.
    let requests = engine.requests();
    let root_at = requests
        .iter()
        .position(|r| r == &format!("chart 1 {dir}"))
        .unwrap();
    let leaf_at = requests
        .iter()
        .position(|r| r == &format!("chart 3 {nested}"))
        .unwrap();
    assert!(root_at < leaf_at);
    assert!(requests.contains(&format!("lattice 3 {nested}")));

    let expected = format!(
        "An atlas over QQ in 3 dimensions.\n\
         \u{20}   Directory: {dir}/\n\
         \u{20}   Number of charts: 3\n\
         \u{20}   Number of leaves: 1\n\
         \u{20}   Number of integrals: 2"
    );
    assert_eq!(atlas.to_string(), expected);
    remove_scratch(&dir, &files);
}
