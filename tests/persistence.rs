//! Cross-session persistence: counts learned through the oracle in one
//! run answer from the saved cache in the next, with no backend
//! attached, and engine ring printouts survive the parser round trip.

use std::fs;
use std::path::PathBuf;

use zeta_atlas::{
    parse_expr, parse_ring, ring_printout, CountCache, OracleReply, PointCounter, Poly,
    QueueOracle, Var,
};

fn poly(text: &str) -> Poly {
    parse_expr(text).unwrap()
}

fn cache_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{name}-{}.json", std::process::id()))
}

#[test]
fn test_oracle_counts_answer_from_the_cache_next_run() {
    let system = [poly("x^2*y + z^3 + 1")];
    let oracle = QueueOracle::new([OracleReply::Answer("p^3 - p".to_string())]);
    let mut first = PointCounter::new(CountCache::new()).with_oracle(Box::new(oracle));
    assert_eq!(first.count(3, &system, "2.1").unwrap(), poly("p^3 - p"));
    assert_eq!(first.cache().len(), 1);

    let path = cache_path("zeta-atlas-session-cache");
    first.cache().save(&path).unwrap();
    let mut second = PointCounter::new(CountCache::load(&path).unwrap());
    fs::remove_file(&path).ok();

    // No toric backend and no oracle: only the cache can answer.
    assert_eq!(second.count(3, &system, "2.1").unwrap(), poly("p^3 - p"));
    assert_eq!(second.cache().len(), 1);
}

#[test]
fn test_reloaded_cache_only_answers_matching_shapes() {
    let oracle = QueueOracle::new([OracleReply::Answer("p + 7".to_string())]);
    let mut first = PointCounter::new(CountCache::new()).with_oracle(Box::new(oracle));
    first.count(2, &[poly("x^2 + y^3 - 1")], "3.1").unwrap();

    let path = cache_path("zeta-atlas-shape-cache");
    first.cache().save(&path).unwrap();
    let mut second = PointCounter::new(CountCache::load(&path).unwrap());
    fs::remove_file(&path).ok();

    // The same surface under other names still hits.
    assert_eq!(
        second.count(2, &[poly("u^2 + w^3 - 1")], "3.1").unwrap(),
        poly("p + 7")
    );
    // A different shape misses and falls through to a placeholder.
    assert_eq!(
        second.count(2, &[poly("u^3 + w^3 - 1")], "3.2").unwrap(),
        Poly::var(Var::new("C3_2"))
    );
}

#[test]
fn test_ring_printouts_survive_the_parser() {
    let variables = [Var::new("x11"), Var::new("x21"), Var::new("x22")];
    let ring = parse_ring(&ring_printout("QQ", &variables)).unwrap();
    assert_eq!(ring.coefficients, "QQ");
    assert_eq!(ring.variables, variables);
}
