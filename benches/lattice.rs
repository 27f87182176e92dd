//! Performance benchmarks for the lattice and counting hot paths.
//!
//! Run with: `cargo bench --bench lattice`

use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput,
};

use zeta_atlas::{
    canonicalize, ChartId, CountCache, IntersectionLattice, PointCounter, Poly, Var, Vertex,
};

fn divisor(i: usize) -> Poly {
    Poly::var(Var::new(format!("d{i}")))
}

/// Boolean lattice over `n` coordinate divisors with derived edges.
fn boolean_lattice(n: usize) -> IntersectionLattice {
    let divisors: Vec<Poly> = (0..n).map(divisor).collect();
    let vertices: Vec<Vertex> = (0..1usize << n)
        .map(|mask| Vertex::from_indices((0..n).filter(|i| mask >> i & 1 == 1)))
        .collect();
    IntersectionLattice::new(divisors, vertices, Vec::new(), Vec::new()).unwrap()
}

/// Benchmark lattice assembly, which validates the covering structure.
fn bench_lattice_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("lattice_assembly");

    for n in [4, 6, 8] {
        group.throughput(Throughput::Elements(1u64 << n));
        group.bench_with_input(BenchmarkId::new("divisors", n), &n, |b, &n| {
            b.iter(|| boolean_lattice(black_box(n)))
        });
    }

    group.finish();
}

/// Benchmark the inclusion-exclusion sweep over the covering graph.
fn bench_adjusted_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjusted_counts");

    for n in [4, 6, 8] {
        let lattice = boolean_lattice(n);
        let mut counter = PointCounter::new(CountCache::new());
        let raw = lattice
            .raw_counts(&mut counter, &ChartId::from_number(1))
            .unwrap();

        group.throughput(Throughput::Elements(1u64 << n));
        group.bench_with_input(
            BenchmarkId::new("vertices", 1usize << n),
            &raw,
            |b, raw| b.iter(|| lattice.adjusted_counts(black_box(raw))),
        );
    }

    group.finish();
}

/// Benchmark linear-system elimination in the point counter.
fn bench_linear_counting(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear_counting");

    for n in [4usize, 8, 16] {
        let system: Vec<Poly> = (0..n).map(|i| divisor(i) - Poly::one()).collect();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("equations", n), &system, |b, system| {
            b.iter(|| {
                let mut counter = PointCounter::new(CountCache::new());
                counter.count(n, black_box(system), "bench").unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark canonicalization, which runs before every cache probe.
fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");

    for k in [1usize, 4, 8] {
        let system: Vec<Poly> = (0..k)
            .map(|i| {
                Poly::var(Var::new(format!("a{i}"))) * Poly::var(Var::new(format!("b{i}")))
                    - Poly::one()
            })
            .collect();

        group.throughput(Throughput::Elements(k as u64));
        group.bench_with_input(BenchmarkId::new("equations", k), &system, |b, system| {
            b.iter(|| canonicalize(black_box(system)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_lattice_assembly,
    bench_adjusted_counts,
    bench_linear_counting,
    bench_canonicalize,
);
criterion_main!(benches);
