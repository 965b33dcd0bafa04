//! Benchmarks for the generation hot paths: batch materialization from a
//! finished distribution, the join-model search, and a whole fixture run.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;

use mirage_core::generate::{prepare, DataGenerator};
use mirage_core::output::BatchWriter;
use mirage_core::solver::{CpModel, CpSolver, SearchSolver, VarId};
use mirage_testutil::{shop_catalog, shop_chains, shop_settings};

fn bench_prepare_tuple_data(c: &mut Criterion) {
    let mut catalog = shop_catalog().unwrap();
    let mut chains = shop_chains();
    prepare(&mut catalog, &mut chains, &shop_settings(7000)).unwrap();
    let distribution = catalog
        .table("orders")
        .unwrap()
        .column("o_orderdate")
        .unwrap()
        .distribution()
        .unwrap()
        .clone();

    let mut group = c.benchmark_group("prepare_tuple_data");
    for batch in [1_000usize, 7_000, 50_000] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let mut distribution = distribution.clone();
            let mut rng = StdRng::seed_from_u64(1);
            b.iter(|| distribution.prepare_tuple_data(batch, &mut rng).unwrap());
        });
    }
    group.finish();
}

/// Row sums per status plus one cardinality window per joint, shaped like
/// a two-column join model.
fn join_model(statuses: usize, joints: usize, rows: i64) -> CpModel {
    let mut model = CpModel::new();
    let x: Vec<Vec<VarId>> = (0..statuses)
        .map(|_| (0..joints).map(|_| model.new_var(0, rows)).collect())
        .collect();
    let per_status = rows / statuses as i64;
    for row in &x {
        model.add_eq(row.iter().map(|&v| (v, 1)).collect(), per_status);
    }
    for j in 0..joints {
        let target = per_status * statuses as i64 / joints as i64;
        let terms = x.iter().map(|row| (row[j], 1)).collect();
        model.add_linear(terms, target - 2, target + 2);
    }
    model
}

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_model_search");
    for (statuses, joints) in [(4usize, 4usize), (8, 16), (16, 32)] {
        let model = join_model(statuses, joints, 7_000);
        let solver = SearchSolver::new(1, 1_000_000, 3);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", statuses, joints)),
            &model,
            |b, model| b.iter(|| solver.solve(model)),
        );
    }
    group.finish();
}

fn bench_generate_shop(c: &mut Criterion) {
    let settings = shop_settings(1_000);
    let mut catalog = shop_catalog().unwrap();
    let mut chains = shop_chains();
    prepare(&mut catalog, &mut chains, &settings).unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("generate");
    group.sample_size(10);
    group.throughput(Throughput::Elements(5_025));
    group.bench_function("shop", |b| {
        b.iter(|| {
            let dir = tempfile::tempdir().unwrap();
            let mut generator =
                DataGenerator::new(catalog.clone(), chains.clone(), settings.clone()).unwrap();
            let mut writer = BatchWriter::new(runtime.handle().clone(), dir.path());
            generator.run(&mut writer, None).unwrap();
            writer.finish().unwrap()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_prepare_tuple_data,
    bench_solver,
    bench_generate_shop
);
criterion_main!(benches);
