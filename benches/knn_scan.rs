// kNN Scan Performance Benchmarks
// Compares sequential and parallel brute-force scans over a vector column
// at a few dataset sizes and worker counts.

use cottontaildb::column::StorageVariant;
use cottontaildb::config::Config;
use cottontaildb::entity::{ColumnDef, Entity};
use cottontaildb::execution::{parallel_entity_scan_knn, sequential_entity_scan_knn};
use cottontaildb::knn::Metric;
use cottontaildb::value::{Value, ValueType};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSIONS: usize = 32;

fn build_entity(rows: usize) -> (TempDir, Arc<Entity>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let defs = vec![ColumnDef::new("embedding", ValueType::FloatVector(DIMENSIONS), false)];
    let entity = Entity::create(dir.path(), "vectors", defs, Config::default(), StorageVariant::WriteAheadLogged)
        .expect("create entity");

    let tx = entity.begin(None, false).expect("begin write tx");
    for i in 0..rows {
        let vector: Vec<f32> = (0..DIMENSIONS).map(|d| ((i + d) % 997) as f32).collect();
        tx.insert(vec![Some(Value::FloatVector(vector))]).expect("insert");
    }
    tx.commit().expect("commit");
    (dir, entity)
}

fn bench_sequential_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_knn_scan");
    for &rows in &[1_000usize, 10_000] {
        let (_dir, entity) = build_entity(rows);
        let tx = entity.begin(None, true).expect("begin read tx");
        let query = vec![vec![0.0f64; DIMENSIONS]];

        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| {
                let result = sequential_entity_scan_knn(
                    "vectors",
                    &tx,
                    "embedding",
                    &query,
                    black_box(10),
                    Metric::L2,
                    None,
                )
                .expect("sequential scan");
                black_box(result);
            });
        });
    }
    group.finish();
}

fn bench_parallel_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_knn_scan");
    let (_dir, entity) = build_entity(20_000);
    let tx = entity.begin(None, true).expect("begin read tx");
    let query = vec![vec![0.0f64; DIMENSIONS]];

    for &workers in &[1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| {
                let result = parallel_entity_scan_knn(
                    "vectors",
                    &tx,
                    "embedding",
                    &query,
                    black_box(10),
                    Metric::L2,
                    None,
                    workers,
                )
                .expect("parallel scan");
                black_box(result);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sequential_scan, bench_parallel_scan);
criterion_main!(benches);
