//! Benchmarks for the k-nearest-neighbour regressor's predict/learn paths.

use aqo_core::knn::{KnnMatrix, KnnParams};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const COLS: usize = 4;

fn features(seed: usize) -> Vec<f64> {
    (0..COLS).map(|i| ((seed + i) % 17) as f64 * 0.37).collect()
}

fn filled_matrix(rows: usize, params: &KnnParams) -> KnnMatrix {
    let mut matrix = KnnMatrix::new(COLS);
    for i in 0..rows {
        matrix.learn(&features(i), (i % 100) as f64, 1.0, params);
    }
    matrix
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_predict");
    let params = KnnParams::default();

    for rows in [1, 10, 30] {
        let matrix = filled_matrix(rows, &params);
        let query = features(rows / 2);

        group.bench_with_input(BenchmarkId::from_parameter(rows), &matrix, |b, matrix| {
            b.iter(|| black_box(matrix.predict(&query, &params)));
        });
    }

    group.finish();
}

fn bench_learn_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_learn_append");
    let params = KnnParams::default();

    group.bench_function("append_into_empty", |b| {
        b.iter_batched(
            || KnnMatrix::new(COLS),
            |mut matrix| {
                black_box(matrix.learn(&features(0), 42.0, 1.0, &params));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_learn_k_full_adjust(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_learn_k_full");
    let params = KnnParams::default();

    group.bench_function("adjust_at_capacity", |b| {
        b.iter_batched(
            || filled_matrix(params.matrix_capacity, &params),
            |mut matrix| {
                black_box(matrix.learn(&features(1), 7.0, 1.0, &params));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_predict, bench_learn_append, bench_learn_k_full_adjust);
criterion_main!(benches);
