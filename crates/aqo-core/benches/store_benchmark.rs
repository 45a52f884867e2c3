//! Benchmarks for the shared learning store's hot paths: concurrent
//! `(fs, fss)` entry lookups and updates.

use std::sync::Arc;
use std::thread;

use aqo_core::config::StoreConfig;
use aqo_core::knn::KnnParams;
use aqo_core::store::Store;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const COLS: usize = 4;

fn features(seed: u64) -> Vec<f64> {
    (0..COLS as u64).map(|i| ((seed + i) % 17) as f64 * 0.37).collect()
}

fn seeded_store(entries: u64) -> Store {
    let store = Store::new(StoreConfig::default());
    let params = KnnParams::default();
    for fss in 0..entries as i32 {
        store
            .with_data_entry(1, fss, COLS, |entry| {
                entry.matrix.learn(&features(fss as u64), 10.0, 1.0, &params);
            })
            .unwrap();
    }
    store
}

fn bench_data_matrix_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_data_matrix");

    for entries in [10, 100, 1_000] {
        let store = seeded_store(entries);

        group.bench_with_input(BenchmarkId::from_parameter(entries), &store, |b, store| {
            b.iter(|| black_box(store.data_matrix(1, (entries / 2) as i32)));
        });
    }

    group.finish();
}

fn bench_with_data_entry_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_with_data_entry");
    let params = KnnParams::default();

    group.bench_function("learn_existing_entry", |b| {
        let store = seeded_store(1);
        b.iter(|| {
            store
                .with_data_entry(1, 0, COLS, |entry| {
                    entry.matrix.learn(&features(1), 11.0, 1.0, &params);
                })
                .unwrap();
        });
    });

    group.finish();
}

fn bench_concurrent_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_concurrent");

    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let store = Arc::new(seeded_store(100));
                let params = KnnParams::default();
                thread::scope(|scope| {
                    for t in 0..threads {
                        let store = Arc::clone(&store);
                        let params = params;
                        scope.spawn(move || {
                            for i in 0..50u64 {
                                let fss = ((t as u64 * 50 + i) % 100) as i32;
                                store
                                    .with_data_entry(1, fss, COLS, |entry| {
                                        entry.matrix.learn(&features(i), 3.0, 1.0, &params);
                                    })
                                    .unwrap();
                            }
                        });
                    }
                });
                black_box(store)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_data_matrix_lookup,
    bench_with_data_entry_write,
    bench_concurrent_access,
);
criterion_main!(benches);
