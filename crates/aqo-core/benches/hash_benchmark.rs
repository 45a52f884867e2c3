//! Benchmarks for expression hashing and feature sub-space computation.

use aqo_core::hash::{fss_for_object, ClauseInput, EquivalenceClass, Expr, RelationSignature};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn eq_clause(var: u64) -> Expr {
    Expr::BinaryOp {
        op: 1,
        left: Box::new(Expr::Var(var)),
        right: Box::new(Expr::Constant),
    }
}

fn join_clause(left: u64, right: u64) -> Expr {
    Expr::BinaryOp {
        op: 2,
        left: Box::new(Expr::Var(left)),
        right: Box::new(Expr::Var(right)),
    }
}

fn bench_node_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_hash");

    for width in [1, 4, 16] {
        let expr = (0..width).fold(Expr::Constant, |acc, i| Expr::BinaryOp {
            op: 3,
            left: Box::new(acc),
            right: Box::new(Expr::Var(i)),
        });

        group.bench_with_input(BenchmarkId::from_parameter(width), &expr, |b, expr| {
            b.iter(|| black_box(expr.node_hash()));
        });
    }

    group.finish();
}

fn bench_fss_for_object(c: &mut Criterion) {
    let mut group = c.benchmark_group("fss_for_object");

    for clause_count in [1, 8, 32] {
        let exprs: Vec<Expr> = (0..clause_count).map(|i| eq_clause(i as u64)).collect();
        let clauses: Vec<ClauseInput<'_>> = exprs
            .iter()
            .enumerate()
            .map(|(i, expr)| ClauseInput {
                expr,
                is_eq_clause: false,
                selectivity: 0.1 + (i as f64) * 0.01,
            })
            .collect();
        let relations = vec![RelationSignature::Permanent(1), RelationSignature::Permanent(2)];

        group.bench_with_input(
            BenchmarkId::from_parameter(clause_count),
            &clauses,
            |b, clauses| {
                b.iter(|| black_box(fss_for_object(&relations, clauses, &[], -30.0)));
            },
        );
    }

    group.finish();
}

fn bench_fss_with_join_and_eclasses(c: &mut Criterion) {
    let mut group = c.benchmark_group("fss_joins");

    let join = join_clause(1, 2);
    let eq = eq_clause(1);
    let clauses = vec![
        ClauseInput {
            expr: &join,
            is_eq_clause: true,
            selectivity: 0.3,
        },
        ClauseInput {
            expr: &eq,
            is_eq_clause: false,
            selectivity: 0.2,
        },
    ];
    let relations = vec![RelationSignature::Permanent(1), RelationSignature::Permanent(2)];
    let eclasses = vec![EquivalenceClass {
        member_arg_hashes: vec![100, 200, 300],
    }];

    group.bench_function("with_eclasses", |b| {
        b.iter(|| black_box(fss_for_object(&relations, &clauses, &eclasses, -30.0)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_node_hash,
    bench_fss_for_object,
    bench_fss_with_join_and_eclasses,
);
criterion_main!(benches);
