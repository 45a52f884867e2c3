//! A minimal fake planner/executor, for driving the predictor end to end
//! without a real query engine attached.
//!
//! Synthesizes one equality clause per simulated relation, asks
//! [`aqo_core::predict`] for an estimate, then immediately "executes" the
//! node against a caller-supplied actual row count and feeds the result
//! back through [`aqo_core::learn`]. Exists for `aqo-server`'s demo
//! endpoint and its own integration tests; no real plan tree ever passes
//! through this module.

use aqo_core::config::AqoConfig;
use aqo_core::hash::{ClauseInput, Expr, RelationSignature};
use aqo_core::learn::{learn_node, ExecutionOutcome};
use aqo_core::predict::{predict_for_node, Prediction};
use aqo_core::{LearnCache, Store};

/// The outcome of one simulated predict-then-learn cycle.
#[derive(Debug, Clone, Copy)]
pub struct DemoCycle {
    /// Feature-sub-space the simulated node hashed to, if it had any
    /// relations to hash.
    pub fss: Option<i32>,
    /// The predictor's estimate, if it had enough history to produce one.
    pub predicted_rows: Option<f64>,
    /// The row count the fake executor reported.
    pub actual_rows: f64,
}

/// Builds `relation_count` synthetic equality clauses (`var_i = $1`) over
/// that many distinct relations, predicts against them, "executes" the
/// node by reporting `actual_rows`, and learns from the result.
pub fn run_demo_cycle(
    store: &Store,
    cache: &LearnCache,
    fs: u64,
    relation_count: u32,
    actual_rows: f64,
    config: &AqoConfig,
) -> DemoCycle {
    let relation_count = relation_count.max(1);
    let clause_exprs: Vec<Expr> = (0..relation_count)
        .map(|i| Expr::BinaryOp {
            op: 1,
            left: Box::new(Expr::Var(u64::from(i))),
            right: Box::new(Expr::Constant),
        })
        .collect();
    let clauses: Vec<ClauseInput<'_>> = clause_exprs
        .iter()
        .map(|expr| ClauseInput {
            expr,
            is_eq_clause: false,
            selectivity: 0.1,
        })
        .collect();
    let relations: Vec<RelationSignature> = (0..relation_count)
        .map(|i| RelationSignature::Permanent(i as i32))
        .collect();

    let prediction = predict_for_node(
        store,
        fs,
        &relations,
        &clauses,
        &[],
        &config.predict,
        &config.learning,
    );

    let outcome = ExecutionOutcome {
        ntuples: actual_rows,
        nloops: 1.0,
        workers: None,
    };

    let _ = learn_node(
        store,
        cache,
        fs,
        &prediction,
        &outcome,
        true,
        false,
        actual_rows,
        &config.learning,
        &config.predict,
        &config.timeout,
    );

    let predicted_rows = match prediction.cardinality {
        Prediction::Rows(rows) => Some(rows),
        Prediction::Refused => None,
    };

    DemoCycle {
        fss: prediction.fss,
        predicted_rows,
        actual_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqo_core::config::StoreConfig;

    #[test]
    fn repeated_cycles_eventually_predict() {
        let store = Store::new(StoreConfig::default());
        let cache = LearnCache::new();
        let config = AqoConfig::default();

        let mut last = None;
        for _ in 0..5 {
            last = Some(run_demo_cycle(&store, &cache, 1, 1, 42.0, &config));
        }

        let last = last.unwrap();
        assert!(last.fss.is_some());
        assert!(last.predicted_rows.is_some());
    }
}
