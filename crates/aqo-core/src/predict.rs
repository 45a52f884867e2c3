//! Prediction pipeline: turns a plan node's clauses and relations into a
//! cardinality estimate, or a principled refusal when there isn't enough
//! history to trust one.
//!
//! Ported from `predict_for_relation` in `cardinality_estimation.c`: refuse
//! outright for a node with no underlying relations, otherwise hash the
//! node into its feature sub-space, try the exact `(fs, fss)` entry, fall
//! back to a wide search across matching `fss` in other feature spaces if
//! configured, and refuse if nothing usable turns up. A successful
//! prediction is `exp()`-ed back out of log-space and clamped to at least
//! one row, matching `clamp_row_est`.

use crate::config::{LearningConstants, PredictConfig};
use crate::hash::{fss_for_object, grouping_hash, ClauseInput, EquivalenceClass, Expr, RelationSignature};
use crate::knn::{KnnMatrix, KnnParams};
use crate::numeric::clamp_row_est;
use crate::store::{Fs, Fss, Store};

/// The predictor's verdict for one plan node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    /// A usable cardinality estimate, already clamped to at least one row.
    Rows(f64),
    /// Nothing usable was found; the caller should fall back to the host
    /// planner's own estimate. Collapses the original's two refusal
    /// sentinels (`-4` for "no relations" and `-1` for "no data") into one
    /// case, since callers only ever need to know whether to fall back.
    Refused,
}

impl Prediction {
    /// Whether this prediction carries a usable estimate.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Prediction::Rows(_))
    }
}

/// The full result of estimating one plan node: the prediction itself,
/// plus the `fss` and feature vector it was computed from. The learning
/// pipeline ([`crate::learn`]) reuses these verbatim when the node's actual
/// cardinality becomes known, so the feature hashing never needs to be
/// redone or risk drifting from what was predicted against.
#[derive(Debug, Clone)]
pub struct NodePrediction {
    /// The node's feature sub-space, or `None` if estimation was refused
    /// before a sub-space could be computed (no underlying relations).
    pub fss: Option<Fss>,
    /// The feature vector the prediction (if any) was computed from.
    pub features: Vec<f64>,
    /// The estimate itself.
    pub cardinality: Prediction,
}

fn knn_params(predict_cfg: &PredictConfig, learning: &LearningConstants) -> KnnParams {
    KnnParams {
        k_neighbors: predict_cfg.k_neighbors,
        matrix_capacity: learning.k,
        learning_rate: learning.learning_rate,
        object_selection_threshold: learning.object_selection_threshold,
        distance_epsilon: learning.distance_epsilon,
        predict_with_few_neighbors: predict_cfg.predict_with_few_neighbors,
    }
}

/// Merges every entry sharing `fss` and `cols` (regardless of `fs`) into
/// one synthetic matrix, for the wide-search fallback
/// (`load_aqo_data(..., true)` in the original).
pub(crate) fn wide_search_merge(store: &Store, fss: Fss, cols: usize) -> Option<KnnMatrix> {
    let entries = store.wide_search(fss, cols);
    if entries.is_empty() {
        return None;
    }
    let mut merged = KnnMatrix::new(cols);
    for (_, matrix) in entries {
        for ((row, &target), &rfactor) in matrix
            .rows_data()
            .iter()
            .zip(matrix.targets())
            .zip(matrix.rfactors())
        {
            merged.append_raw(row.clone(), target, rfactor);
        }
    }
    Some(merged)
}

fn predict_with_fss(
    store: &Store,
    fs: Fs,
    fss: Fss,
    features: Vec<f64>,
    predict_cfg: &PredictConfig,
    learning: &LearningConstants,
) -> NodePrediction {
    let cols = features.len();
    let params = knn_params(predict_cfg, learning);

    let result = store
        .data_matrix(fs, fss)
        .filter(|m| m.cols() == cols)
        .and_then(|m| m.predict(&features, &params))
        .or_else(|| {
            if predict_cfg.wide_search {
                wide_search_merge(store, fss, cols).and_then(|m| m.predict(&features, &params))
            } else {
                None
            }
        });

    let cardinality = match result {
        Some(log_rows) => {
            store.metrics.record_prediction_served();
            Prediction::Rows(clamp_row_est(log_rows.exp()))
        }
        None => {
            store.metrics.record_prediction_refused();
            Prediction::Refused
        }
    };

    NodePrediction {
        fss: Some(fss),
        features,
        cardinality,
    }
}

/// Estimates the cardinality of a base-relation or join plan node from its
/// restriction clauses.
///
/// `relations.len()` doubles as the join count used by
/// [`PredictConfig::join_threshold`]: a scan node contributes one relation,
/// so a threshold of `n` requires at least `n + 1` relations (an `n`-way
/// join) before the predictor engages, matching `aqo_join_threshold` in the
/// original.
#[must_use]
pub fn predict_for_node(
    store: &Store,
    fs: Fs,
    relations: &[RelationSignature],
    clauses: &[ClauseInput<'_>],
    equivalence_classes: &[EquivalenceClass],
    predict_cfg: &PredictConfig,
    learning: &LearningConstants,
) -> NodePrediction {
    if relations.is_empty() {
        store.metrics.record_prediction_refused();
        return NodePrediction {
            fss: None,
            features: Vec::new(),
            cardinality: Prediction::Refused,
        };
    }

    if predict_cfg.join_threshold > 0 && relations.len() as u32 <= predict_cfg.join_threshold {
        store.metrics.record_prediction_refused();
        return NodePrediction {
            fss: None,
            features: Vec::new(),
            cardinality: Prediction::Refused,
        };
    }

    let subspace = fss_for_object(relations, clauses, equivalence_classes, learning.log_sel_floor);
    predict_with_fss(store, fs, subspace.fss, subspace.features, predict_cfg, learning)
}

/// Estimates the cardinality of a grouping/aggregate plan node, whose
/// sub-space is derived from its child's `fss` and the grouping
/// expressions rather than from clauses directly (`get_grouped_exprs_hash`
/// in the original).
#[must_use]
pub fn predict_for_aggregate(
    store: &Store,
    fs: Fs,
    child_fss: Fss,
    child_features: Vec<f64>,
    group_exprs: &[Expr],
    predict_cfg: &PredictConfig,
    learning: &LearningConstants,
) -> NodePrediction {
    let fss = grouping_hash(child_fss, group_exprs);
    predict_with_fss(store, fs, fss, child_features, predict_cfg, learning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn clause(var: u64) -> Expr {
        Expr::BinaryOp {
            op: 1,
            left: Box::new(Expr::Var(var)),
            right: Box::new(Expr::Constant),
        }
    }

    #[test]
    fn refuses_without_relations() {
        let store = Store::new(StoreConfig::default());
        let result = predict_for_node(
            &store,
            1,
            &[],
            &[],
            &[],
            &PredictConfig::default(),
            &LearningConstants::default(),
        );
        assert_eq!(result.cardinality, Prediction::Refused);
        assert!(result.fss.is_none());
    }

    #[test]
    fn refuses_below_join_threshold() {
        let store = Store::new(StoreConfig::default());
        let cfg = PredictConfig {
            join_threshold: 2,
            ..PredictConfig::default()
        };
        let c = clause(1);
        let clauses = vec![ClauseInput {
            expr: &c,
            is_eq_clause: false,
            selectivity: 0.5,
        }];
        let rels = [RelationSignature::Permanent(1), RelationSignature::Permanent(2)];
        let result = predict_for_node(&store, 1, &rels, &clauses, &[], &cfg, &LearningConstants::default());
        assert_eq!(result.cardinality, Prediction::Refused);
    }

    #[test]
    fn refuses_with_no_stored_data() {
        let store = Store::new(StoreConfig::default());
        let c = clause(1);
        let clauses = vec![ClauseInput {
            expr: &c,
            is_eq_clause: false,
            selectivity: 0.3,
        }];
        let rels = [RelationSignature::Permanent(1)];
        let result = predict_for_node(
            &store,
            1,
            &rels,
            &clauses,
            &[],
            &PredictConfig::default(),
            &LearningConstants::default(),
        );
        assert_eq!(result.cardinality, Prediction::Refused);
        assert!(result.fss.is_some());
    }

    #[test]
    fn predicts_once_enough_rows_are_learned() {
        let store = Store::new(StoreConfig::default());
        let c = clause(1);
        let clauses = vec![ClauseInput {
            expr: &c,
            is_eq_clause: false,
            selectivity: 0.3,
        }];
        let rels = [RelationSignature::Permanent(1)];
        let cfg = PredictConfig {
            k_neighbors: 1,
            predict_with_few_neighbors: true,
            ..PredictConfig::default()
        };
        let learning = LearningConstants::default();
        let subspace = fss_for_object(&rels, &clauses, &[], learning.log_sel_floor);
        store
            .with_data_entry(1, subspace.fss, subspace.features.len(), |entry| {
                entry
                    .matrix
                    .learn(&subspace.features, 5.0, 1.0, &knn_params(&cfg, &learning));
            })
            .unwrap();

        let result = predict_for_node(&store, 1, &rels, &clauses, &[], &cfg, &learning);
        assert!(result.cardinality.is_usable());
    }

    #[test]
    fn wide_search_finds_entries_under_other_fs() {
        let store = Store::new(StoreConfig::default());
        let c = clause(1);
        let clauses = vec![ClauseInput {
            expr: &c,
            is_eq_clause: false,
            selectivity: 0.3,
        }];
        let rels = [RelationSignature::Permanent(1)];
        let cfg = PredictConfig {
            k_neighbors: 1,
            predict_with_few_neighbors: true,
            wide_search: true,
            ..PredictConfig::default()
        };
        let learning = LearningConstants::default();
        let subspace = fss_for_object(&rels, &clauses, &[], learning.log_sel_floor);
        store
            .with_data_entry(99, subspace.fss, subspace.features.len(), |entry| {
                entry
                    .matrix
                    .learn(&subspace.features, 5.0, 1.0, &knn_params(&cfg, &learning));
            })
            .unwrap();

        let result = predict_for_node(&store, 1, &rels, &clauses, &[], &cfg, &learning);
        assert!(result.cardinality.is_usable());
    }
}
