//! Learning pipeline: turns one plan node's actual execution outcome into
//! a [`crate::knn::KnnMatrix`] update, or, if a statement timeout cut the
//! execution short and the result doesn't look informative enough, stages
//! it in the [`crate::learn_cache`] instead of discarding it outright.
//!
//! Ported from `learnOnPlanState`/`learn_sample`/`should_learn` in
//! `postprocessing.c`. The original's row-summation, clamping, and
//! timeout-inflation logic are carried over directly; what's not carried
//! over is `learn_cache.c`'s actual mechanism (an in-progress-matrix cache
//! that survives a statement-timeout retry at the loader level); this
//! crate has no hook into a host's retry loop, so [`crate::learn_cache`]
//! instead keeps a staged low-reliability sample that a later clean
//! completion for the same key simply supersedes. See `DESIGN.md`.

use crate::config::{LearningConstants, PredictConfig, TimeoutConfig};
use crate::knn::{KnnParams, LearnOutcome};
use crate::learn_cache::{LearnCache, StagedSample};
use crate::numeric::clamp_row_est;
use crate::predict::{NodePrediction, Prediction};
use crate::store::{Fs, Store};

/// One worker's contribution to a parallel-aware node's tuple count.
#[derive(Debug, Clone, Copy)]
pub struct WorkerContribution {
    /// Tuples produced by this worker, summed across its loop iterations.
    pub ntuples: f64,
    /// This worker's loop iteration count.
    pub nloops: f64,
}

/// What actually happened when a plan node executed, gathered from the
/// host's own instrumentation.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Total tuples produced at the leader, across all loop iterations.
    pub ntuples: f64,
    /// Total leader loop iterations; `0` means the node was never reached.
    pub nloops: f64,
    /// Per-worker contributions, present only for parallel-aware nodes
    /// (`IsParallelTuplesProcessing` in the original: parallel-aware scans,
    /// hash/merge/nested-loop joins under a parallel plan).
    pub workers: Option<Vec<WorkerContribution>>,
}

impl ExecutionOutcome {
    /// Returns the node's true cardinality and whether it was executed at
    /// all. Mirrors the row-summation block of `learnOnPlanState`: a
    /// parallel node's rows are the sum of each worker's own average, plus
    /// the leader's residual average over whatever loop count the workers
    /// didn't account for.
    #[must_use]
    pub fn actual_cardinality(&self) -> (f64, bool) {
        if self.nloops <= 0.0 {
            return (1.0, false);
        }

        let Some(workers) = self.workers.as_ref().filter(|w| !w.is_empty()) else {
            return (self.ntuples / self.nloops, true);
        };

        let mut rows = 0.0;
        let mut total_wntuples = 0.0;
        let mut total_wnloops = 0.0;
        for w in workers {
            if w.nloops <= 0.0 {
                continue;
            }
            total_wntuples += w.ntuples;
            total_wnloops += w.nloops;
            rows += w.ntuples / w.nloops;
        }
        if self.nloops - total_wnloops > 0.5 {
            rows += (self.ntuples - total_wntuples) / (self.nloops - total_wnloops);
        }
        (rows, true)
    }
}

/// Whether a (possibly timed-out) execution should be learned from, and
/// the inflation applied to a timed-out sample's row count if so. Ported
/// from `should_learn`: a clean completion always qualifies; a timed-out
/// one only qualifies if its partial row count already exceeds the
/// predicted count by `inflation_threshold`, in which case the gap is
/// amplified by `inflation_factor` before learning (the original's way of
/// saying "this was clearly an undercount, not just early").
fn should_learn(is_timed_out: bool, predicted: f64, learn_rows: &mut f64, cfg: &TimeoutConfig) -> bool {
    if !is_timed_out {
        return true;
    }
    if *learn_rows > predicted * cfg.inflation_threshold {
        *learn_rows += (*learn_rows - predicted) * cfg.inflation_factor;
        true
    } else {
        false
    }
}

/// What [`learn_node`] did with one node's execution outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearnResult {
    /// Nothing was recorded: learning disabled for this class, the node
    /// had no relations to key a sample on, the timeout gate rejected it,
    /// or this was a repeat "never executed" node already covered by
    /// existing knowledge.
    Skipped,
    /// The sample was staged in the learn cache instead of being applied,
    /// because a timeout cut the execution short and it didn't clear the
    /// inflation threshold.
    Staged,
    /// The sample was applied to the store's learning matrix.
    Learned(LearnOutcome),
}

/// Records (or stages, or skips) one plan node's learning sample.
///
/// `prediction` is the exact [`NodePrediction`] [`crate::predict::predict_for_node`]
/// (or `predict_for_aggregate`) returned for this node at plan time, reused
/// here so the feature vector and `fss` are guaranteed to match what was
/// predicted against. `host_plan_rows` is the host planner's own row
/// estimate, used as the fallback "predicted" value when AQO itself
/// refused to estimate (mirrors `p->plan->plan_rows` in the original).
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn learn_node(
    store: &Store,
    cache: &LearnCache,
    fs: Fs,
    prediction: &NodePrediction,
    outcome: &ExecutionOutcome,
    learn_enabled: bool,
    is_timed_out: bool,
    host_plan_rows: f64,
    learning: &LearningConstants,
    predict_cfg: &PredictConfig,
    timeout_cfg: &TimeoutConfig,
) -> LearnResult {
    let Some(fss) = prediction.fss else {
        return LearnResult::Skipped;
    };
    if !learn_enabled {
        return LearnResult::Skipped;
    }
    if is_timed_out && !timeout_cfg.learn_on_timeout {
        return LearnResult::Skipped;
    }

    let (raw_learn_rows, executed) = outcome.actual_cardinality();
    let raw_predicted = match prediction.cardinality {
        Prediction::Rows(r) => r,
        Prediction::Refused => host_plan_rows,
    };

    let predicted = clamp_row_est(raw_predicted);
    let mut learn_rows = clamp_row_est(raw_learn_rows);

    if !should_learn(is_timed_out, predicted, &mut learn_rows, timeout_cfg) {
        if is_timed_out {
            cache.stage(
                fs,
                fss,
                StagedSample {
                    features: prediction.features.clone(),
                    target: learn_rows.ln(),
                    rfactor: learning.partial_rfactor,
                },
            );
            store.metrics.record_timeout_staged();
            return LearnResult::Staged;
        }
        return LearnResult::Skipped;
    }

    // Learn a never-executed node only once: if AQO already carries a
    // positive prediction for this fss, a repeat "never visited" outcome
    // contributes nothing new.
    if !executed && matches!(prediction.cardinality, Prediction::Rows(r) if r > 0.0) {
        return LearnResult::Skipped;
    }

    if !is_timed_out {
        // A clean completion supersedes anything staged by an earlier
        // timed-out attempt at the same key.
        cache.take(fs, fss);
    }

    let target = learn_rows.ln();
    let rfactor = if is_timed_out { learning.partial_rfactor } else { 1.0 };
    let params = KnnParams {
        k_neighbors: predict_cfg.k_neighbors,
        matrix_capacity: learning.k,
        learning_rate: learning.learning_rate,
        object_selection_threshold: learning.object_selection_threshold,
        distance_epsilon: learning.distance_epsilon,
        predict_with_few_neighbors: predict_cfg.predict_with_few_neighbors,
    };
    let cols = prediction.features.len();

    let written = store.with_data_entry(fs, fss, cols, |entry| {
        entry.matrix.learn(&prediction.features, target, rfactor, &params)
    });

    match written {
        Ok(outcome) => {
            match outcome {
                LearnOutcome::Nudged => store.metrics.record_learn_nudged(),
                LearnOutcome::Appended => store.metrics.record_learn_appended(),
                LearnOutcome::Adjusted => store.metrics.record_learn_adjusted(),
            }
            LearnResult::Learned(outcome)
        }
        Err(err) => {
            tracing::debug!(fs, fss, error = %err, "learn skipped");
            LearnResult::Skipped
        }
    }
}

/// Accumulates `|predicted - actual|` across every node of one query
/// execution, excluding never-executed nodes, and reduces to the mean
/// cardinality error for that execution (`cardinality_sum_errors` /
/// `cardinality_num_objects` in the original, which are query-scoped
/// static accumulators reset between executions; this crate makes that
/// scoping explicit instead of relying on global mutable state).
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorAccumulator {
    sum: f64,
    count: u32,
}

impl ErrorAccumulator {
    /// Creates a fresh, empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one node's predicted/actual pair in, skipping never-executed
    /// nodes to avoid diluting the signal with nodes AQO never informed.
    pub fn add(&mut self, predicted: f64, actual: f64, executed: bool) {
        if !executed {
            return;
        }
        self.sum += (clamp_row_est(predicted) - clamp_row_est(actual)).abs();
        self.count += 1;
    }

    /// The mean absolute error across every node folded in so far, or
    /// `None` if every node was skipped (no nodes executed).
    #[must_use]
    pub fn mean_error(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / f64::from(self.count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::hash::{fss_for_object, ClauseInput, Expr};

    fn outcome(ntuples: f64, nloops: f64) -> ExecutionOutcome {
        ExecutionOutcome {
            ntuples,
            nloops,
            workers: None,
        }
    }

    fn prediction_for(store: &Store, learning: &LearningConstants) -> NodePrediction {
        let c = Expr::BinaryOp {
            op: 1,
            left: Box::new(Expr::Var(1)),
            right: Box::new(Expr::Constant),
        };
        let clauses = vec![ClauseInput {
            expr: &c,
            is_eq_clause: false,
            selectivity: 0.4,
        }];
        let rels = [crate::hash::RelationSignature::Permanent(1)];
        let subspace = fss_for_object(&rels, &clauses, &[], learning.log_sel_floor);
        let _ = store;
        NodePrediction {
            fss: Some(subspace.fss),
            features: subspace.features,
            cardinality: Prediction::Refused,
        }
    }

    #[test]
    fn clean_execution_appends_first_row() {
        let store = Store::new(StoreConfig::default());
        let cache = LearnCache::new();
        let learning = LearningConstants::default();
        let predict_cfg = PredictConfig::default();
        let timeout_cfg = TimeoutConfig::default();
        let prediction = prediction_for(&store, &learning);

        let result = learn_node(
            &store,
            &cache,
            1,
            &prediction,
            &outcome(10.0, 1.0),
            true,
            false,
            5.0,
            &learning,
            &predict_cfg,
            &timeout_cfg,
        );
        assert_eq!(result, LearnResult::Learned(LearnOutcome::Appended));
        assert_eq!(store.data_matrix(1, prediction.fss.unwrap()).unwrap().rows(), 1);
    }

    #[test]
    fn disabled_learning_is_skipped() {
        let store = Store::new(StoreConfig::default());
        let cache = LearnCache::new();
        let learning = LearningConstants::default();
        let prediction = prediction_for(&store, &learning);
        let result = learn_node(
            &store,
            &cache,
            1,
            &prediction,
            &outcome(10.0, 1.0),
            false,
            false,
            5.0,
            &learning,
            &PredictConfig::default(),
            &TimeoutConfig::default(),
        );
        assert_eq!(result, LearnResult::Skipped);
    }

    #[test]
    fn timed_out_below_threshold_is_staged() {
        let store = Store::new(StoreConfig::default());
        let cache = LearnCache::new();
        let learning = LearningConstants::default();
        let prediction = prediction_for(&store, &learning);
        let timeout_cfg = TimeoutConfig {
            learn_on_timeout: true,
            inflation_threshold: 1.2,
            ..TimeoutConfig::default()
        };
        // predicted falls back to host_plan_rows=10, actual rows=10: no
        // inflation-worthy gap, so the sample is staged, not learned.
        let result = learn_node(
            &store,
            &cache,
            1,
            &prediction,
            &outcome(10.0, 1.0),
            true,
            true,
            10.0,
            &learning,
            &PredictConfig::default(),
            &timeout_cfg,
        );
        assert_eq!(result, LearnResult::Staged);
        assert!(cache.has(1, prediction.fss.unwrap()));
    }

    #[test]
    fn timed_out_above_threshold_learns_with_inflation() {
        let store = Store::new(StoreConfig::default());
        let cache = LearnCache::new();
        let learning = LearningConstants::default();
        let prediction = prediction_for(&store, &learning);
        let timeout_cfg = TimeoutConfig {
            learn_on_timeout: true,
            inflation_threshold: 1.2,
            inflation_factor: 10.0,
            ..TimeoutConfig::default()
        };
        let result = learn_node(
            &store,
            &cache,
            1,
            &prediction,
            &outcome(100.0, 1.0),
            true,
            true,
            5.0,
            &learning,
            &PredictConfig::default(),
            &timeout_cfg,
        );
        assert!(matches!(result, LearnResult::Learned(_)));
        assert!(!cache.has(1, prediction.fss.unwrap()));
    }

    #[test]
    fn never_executed_node_with_existing_prediction_is_skipped() {
        let store = Store::new(StoreConfig::default());
        let cache = LearnCache::new();
        let learning = LearningConstants::default();
        let mut prediction = prediction_for(&store, &learning);
        prediction.cardinality = Prediction::Rows(42.0);

        let result = learn_node(
            &store,
            &cache,
            1,
            &prediction,
            &outcome(0.0, 0.0),
            true,
            false,
            5.0,
            &learning,
            &PredictConfig::default(),
            &TimeoutConfig::default(),
        );
        assert_eq!(result, LearnResult::Skipped);
    }

    #[test]
    fn parallel_outcome_sums_worker_and_residual_rows() {
        let workers = vec![
            WorkerContribution { ntuples: 10.0, nloops: 2.0 },
            WorkerContribution { ntuples: 20.0, nloops: 2.0 },
        ];
        let out = ExecutionOutcome {
            ntuples: 50.0,
            nloops: 5.0,
            workers: Some(workers),
        };
        let (rows, executed) = out.actual_cardinality();
        assert!(executed);
        // 10/2 + 20/2 + (50-30)/(5-4) = 5 + 10 + 20 = 35
        assert!((rows - 35.0).abs() < 1e-9);
    }

    #[test]
    fn error_accumulator_ignores_never_executed() {
        let mut acc = ErrorAccumulator::new();
        acc.add(10.0, 12.0, true);
        acc.add(100.0, 1.0, false);
        assert_eq!(acc.mean_error(), Some(2.0));
    }
}
