//! Fixed-capacity k-nearest-neighbour regressor over log-selectivity
//! feature vectors.
//!
//! Ported from `machine_learning.c`'s `OkNNrdata`/`OkNNr_predict`/
//! `OkNNr_learn`. The original preallocates `aqo_K` matrix rows up front
//! and tracks `rows` as a signed counter starting at `-1` ("unallocated");
//! this crate grows `matrix`/`targets`/`rfactors` with ordinary `Vec`
//! pushes and represents "not yet present in the store" as the matrix
//! being absent from [`crate::store`] entirely, which is a direct
//! translation, not a behavior change.

use crate::numeric::l2_distance;

/// Similarity smoothing term added to distance before inverting, so a
/// zero-distance neighbor still gets a finite (if very large) weight.
const DISTANCE_EPSILON_DEFAULT: f64 = 0.001;

/// Tunable constants and neighbor-count settings threaded through every
/// `predict`/`learn` call. Sourced from [`crate::config::LearningConstants`]
/// and [`crate::config::PredictConfig`] at the call site rather than
/// hardcoded here, since the original exposes all of these as GUCs.
#[derive(Debug, Clone, Copy)]
pub struct KnnParams {
    /// `aqo_k`: neighbor count used for prediction and K-full learning.
    pub k_neighbors: usize,
    /// `aqo_K`: matrix capacity (default 30).
    pub matrix_capacity: usize,
    /// `learning_rate` (default 0.1).
    pub learning_rate: f64,
    /// `object_selection_threshold` (default 0.1).
    pub object_selection_threshold: f64,
    /// Distance-similarity epsilon (default 0.001).
    pub distance_epsilon: f64,
    /// Whether prediction is allowed when `rows < k_neighbors`.
    pub predict_with_few_neighbors: bool,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            k_neighbors: 3,
            matrix_capacity: 30,
            learning_rate: 0.1,
            object_selection_threshold: 0.1,
            distance_epsilon: DISTANCE_EPSILON_DEFAULT,
            predict_with_few_neighbors: false,
        }
    }
}

/// Which branch [`KnnMatrix::learn`] took, used by callers to drive
/// [`crate::metrics::Metrics`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    /// The new sample was within `object_selection_threshold` of an
    /// existing row, which was nudged toward it instead of appending.
    Nudged,
    /// The matrix had spare capacity; the sample became a new row.
    Appended,
    /// The matrix was at capacity; the `k_neighbors` nearest rows were
    /// adjusted toward the new sample instead.
    Adjusted,
}

/// A `(fs, fss)` entry's learning matrix: up to `matrix_capacity` rows of
/// `cols`-wide feature vectors, each with a target and a reliability
/// factor.
#[derive(Debug, Clone)]
pub struct KnnMatrix {
    cols: usize,
    matrix: Vec<Vec<f64>>,
    targets: Vec<f64>,
    rfactors: Vec<f64>,
}

impl KnnMatrix {
    /// Creates an empty matrix for feature vectors of width `cols`.
    #[must_use]
    pub fn new(cols: usize) -> Self {
        Self {
            cols,
            matrix: Vec::new(),
            targets: Vec::new(),
            rfactors: Vec::new(),
        }
    }

    /// Number of features per row.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Current number of stored samples, `0 ≤ rows ≤ matrix_capacity`.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.matrix.len()
    }

    /// Read-only access to the stored feature rows, for snapshotting.
    #[must_use]
    pub fn rows_data(&self) -> &[Vec<f64>] {
        &self.matrix
    }

    /// Read-only access to the stored targets, for snapshotting.
    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Read-only access to the stored reliability factors, for
    /// snapshotting.
    #[must_use]
    pub fn rfactors(&self) -> &[f64] {
        &self.rfactors
    }

    /// Reconstructs a matrix directly from a decoded `data` record. Does
    /// not validate invariants beyond matching
    /// lengths; the caller (the snapshot loader) is responsible for
    /// abandoning a file whose lengths disagree.
    #[must_use]
    pub fn from_parts(
        cols: usize,
        matrix: Vec<Vec<f64>>,
        targets: Vec<f64>,
        rfactors: Vec<f64>,
    ) -> Self {
        Self {
            cols,
            matrix,
            targets,
            rfactors,
        }
    }

    fn distances_to(&self, features: &[f64]) -> Vec<f64> {
        self.matrix
            .iter()
            .map(|row| l2_distance(row, features))
            .collect()
    }

    fn similarity(distance: f64, epsilon: f64) -> f64 {
        1.0 / (epsilon + distance)
    }

    /// Selects the `k` rows with smallest distance and returns their
    /// indices alongside similarity weights (`compute_weights` in the
    /// original, using a direct sort instead of the original's manual
    /// insertion loop (same result for any `k`, a Rust-native
    /// simplification of the bookkeeping, not a behavior change).
    fn nearest(distances: &[f64], k: usize, epsilon: f64) -> (Vec<usize>, Vec<f64>, f64) {
        let mut idx: Vec<usize> = (0..distances.len()).collect();
        idx.sort_by(|&a, &b| {
            distances[a]
                .partial_cmp(&distances[b])
                .expect("distances are never NaN")
        });
        idx.truncate(k);
        let weights: Vec<f64> = idx.iter().map(|&i| Self::similarity(distances[i], epsilon)).collect();
        let w_sum = weights.iter().sum();
        (idx, weights, w_sum)
    }

    /// Predicts a log-cardinality target for `features`, or `None` (the
    /// refusal sentinel) if there isn't enough data or all weights are
    /// degenerate.
    ///
    /// # Panics
    ///
    /// Panics if `features.len() != self.cols()`.
    #[must_use]
    pub fn predict(&self, features: &[f64], params: &KnnParams) -> Option<f64> {
        assert_eq!(features.len(), self.cols, "feature vector width mismatch");

        if self.rows() == 0 {
            return None;
        }
        if !params.predict_with_few_neighbors && self.rows() < params.k_neighbors {
            return None;
        }

        let distances = self.distances_to(features);
        let k = params.k_neighbors.min(self.rows());
        let (idx, weights, w_sum) = Self::nearest(&distances, k, params.distance_epsilon);

        if idx.is_empty() || w_sum <= 0.0 {
            return None;
        }

        let mut result = 0.0;
        for (&i, &w) in idx.iter().zip(&weights) {
            result += self.targets[i] * w / w_sum;
        }
        Some(result.max(0.0))
    }

    /// Updates the matrix with a new observed sample.
    ///
    /// # Panics
    ///
    /// Panics if `features.len() != self.cols()`.
    pub fn learn(&mut self, features: &[f64], target: f64, rfactor: f64, params: &KnnParams) -> LearnOutcome {
        assert_eq!(features.len(), self.cols, "feature vector width mismatch");

        let distances = self.distances_to(features);
        let nearest_row = distances
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).expect("distances are never NaN"))
            .map(|(i, _)| i);

        if let Some(mid) = nearest_row {
            if self.rows() > 0 && distances[mid] < params.object_selection_threshold {
                let lr = Self::clamp_learning_rate(params.learning_rate * rfactor / self.rfactors[mid]);
                for j in 0..self.cols {
                    self.matrix[mid][j] += lr * (features[j] - self.matrix[mid][j]);
                }
                self.targets[mid] += lr * (target - self.targets[mid]);
                self.rfactors[mid] += lr * (rfactor - self.rfactors[mid]);
                return LearnOutcome::Nudged;
            }
        }

        if self.rows() < params.matrix_capacity {
            self.matrix.push(features.to_vec());
            self.targets.push(target);
            self.rfactors.push(rfactor);
            return LearnOutcome::Appended;
        }

        // K-full adjust: the matrix cannot grow, so shift the k_neighbors
        // nearest rows toward the new sample instead of adding one.
        let mid = nearest_row.expect("matrix_capacity > 0 implies at least one row");
        let k = params.k_neighbors.min(self.rows());
        let (idx, weights, w_sum) = Self::nearest(&distances, k, params.distance_epsilon);

        let mut avg_target = 0.0;
        for (&i, &w) in idx.iter().zip(&weights) {
            avg_target += self.targets[i] * w / w_sum;
        }
        let tc_coef = params.learning_rate * (avg_target - target);

        // The original recomputes `lr` from `data->rfactors[mid]` (the
        // single globally-nearest row) rather than per-neighbor; that is
        // preserved here verbatim rather than "fixed", since it is load
        // -bearing behavior of the upstream algorithm, not a typo we
        // introduced.
        let lr = Self::clamp_learning_rate(params.learning_rate * rfactor / self.rfactors[mid]);

        for (&i, &w) in idx.iter().zip(&weights) {
            let fc_coef =
                tc_coef * lr * (self.targets[i] - avg_target) * w * w / (self.cols as f64).sqrt() / w_sum;
            self.targets[i] -= tc_coef * lr * w / w_sum;
            let dist_i = distances[i];
            for j in 0..self.cols {
                let old = self.matrix[i][j];
                self.matrix[i][j] = old - fc_coef * (features[j] - old) / dist_i;
            }
        }

        LearnOutcome::Adjusted
    }

    /// Appends a row directly, bypassing the nudge/append/adjust
    /// dispatch. Used by [`crate::predict::wide_search_merge`] to build a
    /// synthetic matrix out of several stored entries' rows; never used
    /// to record an actually observed sample, since that must go through
    /// [`KnnMatrix::learn`] to get its reliability-weighted update
    /// semantics.
    ///
    /// # Panics
    ///
    /// Panics (debug only) if `features.len() != self.cols()`.
    pub(crate) fn append_raw(&mut self, features: Vec<f64>, target: f64, rfactor: f64) {
        debug_assert_eq!(features.len(), self.cols, "feature vector width mismatch");
        self.matrix.push(features);
        self.targets.push(target);
        self.rfactors.push(rfactor);
    }

    fn clamp_learning_rate(lr: f64) -> f64 {
        if lr > 1.0 {
            tracing::warn!(lr, "learning rate exceeded 1.0, clamping");
            1.0
        } else {
            lr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(k: usize, capacity: usize) -> KnnParams {
        KnnParams {
            k_neighbors: k,
            matrix_capacity: capacity,
            ..KnnParams::default()
        }
    }

    #[test]
    fn predict_refuses_with_too_few_neighbors() {
        let mut m = KnnMatrix::new(2);
        let p = params(3, 30);
        m.learn(&[0.0, 0.0], 1.0, 1.0, &p);
        m.learn(&[0.1, 0.1], 1.0, 1.0, &p);
        assert_eq!(m.predict(&[0.0, 0.0], &p), None);
    }

    #[test]
    fn predict_with_few_neighbors_override_returns_some() {
        let mut m = KnnMatrix::new(2);
        let mut p = params(3, 30);
        m.learn(&[0.0, 0.0], 2.0, 1.0, &p);
        p.predict_with_few_neighbors = true;
        assert!(m.predict(&[0.0, 0.0], &p).is_some());
    }

    #[test]
    fn first_sample_always_appends() {
        let mut m = KnnMatrix::new(1);
        let p = params(1, 30);
        let outcome = m.learn(&[0.5], 2.0, 1.0, &p);
        assert_eq!(outcome, LearnOutcome::Appended);
        assert_eq!(m.rows(), 1);
    }

    #[test]
    fn nearby_sample_nudges_instead_of_appending() {
        let mut m = KnnMatrix::new(1);
        let p = params(1, 30);
        m.learn(&[0.0], 1.0, 1.0, &p);
        let outcome = m.learn(&[0.01], 2.0, 1.0, &p);
        assert_eq!(outcome, LearnOutcome::Nudged);
        assert_eq!(m.rows(), 1);
    }

    #[test]
    fn rows_never_exceed_capacity() {
        let mut m = KnnMatrix::new(1);
        let p = params(3, 5);
        let mut rng_state = 0.0_f64;
        for _ in 0..100 {
            rng_state += 1.37;
            let feature = rng_state % 10.0;
            m.learn(&[feature], feature, 1.0, &p);
        }
        assert!(m.rows() <= 5);
    }

    #[test]
    fn k_full_adjust_keeps_row_count_stable() {
        let mut m = KnnMatrix::new(1);
        let p = params(3, 5);
        for i in 0..5 {
            m.learn(&[i as f64 * 2.0], i as f64, 1.0, &p);
        }
        assert_eq!(m.rows(), 5);
        let rows_before = m.rows();
        let outcome = m.learn(&[37.0], 100.0, 1.0, &p);
        assert_eq!(outcome, LearnOutcome::Adjusted);
        assert_eq!(m.rows(), rows_before);
    }

    #[test]
    fn prediction_is_non_negative() {
        let mut m = KnnMatrix::new(1);
        let p = params(1, 30);
        m.learn(&[0.0], 0.0, 1.0, &p);
        let result = m.predict(&[0.0], &p).unwrap();
        assert!(result >= 0.0);
    }
}
