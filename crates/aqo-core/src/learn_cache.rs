//! Backend-local staging for learning samples produced by the timeout path.
//!
//! Grounded in `learn_cache.c`: a process-local table keyed by `(fs, fss)`,
//! populated only when a statement is cut off by its timeout and the
//! partial sample carries `rfactor < 1`. A subsequent *clean* completion for
//! the same key evicts the staged entry instead of merging with it: the
//! clean sample simply goes straight to the shared store. This keeps
//! low-reliability partial observations from ever polluting [`crate::store`]
//! unless they're all a class ever produces.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::hash::Hash32;

/// A learning sample staged because the statement that produced it was cut
/// off by its timeout before completing normally.
#[derive(Debug, Clone)]
pub struct StagedSample {
    /// The feature vector that would have been passed to [`crate::knn::KnnMatrix::learn`].
    pub features: Vec<f64>,
    /// The (possibly inflated) target cardinality.
    pub target: f64,
    /// Reliability factor, always `< 1.0` for a staged sample.
    pub rfactor: f64,
}

/// Process-local staging area, one per backend/connection in the original;
/// here, one per embedding host instance.
#[derive(Debug, Default)]
pub struct LearnCache {
    staged: Mutex<HashMap<(u64, Hash32), StagedSample>>,
}

impl LearnCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            staged: Mutex::new(HashMap::new()),
        }
    }

    /// Stages (or replaces) a partial sample for `(fs, fss)`.
    pub fn stage(&self, fs: u64, fss: Hash32, sample: StagedSample) {
        self.staged.lock().insert((fs, fss), sample);
    }

    /// Returns whether a partial sample is staged for `(fs, fss)`
    /// (`lc_has_fss` in the original).
    #[must_use]
    pub fn has(&self, fs: u64, fss: Hash32) -> bool {
        self.staged.lock().contains_key(&(fs, fss))
    }

    /// Removes and returns the staged sample for `(fs, fss)`, if any. Called
    /// both when a clean learn supersedes it (the returned value is simply
    /// discarded) and when transferring a staged sample into the shared
    /// store on a later clean exit for the same key.
    pub fn take(&self, fs: u64, fss: Hash32) -> Option<StagedSample> {
        self.staged.lock().remove(&(fs, fss))
    }

    /// Drops every staged sample (`lc_reset`), called when `learn_on_timeout`
    /// flips off.
    pub fn clear(&self) {
        self.staged.lock().clear();
    }

    /// Number of samples currently staged, for introspection/metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.lock().len()
    }

    /// Whether the cache currently holds no staged samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(target: f64) -> StagedSample {
        StagedSample {
            features: vec![1.0, 2.0],
            target,
            rfactor: 0.1,
        }
    }

    #[test]
    fn stage_then_take_round_trips() {
        let cache = LearnCache::new();
        cache.stage(7, 42, sample(5.0));
        assert!(cache.has(7, 42));
        let taken = cache.take(7, 42).unwrap();
        assert_eq!(taken.target, 5.0);
        assert!(!cache.has(7, 42));
    }

    #[test]
    fn restage_replaces_prior_sample() {
        let cache = LearnCache::new();
        cache.stage(7, 42, sample(5.0));
        cache.stage(7, 42, sample(9.0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.take(7, 42).unwrap().target, 9.0);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = LearnCache::new();
        cache.stage(1, 1, sample(1.0));
        cache.stage(2, 2, sample(2.0));
        cache.clear();
        assert!(cache.is_empty());
    }
}
