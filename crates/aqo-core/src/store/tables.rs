//! Row shapes for the shared store's four tables.

use crate::knn::KnnMatrix;

/// Ring-buffer length for each of a class's two statistics series.
pub const STAT_SAMPLE_SIZE: usize = 20;

/// One execution's timing and accuracy data point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    /// Planning time, in the host's own time unit.
    pub plan_time: f64,
    /// Execution time.
    pub exec_time: f64,
    /// Relative cardinality estimation error for this execution.
    pub est_error: f64,
}

/// A class's aggregated statistics: two sliding windows of [`Sample`],
/// one for executions that used the predictor and one for those that
/// didn't, plus lifetime counts.
#[derive(Debug, Clone, Default)]
pub struct StatEntry {
    /// Ring buffer of samples from executions that used the predictor.
    pub with_predictor: Vec<Sample>,
    /// Ring buffer of samples from executions that used the planner's
    /// default estimator.
    pub without_predictor: Vec<Sample>,
    /// Total executions that used the predictor.
    pub execs_with: i64,
    /// Total executions that used the default estimator.
    pub execs_without: i64,
}

impl StatEntry {
    /// Creates an empty entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample to the "used predictor" window, evicting the
    /// oldest entry once the window is full.
    pub fn push_with(&mut self, sample: Sample) {
        push_ring(&mut self.with_predictor, sample, STAT_SAMPLE_SIZE);
        self.execs_with += 1;
    }

    /// Appends a sample to the "used default estimator" window.
    pub fn push_without(&mut self, sample: Sample) {
        push_ring(&mut self.without_predictor, sample, STAT_SAMPLE_SIZE);
        self.execs_without += 1;
    }

    /// Total executions recorded, with or without the predictor.
    #[must_use]
    pub fn total_execs(&self) -> i64 {
        self.execs_with + self.execs_without
    }
}

fn push_ring<T>(buf: &mut Vec<T>, item: T, cap: usize) {
    if buf.len() >= cap {
        buf.remove(0);
    }
    buf.push(item);
}

/// A query class's policy bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preferences {
    /// The feature space this class's learning is actually recorded
    /// under: usually itself, but redirected to
    /// [`crate::store::COMMON_FEATURE_SPACE`] under `forced` mode.
    pub target_fs: u64,
    /// Whether new samples are recorded for this class.
    pub learn: bool,
    /// Whether the predictor's estimate is used for this class.
    pub use_predictor: bool,
    /// Whether the auto-tuner manages this class's `learn`/`use` bits.
    pub auto_tune: bool,
}

/// A `(fs, fss)` learning-matrix entry plus the base relations it
/// depends on, used to decide liveness on cleanup.
#[derive(Debug, Clone)]
pub struct DataEntry {
    /// The regression matrix itself.
    pub matrix: KnnMatrix,
    /// Base relations touched at this plan node, used by
    /// [`crate::store::Store::cleanup`] to detect dead entries.
    pub reloids: Vec<u64>,
    /// Bytes reserved from the shared heap budget for this entry, so
    /// exactly that amount can be released when the entry is removed.
    pub(crate) heap_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut entry = StatEntry::new();
        for i in 0..(STAT_SAMPLE_SIZE + 5) {
            entry.push_with(Sample {
                plan_time: i as f64,
                exec_time: 0.0,
                est_error: 0.0,
            });
        }
        assert_eq!(entry.with_predictor.len(), STAT_SAMPLE_SIZE);
        assert_eq!(entry.with_predictor[0].plan_time, 5.0);
        assert_eq!(entry.execs_with, (STAT_SAMPLE_SIZE + 5) as i64);
    }
}
