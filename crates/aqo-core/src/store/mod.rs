//! The shared learning store: four fixed-capacity concurrent hash
//! tables, a heap-budget accountant, and per-key logical locks.
//!
//! Ported from the four `HTAB`s in `storage.c` (`stat_htab`,
//! `qtexts_htab`, `data_htab`, `queries_htab`). The original shares these
//! across OS processes via a DSM segment, with each table behind its own
//! LWLock. As an embedded Rust library, cross-process sharing is out of
//! scope; what's preserved is everything that
//! shapes correctness within one process: the lock-order discipline
//! (stat → qtext → data → queries), the overflow-never-evicts policy,
//! the `cols`-mismatch collision guard, and the per-key serialization
//! used by the learning pipeline.
//!
//! Shaped as one struct owning a `parking_lot::RwLock<FxHashMap<_, _>>` per
//! table, the same way a database handle owns one lockable collection map
//! per logical table.

pub mod heap;
pub mod keylock;
pub mod snapshot;
pub mod tables;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::hash::Hash32;
use crate::knn::KnnMatrix;
use crate::metrics::Metrics;

use heap::Heap;
use keylock::KeyLockTable;
pub use tables::{DataEntry, Preferences, Sample, StatEntry, STAT_SAMPLE_SIZE};

/// Feature-space identifier: a 64-bit unsigned wire type everywhere, kept
/// that way rather than a signed/typed newtype since it is only ever
/// hashed and compared for equality.
pub type Fs = u64;

/// Feature-sub-space identifier (32-bit).
pub type Fss = Hash32;

/// The reserved feature space every query is redirected to under
/// `forced` mode, and that always exists.
pub const COMMON_FEATURE_SPACE: Fs = 0;

/// Estimated heap bytes charged for a newly-created `data` entry, ahead
/// of knowing how many rows it will eventually hold. A simplification of
/// the original's incremental DSM allocation, documented rather than
/// hidden: the learning matrix grows in place afterward without further
/// heap accounting.
pub(crate) const DATA_ENTRY_HEAP_ESTIMATE_BYTES_PER_COL: usize = 8 * 64;

/// The shared learning store.
pub struct Store {
    stat: RwLock<FxHashMap<Fs, StatEntry>>,
    qtext: RwLock<FxHashMap<Fs, String>>,
    data: RwLock<FxHashMap<(Fs, Fss), DataEntry>>,
    queries: RwLock<FxHashMap<Fs, Preferences>>,
    heap: Heap,
    key_locks: KeyLockTable,
    stat_dirty: AtomicBool,
    qtext_dirty: AtomicBool,
    data_dirty: AtomicBool,
    queries_dirty: AtomicBool,
    /// Activity counters, shared across all pipelines operating on this
    /// store.
    pub metrics: Metrics,
    config: StoreConfig,
}

impl Store {
    /// Creates a new store, seeding the common feature space (`fs=0`)
    /// into the queries and qtext tables.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let store = Self {
            stat: RwLock::new(FxHashMap::default()),
            qtext: RwLock::new(FxHashMap::default()),
            data: RwLock::new(FxHashMap::default()),
            queries: RwLock::new(FxHashMap::default()),
            heap: Heap::new(config.dsm_size_max),
            key_locks: KeyLockTable::new(256),
            stat_dirty: AtomicBool::new(false),
            qtext_dirty: AtomicBool::new(false),
            data_dirty: AtomicBool::new(false),
            queries_dirty: AtomicBool::new(false),
            metrics: Metrics::new(),
            config,
        };
        store.seed_common_feature_space();
        store
    }

    fn seed_common_feature_space(&self) {
        self.queries.write().insert(
            COMMON_FEATURE_SPACE,
            Preferences {
                target_fs: COMMON_FEATURE_SPACE,
                learn: true,
                use_predictor: true,
                auto_tune: false,
            },
        );
        self.qtext
            .write()
            .insert(COMMON_FEATURE_SPACE, String::new());
    }

    // ---------------------------------------------------------------
    // queries table
    // ---------------------------------------------------------------

    /// Reads a class's preferences, if the class is known.
    #[must_use]
    pub fn preferences(&self, fs: Fs) -> Option<Preferences> {
        self.queries.read().get(&fs).copied()
    }

    /// Adds a newly-observed class with the given seed preferences, if
    /// it isn't already present. A no-op (not an error) if `fs` is
    /// already known; fails with [`Error::TableFull`] if the table is at
    /// capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableFull`] if the table is at `fs_max_items` and
    /// `fs` is not already present.
    pub fn seed_class(&self, fs: Fs, prefs: Preferences) -> Result<()> {
        let mut table = self.queries.write();
        if table.contains_key(&fs) {
            return Ok(());
        }
        if table.len() >= self.config.fs_max_items {
            self.metrics.record_table_full();
            tracing::info!(fs, table = "queries", "table full, rejecting insert");
            return Err(Error::TableFull {
                table: "queries",
                cap: self.config.fs_max_items,
            });
        }
        table.insert(fs, prefs);
        self.queries_dirty.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Overwrites a class's preferences (used by the auto-tuner and by
    /// `aqo_enable_query`/`aqo_disable_query`-equivalent operations).
    pub fn update_preferences(&self, fs: Fs, prefs: Preferences) {
        self.queries.write().insert(fs, prefs);
        self.queries_dirty.store(true, Ordering::Relaxed);
    }

    // ---------------------------------------------------------------
    // qtext table
    // ---------------------------------------------------------------

    /// Reads the stored query text for a class, if any.
    #[must_use]
    pub fn query_text(&self, fs: Fs) -> Option<String> {
        self.qtext.read().get(&fs).cloned()
    }

    /// Stores (or replaces) a class's query text, truncated to
    /// `querytext_max_size` bytes and charged against the heap budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableFull`] if the table is at capacity and `fs`
    /// is new, or [`Error::HeapExhausted`] if the heap budget is
    /// exceeded (in which case the table is left unchanged).
    pub fn set_query_text(&self, fs: Fs, text: &str) -> Result<()> {
        let truncated: String = text.chars().take(self.config.querytext_max_size).collect();
        let incoming_len = truncated.len();

        let mut table = self.qtext.write();
        let existing_len = table.get(&fs).map(String::len).unwrap_or(0);

        if !table.contains_key(&fs) && table.len() >= self.config.fs_max_items {
            self.metrics.record_table_full();
            tracing::info!(fs, table = "qtext", "table full, rejecting insert");
            return Err(Error::TableFull {
                table: "qtext",
                cap: self.config.fs_max_items,
            });
        }

        if incoming_len > existing_len {
            self.heap.try_reserve(incoming_len - existing_len)?;
        } else if incoming_len < existing_len {
            self.heap.release(existing_len - incoming_len);
        }

        table.insert(fs, truncated);
        self.qtext_dirty.store(true, Ordering::Relaxed);
        Ok(())
    }

    // ---------------------------------------------------------------
    // stat table
    // ---------------------------------------------------------------

    /// Appends one execution's sample to a class's statistics, creating
    /// the entry if this is the class's first recorded execution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableFull`] if the table is at capacity and `fs`
    /// is new.
    pub fn record_stat(&self, fs: Fs, used_predictor: bool, sample: Sample) -> Result<()> {
        let mut table = self.stat.write();
        if !table.contains_key(&fs) && table.len() >= self.config.fs_max_items {
            self.metrics.record_table_full();
            tracing::info!(fs, table = "stat", "table full, rejecting insert");
            return Err(Error::TableFull {
                table: "stat",
                cap: self.config.fs_max_items,
            });
        }
        let entry = table.entry(fs).or_insert_with(StatEntry::new);
        if used_predictor {
            entry.push_with(sample);
        } else {
            entry.push_without(sample);
        }
        self.stat_dirty.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Reads a copy of a class's statistics entry, if any.
    #[must_use]
    pub fn stat_entry(&self, fs: Fs) -> Option<StatEntry> {
        self.stat.read().get(&fs).cloned()
    }

    /// Mean cardinality-estimation error across both statistics windows
    /// (`aqo_cardinality_error`).
    #[must_use]
    pub fn cardinality_error(&self, fs: Fs) -> Option<f64> {
        let table = self.stat.read();
        let entry = table.get(&fs)?;
        let errors: Vec<f64> = entry
            .with_predictor
            .iter()
            .chain(entry.without_predictor.iter())
            .map(|s| s.est_error)
            .collect();
        crate::numeric::mean(&errors)
    }

    /// Mean execution time across both statistics windows
    /// (`aqo_execution_time`).
    #[must_use]
    pub fn execution_time(&self, fs: Fs) -> Option<f64> {
        let table = self.stat.read();
        let entry = table.get(&fs)?;
        let times: Vec<f64> = entry
            .with_predictor
            .iter()
            .chain(entry.without_predictor.iter())
            .map(|s| s.exec_time)
            .collect();
        crate::numeric::mean(&times)
    }

    // ---------------------------------------------------------------
    // data table
    // ---------------------------------------------------------------

    /// Runs `f` against the `(fs, fss)` matrix entry (creating it with
    /// the given `cols` width if absent), under that key's logical lock.
    ///
    /// This is the sole mutation entry point for the data table; the
    /// learning pipeline calls it to apply a [`crate::knn::KnnMatrix::learn`]
    /// step under serialization against other backends learning the same
    /// key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ColsMismatch`] if an existing entry's `cols`
    /// disagrees with `cols` (a suspected `fss` collision; the entry is
    /// left untouched), [`Error::TableFull`] if a new entry would exceed
    /// `fss_max_items`, or [`Error::HeapExhausted`] if a new entry can't
    /// be charged against the heap budget.
    pub fn with_data_entry<R>(
        &self,
        fs: Fs,
        fss: Fss,
        cols: usize,
        f: impl FnOnce(&mut DataEntry) -> R,
    ) -> Result<R> {
        let _key_guard = self.key_locks.lock(fs, fss);

        if let Some(entry) = self.data.read().get(&(fs, fss)) {
            if entry.matrix.cols() != cols {
                self.metrics.record_collision();
                tracing::warn!(
                    fs,
                    fss,
                    stored_cols = entry.matrix.cols(),
                    incoming_cols = cols,
                    "possible fss collision, refusing write"
                );
                return Err(Error::ColsMismatch {
                    fs,
                    fss,
                    stored_cols: entry.matrix.cols(),
                    incoming_cols: cols,
                });
            }
        }

        let mut table = self.data.write();
        if !table.contains_key(&(fs, fss)) {
            if table.len() >= self.config.fss_max_items {
                self.metrics.record_table_full();
                tracing::info!(fs, fss, table = "data", "table full, rejecting insert");
                return Err(Error::TableFull {
                    table: "data",
                    cap: self.config.fss_max_items,
                });
            }
            let heap_bytes = cols.saturating_mul(DATA_ENTRY_HEAP_ESTIMATE_BYTES_PER_COL);
            self.heap.try_reserve(heap_bytes)?;
            table.insert(
                (fs, fss),
                DataEntry {
                    matrix: KnnMatrix::new(cols),
                    reloids: Vec::new(),
                    heap_bytes,
                },
            );
        }
        let entry = table.get_mut(&(fs, fss)).expect("entry inserted above if absent");
        let result = f(entry);
        self.data_dirty.store(true, Ordering::Relaxed);
        Ok(result)
    }

    /// Returns a copy of the `(fs, fss)` matrix, if present.
    #[must_use]
    pub fn data_matrix(&self, fs: Fs, fss: Fss) -> Option<KnnMatrix> {
        self.data.read().get(&(fs, fss)).map(|e| e.matrix.clone())
    }

    /// Finds every entry whose `fss` matches and whose matrix has the
    /// same `cols`, regardless of `fs` (the "wide search" fallback).
    #[must_use]
    pub fn wide_search(&self, fss: Fss, cols: usize) -> Vec<((Fs, Fss), KnnMatrix)> {
        self.data
            .read()
            .iter()
            .filter(|(&(_, entry_fss), entry)| entry_fss == fss && entry.matrix.cols() == cols)
            .map(|(&key, entry)| (key, entry.matrix.clone()))
            .collect()
    }

    /// Records that a plan node at `(fs, fss)` touched the given base
    /// relations, for later liveness checks by [`Store::cleanup`].
    pub fn record_reloids(&self, fs: Fs, fss: Fss, reloids: &[u64]) {
        let mut table = self.data.write();
        if let Some(entry) = table.get_mut(&(fs, fss)) {
            for &r in reloids {
                if !entry.reloids.contains(&r) {
                    entry.reloids.push(r);
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // lifecycle operations, grounded in storage.c's
    // aqo_cleanup/aqo_reset/aqo_drop_class
    // ---------------------------------------------------------------

    /// Removes every `data` entry whose relations have all been dropped,
    /// per `still_alive`. Grounded in `aqo_cleanup`.
    pub fn cleanup(&self, still_alive: impl Fn(u64) -> bool) {
        let mut table = self.data.write();
        let dead_keys: Vec<(Fs, Fss)> = table
            .iter()
            .filter(|(_, entry)| {
                !entry.reloids.is_empty() && !entry.reloids.iter().all(|&r| still_alive(r))
            })
            .map(|(&key, _)| key)
            .collect();
        for key in dead_keys {
            if let Some(entry) = table.remove(&key) {
                self.heap.release(entry.heap_bytes);
            }
        }
        self.data_dirty.store(true, Ordering::Relaxed);
    }

    /// Drops a class's preferences and every `data` entry recorded under
    /// it. Grounded in `aqo_drop_class`.
    pub fn drop_class(&self, fs: Fs) {
        self.queries.write().remove(&fs);
        let mut table = self.data.write();
        let dead_keys: Vec<(Fs, Fss)> = table
            .keys()
            .filter(|&&(entry_fs, _)| entry_fs == fs)
            .copied()
            .collect();
        for key in dead_keys {
            if let Some(entry) = table.remove(&key) {
                self.heap.release(entry.heap_bytes);
            }
        }
        self.queries_dirty.store(true, Ordering::Relaxed);
        self.data_dirty.store(true, Ordering::Relaxed);
    }

    /// Clears all four tables and the heap budget, then re-seeds the
    /// common feature space. Grounded in `aqo_reset`.
    pub fn reset(&self) {
        self.stat.write().clear();
        self.qtext.write().clear();
        self.data.write().clear();
        self.queries.write().clear();
        self.heap.release_all();
        self.stat_dirty.store(true, Ordering::Relaxed);
        self.qtext_dirty.store(true, Ordering::Relaxed);
        self.data_dirty.store(true, Ordering::Relaxed);
        self.queries_dirty.store(true, Ordering::Relaxed);
        self.seed_common_feature_space();
    }

    // ---------------------------------------------------------------
    // introspection reads (back the SQL-visible functions the original
    // exposes: aqo_query_stat, aqo_query_texts, aqo_data, aqo_queries)
    // ---------------------------------------------------------------

    /// A read-only copy of every stat entry, for `aqo-server`/`aqo-cli`.
    #[must_use]
    pub fn stat_snapshot(&self) -> Vec<(Fs, StatEntry)> {
        self.stat.read().iter().map(|(&k, v)| (k, v.clone())).collect()
    }

    /// A read-only copy of every query text, for `aqo-server`/`aqo-cli`.
    #[must_use]
    pub fn qtext_snapshot(&self) -> Vec<(Fs, String)> {
        self.qtext.read().iter().map(|(&k, v)| (k, v.clone())).collect()
    }

    /// A read-only copy of every class's preferences.
    #[must_use]
    pub fn queries_snapshot(&self) -> Vec<(Fs, Preferences)> {
        self.queries.read().iter().map(|(&k, v)| (k, *v)).collect()
    }

    /// A read-only summary of every `data` entry: `(fs, fss, cols, rows)`.
    #[must_use]
    pub fn data_rows(&self) -> Vec<(Fs, Fss, usize, usize)> {
        self.data
            .read()
            .iter()
            .map(|(&(fs, fss), e)| (fs, fss, e.matrix.cols(), e.matrix.rows()))
            .collect()
    }

    /// Current heap budget usage, for introspection.
    #[must_use]
    pub fn heap_usage(&self) -> (usize, usize) {
        (self.heap.used(), self.heap.capacity())
    }

    pub(crate) fn heap(&self) -> &Heap {
        &self.heap
    }

    pub(crate) fn dirty_flags(&self) -> [bool; 4] {
        [
            self.stat_dirty.load(Ordering::Relaxed),
            self.qtext_dirty.load(Ordering::Relaxed),
            self.data_dirty.load(Ordering::Relaxed),
            self.queries_dirty.load(Ordering::Relaxed),
        ]
    }

    pub(crate) fn clear_dirty_flags(&self, flags: [bool; 4]) {
        if flags[0] {
            self.stat_dirty.store(false, Ordering::Relaxed);
        }
        if flags[1] {
            self.qtext_dirty.store(false, Ordering::Relaxed);
        }
        if flags[2] {
            self.data_dirty.store(false, Ordering::Relaxed);
        }
        if flags[3] {
            self.queries_dirty.store(false, Ordering::Relaxed);
        }
    }

    pub(crate) fn stat_table(&self) -> &RwLock<FxHashMap<Fs, StatEntry>> {
        &self.stat
    }

    pub(crate) fn qtext_table(&self) -> &RwLock<FxHashMap<Fs, String>> {
        &self.qtext
    }

    pub(crate) fn data_table(&self) -> &RwLock<FxHashMap<(Fs, Fss), DataEntry>> {
        &self.data
    }

    pub(crate) fn queries_table(&self) -> &RwLock<FxHashMap<Fs, Preferences>> {
        &self.queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::new(StoreConfig::default())
    }

    #[test]
    fn common_feature_space_is_seeded() {
        let s = store();
        assert!(s.preferences(COMMON_FEATURE_SPACE).is_some());
        assert_eq!(s.query_text(COMMON_FEATURE_SPACE), Some(String::new()));
    }

    #[test]
    fn cols_mismatch_is_rejected_and_entry_unchanged() {
        let s = store();
        s.with_data_entry(1, 10, 2, |e| {
            e.matrix.learn(&[0.0, 0.0], 1.0, 1.0, &crate::knn::KnnParams::default());
        })
        .unwrap();
        let err = s.with_data_entry(1, 10, 3, |_| {}).unwrap_err();
        assert!(matches!(err, Error::ColsMismatch { .. }));
        assert_eq!(s.data_matrix(1, 10).unwrap().cols(), 2);
    }

    #[test]
    fn overflow_rejects_without_evicting() {
        let mut cfg = StoreConfig::default();
        cfg.fss_max_items = 1;
        let s = Store::new(cfg);
        s.with_data_entry(1, 1, 2, |_| {}).unwrap();
        let err = s.with_data_entry(2, 2, 2, |_| {}).unwrap_err();
        assert!(matches!(err, Error::TableFull { .. }));
        assert_eq!(s.data_rows().len(), 1);
    }

    #[test]
    fn cleanup_removes_dead_entries_only() {
        let s = store();
        s.with_data_entry(1, 1, 1, |_| {}).unwrap();
        s.record_reloids(1, 1, &[100]);
        s.with_data_entry(2, 2, 1, |_| {}).unwrap();
        s.record_reloids(2, 2, &[200]);
        s.cleanup(|reloid| reloid != 100);
        let remaining: Vec<_> = s.data_rows().into_iter().map(|(fs, _, _, _)| fs).collect();
        assert_eq!(remaining, vec![2]);
    }

    #[test]
    fn drop_class_removes_preferences_and_data() {
        let s = store();
        s.seed_class(5, Preferences {
            target_fs: 5,
            learn: true,
            use_predictor: false,
            auto_tune: true,
        })
        .unwrap();
        s.with_data_entry(5, 1, 1, |_| {}).unwrap();
        s.drop_class(5);
        assert!(s.preferences(5).is_none());
        assert!(s.data_rows().is_empty());
    }

    #[test]
    fn reset_restores_common_feature_space_only() {
        let s = store();
        s.seed_class(5, Preferences {
            target_fs: 5,
            learn: true,
            use_predictor: false,
            auto_tune: true,
        })
        .unwrap();
        s.reset();
        assert!(s.preferences(5).is_none());
        assert!(s.preferences(COMMON_FEATURE_SPACE).is_some());
    }
}
