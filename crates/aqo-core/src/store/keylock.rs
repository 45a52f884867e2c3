//! Per-`(fs, fss)` logical locks.
//!
//! Serializes the read-then-write sequence a learning update performs on
//! one `data` entry across concurrent callers, independent of the
//! table-level `RwLock` that merely protects the hash table's own
//! structure (insertion/removal). A small fixed array of shards keeps
//! this cheap without one lock per key.

use parking_lot::{Mutex, MutexGuard};

use crate::hash::Hash32;
use crate::store::Fs;

/// A fixed-size array of shard locks, indexed by a hash of `(fs, fss)`.
#[derive(Debug)]
pub struct KeyLockTable {
    shards: Vec<Mutex<()>>,
}

impl KeyLockTable {
    /// Creates a table with `shard_count` independent locks.
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is zero.
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        assert!(shard_count > 0, "key lock table needs at least one shard");
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard_index(&self, fs: Fs, fss: Hash32) -> usize {
        let combined = fs.wrapping_mul(0x0100_0000_01b3).wrapping_add(fss as u64);
        (combined % self.shards.len() as u64) as usize
    }

    /// Acquires the shard lock guarding `(fs, fss)`. Held for the
    /// duration of a single learning update's read-then-write sequence.
    pub fn lock(&self, fs: Fs, fss: Hash32) -> MutexGuard<'_, ()> {
        self.shards[self.shard_index(fs, fss)].lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_maps_to_same_shard() {
        let table = KeyLockTable::new(16);
        assert_eq!(table.shard_index(7, 42), table.shard_index(7, 42));
    }
}
