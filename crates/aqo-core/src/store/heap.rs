//! Accounting for the "shared heap segment" that backs variable-length
//! `qtext` strings and `data` matrix rows.
//!
//! The original allocates these bytes in a PostgreSQL DSM segment shared
//! across backend processes. This crate is an embedded, single-process
//! library: there is no separate process to share memory with, so
//! entries simply own their bytes (`String`, `Vec<f64>`) directly rather
//! than living behind an offset into a raw arena (an unsafe-pointer
//! arena-allocator design was evaluated and rejected for this reason).
//! What *is* preserved is the budget: a fixed byte cap
//! (`dsm_size_max`) that every variable-length write counts against, with
//! the same "roll back and fail" policy as the original's DSM allocator.

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Tracks bytes charged against a fixed capacity.
#[derive(Debug)]
pub struct Heap {
    max_bytes: usize,
    used_bytes: Mutex<usize>,
}

impl Heap {
    /// Creates a heap budget of `max_mb` megabytes.
    #[must_use]
    pub fn new(max_mb: usize) -> Self {
        Self {
            max_bytes: max_mb.saturating_mul(1024 * 1024),
            used_bytes: Mutex::new(0),
        }
    }

    /// Reserves `bytes` against the budget, or fails without mutating
    /// anything if that would exceed capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeapExhausted`] if `bytes` would exceed capacity.
    pub fn try_reserve(&self, bytes: usize) -> Result<()> {
        let mut used = self.used_bytes.lock();
        if used.saturating_add(bytes) > self.max_bytes {
            return Err(Error::HeapExhausted {
                requested: bytes,
                available: self.max_bytes.saturating_sub(*used),
            });
        }
        *used += bytes;
        Ok(())
    }

    /// Releases a previously-reserved amount back to the budget.
    pub fn release(&self, bytes: usize) {
        let mut used = self.used_bytes.lock();
        *used = used.saturating_sub(bytes);
    }

    /// Releases the entire budget at once, for `reset()`.
    pub fn release_all(&self) {
        *self.used_bytes.lock() = 0;
    }

    /// Bytes currently reserved.
    #[must_use]
    pub fn used(&self) -> usize {
        *self.used_bytes.lock()
    }

    /// Total capacity, in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_fails_past_capacity() {
        let heap = Heap::new(0);
        assert!(heap.try_reserve(1).is_err());
    }

    #[test]
    fn release_frees_capacity_for_reuse() {
        let heap = Heap::new(1);
        let cap = heap.capacity();
        heap.try_reserve(cap).unwrap();
        assert!(heap.try_reserve(1).is_err());
        heap.release(cap);
        assert!(heap.try_reserve(1).is_ok());
    }
}
