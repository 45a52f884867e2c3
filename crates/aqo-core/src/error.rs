//! Error types for the predictor core.
//!
//! Every variant here names an internal failure kind from the error-handling
//! design: store overflow, heap exhaustion, snapshot I/O, dimensional
//! collisions. None of these are meant to reach a query's caller: the
//! pipelines in [`crate::predict`] and [`crate::learn`] catch them at a
//! single boundary and downgrade to the planner's default estimator or a
//! skipped learning sample. The error type exists for logging and for the
//! introspection surface (`aqo-server`, `aqo-cli`), not for propagating
//! failures into a live query.

use thiserror::Error;

/// Result type alias for predictor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the predictor core.
///
/// Each variant carries a stable code of the form `AQO-NNN`.
#[derive(Error, Debug)]
pub enum Error {
    /// A table (stat/qtext/data/queries) is at its configured capacity
    /// (AQO-001).
    #[error("[AQO-001] table '{table}' is full (cap={cap})")]
    TableFull {
        /// Which table rejected the insert.
        table: &'static str,
        /// The table's configured capacity.
        cap: usize,
    },

    /// The shared heap segment has no room for a new allocation (AQO-002).
    #[error("[AQO-002] shared heap exhausted: requested {requested} bytes, {available} available")]
    HeapExhausted {
        /// Bytes requested.
        requested: usize,
        /// Bytes remaining in the heap.
        available: usize,
    },

    /// A write to a `data` entry disagreed with the stored `cols` (AQO-003).
    #[error("[AQO-003] possible fss collision: fs={fs} fss={fss} stored cols={stored_cols} incoming cols={incoming_cols}")]
    ColsMismatch {
        /// Feature space.
        fs: u64,
        /// Feature sub-space.
        fss: i32,
        /// `cols` already on file for this key.
        stored_cols: usize,
        /// `cols` in the incoming write.
        incoming_cols: usize,
    },

    /// Snapshot file failed to decode (AQO-004): bad magic, version
    /// mismatch, or a truncated read.
    #[error("[AQO-004] snapshot decode error in '{file}': {reason}")]
    SnapshotDecode {
        /// Path of the snapshot file.
        file: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Snapshot file failed to write (AQO-005): the prior snapshot is left
    /// intact.
    #[error("[AQO-005] snapshot write error in '{file}': {source}")]
    SnapshotWrite {
        /// Path of the snapshot file.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O error (AQO-006).
    #[error("[AQO-006] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration value failed validation (AQO-007).
    #[error("[AQO-007] configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the stable error code (e.g. `"AQO-001"`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TableFull { .. } => "AQO-001",
            Self::HeapExhausted { .. } => "AQO-002",
            Self::ColsMismatch { .. } => "AQO-003",
            Self::SnapshotDecode { .. } => "AQO-004",
            Self::SnapshotWrite { .. } => "AQO-005",
            Self::Io(_) => "AQO-006",
            Self::Config(_) => "AQO-007",
        }
    }

    /// Returns true if the predictor should simply downgrade to the
    /// default estimator / skip learning rather than treat this as fatal.
    ///
    /// Every variant here is recoverable; the method exists so call sites
    /// read as intentional rather than as an oversight, matching the
    /// boolean the host-facing pipelines check before logging-and-continuing.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        true
    }
}
