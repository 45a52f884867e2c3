//! # `aqo-core`
//!
//! An adaptive cardinality predictor for a cost-based query planner: it
//! augments a planner's built-in row-count estimates with predictions
//! learned from prior executions of structurally similar queries, and
//! updates those predictions after each execution completes.
//!
//! The crate is organized the way the original `aqo` PostgreSQL extension
//! splits its C sources, one module per file:
//!
//! - [`hash`]: constant-insensitive, order-insensitive hashing of
//!   expression trees, clause lists, and relation sets (`hash.c`).
//! - [`knn`]: the fixed-capacity k-nearest-neighbour regressor over
//!   log-selectivity feature vectors (`machine_learning.c`).
//! - [`store`]: the shared learning store: four capped concurrent hash
//!   tables, a heap-budget accountant, per-key locks, and snapshot
//!   files (`storage.c`).
//! - [`predict`]: the prediction pipeline invoked during planning
//!   (`cardinality_estimation.c`).
//! - [`learn`]: the learning pipeline invoked after execution
//!   (`postprocessing.c`).
//! - [`autotuner`]: the per-class policy state machine
//!   (`auto_tuning.c`).
//! - [`learn_cache`]: backend-local staging for samples collected at
//!   statement timeout (`learn_cache.c`).
//! - [`selectivity_cache`]: per-planning-pass scratch cache recovering
//!   selectivities at learning time without re-asking the planner.
//! - [`numeric`]: stable sort, permutation, and vector primitives
//!   shared by the above (`aqo_shared.c`'s numeric helpers).
//! - [`config`]: operating mode and tuning knobs, loaded from
//!   `aqo.toml` layered with `AQO_*` environment variables.
//! - [`metrics`]: atomic activity counters, exposed to `aqo-cli` and
//!   `aqo-server` for introspection.
//! - [`error`]: the single error type every pipeline downgrades to a
//!   "use the planner's default" decision at its boundary.
//!
//! ## Quick start
//!
//! ```rust
//! use aqo_core::config::StoreConfig;
//! use aqo_core::hash::{fss_for_object, ClauseInput, Expr, RelationSignature};
//! use aqo_core::store::Store;
//!
//! let store = Store::new(StoreConfig::default());
//!
//! let clause = Expr::BinaryOp {
//!     op: 1,
//!     left: Box::new(Expr::Var(1)),
//!     right: Box::new(Expr::Constant),
//! };
//! let clauses = vec![ClauseInput {
//!     expr: &clause,
//!     is_eq_clause: false,
//!     selectivity: 0.2,
//! }];
//! let relations = [RelationSignature::Permanent(42)];
//!
//! let subspace = fss_for_object(&relations, &clauses, &[], -30.0);
//! assert!(store.data_matrix(1, subspace.fss).is_none());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod autotuner;
pub mod config;
pub mod error;
pub mod hash;
pub mod knn;
pub mod learn;
pub mod learn_cache;
pub mod metrics;
pub mod numeric;
pub mod predict;
pub mod selectivity_cache;
pub mod store;
mod sync;

pub use config::AqoConfig;
pub use error::{Error, Result};
pub use learn::{learn_node, ErrorAccumulator, ExecutionOutcome, LearnResult, WorkerContribution};
pub use learn_cache::LearnCache;
pub use predict::{predict_for_aggregate, predict_for_node, NodePrediction, Prediction};
pub use selectivity_cache::SelectivityCache;
pub use store::{Fs, Fss, Store};
