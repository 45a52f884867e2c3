//! Request and response bodies for the introspection API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One row of the `stat` table, as rendered over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatRow {
    /// Feature-space identifier.
    pub fs: u64,
    /// Total executions that used the predictor.
    pub execs_with: i64,
    /// Total executions that used the planner's default estimator.
    pub execs_without: i64,
    /// Most recent cardinality error, if any executions were recorded.
    pub cardinality_error: Option<f64>,
    /// Most recent execution time, if any executions were recorded.
    pub execution_time: Option<f64>,
}

/// One row of the `qtext` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryTextRow {
    /// Feature-space identifier.
    pub fs: u64,
    /// The stored query text, possibly truncated.
    pub query_text: String,
}

/// One row of the `queries` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryClassRow {
    /// Feature-space identifier.
    pub fs: u64,
    /// Feature space actually used to record this class's learning.
    pub target_fs: u64,
    /// Whether new samples are recorded for this class.
    pub learn: bool,
    /// Whether the predictor's estimate is used for this class.
    pub use_predictor: bool,
    /// Whether the auto-tuner manages this class's policy bits.
    pub auto_tune: bool,
}

/// One row of the `data` table, summarized (the feature matrix itself is
/// not serialized over HTTP).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DataRow {
    /// Feature-space identifier.
    pub fs: u64,
    /// Feature-sub-space identifier.
    pub fss: i32,
    /// Width of each stored feature vector.
    pub cols: usize,
    /// Number of rows currently stored.
    pub rows: usize,
}

/// Current heap-budget usage.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HeapUsage {
    /// Bytes currently charged against the budget.
    pub used_bytes: usize,
    /// Total byte budget.
    pub capacity_bytes: usize,
}

/// Body for `POST /queries/{fs}/preferences`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetPreferencesRequest {
    /// Whether new samples should be recorded for this class.
    pub learn: bool,
    /// Whether the predictor's estimate should be used for this class.
    pub use_predictor: bool,
    /// Whether the auto-tuner should manage this class's policy bits.
    #[serde(default)]
    pub auto_tune: bool,
}

/// Body for `POST /demo/run`: drives the in-process fake planner/executor
/// through one predict-then-learn cycle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DemoRunRequest {
    /// Feature-space identifier for the simulated query class.
    pub fs: u64,
    /// Number of relations the simulated query joins.
    #[serde(default = "default_relation_count")]
    pub relation_count: u32,
    /// Simulated true row count the fake executor would report.
    pub actual_rows: f64,
}

fn default_relation_count() -> u32 {
    1
}

/// Result of a single demo predict-then-learn cycle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DemoRunResponse {
    /// Feature-sub-space the simulated node hashed to.
    pub fss: Option<i32>,
    /// The predictor's row-count estimate, if it had enough history to
    /// produce one.
    pub predicted_rows: Option<f64>,
    /// The simulated actual row count that was learned from.
    pub actual_rows: f64,
}

/// A plain error body returned on any introspection failure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable error code (`AQO-NNN`), when the failure came from
    /// `aqo-core`.
    pub code: Option<&'static str>,
    /// Human-readable description.
    pub message: String,
}
