//! Drives the in-process fake planner/executor through one predict-then-learn
//! cycle, so the predictor's behavior can be observed end to end without a
//! real query engine attached.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::planner::run_demo_cycle;
use crate::types::{DemoRunRequest, DemoRunResponse};
use crate::AppState;

/// Runs one simulated query through predict-then-learn and reports what
/// happened.
#[utoipa::path(
    post,
    path = "/demo/run",
    tag = "demo",
    request_body = DemoRunRequest,
    responses((status = 200, description = "The cycle's prediction and what was learned", body = DemoRunResponse))
)]
pub async fn run(State(state): State<Arc<AppState>>, Json(body): Json<DemoRunRequest>) -> Json<DemoRunResponse> {
    let cycle = run_demo_cycle(
        &state.store,
        &state.cache,
        body.fs,
        body.relation_count,
        body.actual_rows,
        &state.config,
    );
    Json(DemoRunResponse {
        fss: cycle.fss,
        predicted_rows: cycle.predicted_rows,
        actual_rows: cycle.actual_rows,
    })
}
