//! Mutating administration endpoints, covering the same ground as the
//! original's `aqo_enable_query`, `aqo_disable_query`, `aqo_reset`,
//! `aqo_cleanup`, and `aqo_drop_class` SQL-callable functions.

use std::sync::Arc;

use aqo_core::store::Preferences;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::types::SetPreferencesRequest;
use crate::AppState;

/// Sets a class's `learn`/`use_predictor`/`auto_tune` bits, registering
/// the class first if it isn't already known.
#[utoipa::path(
    post,
    path = "/queries/{fs}/preferences",
    tag = "admin",
    params(("fs" = u64, Path, description = "Feature-space identifier")),
    request_body = SetPreferencesRequest,
    responses((status = 204, description = "Preferences updated"))
)]
pub async fn set_preferences(
    State(state): State<Arc<AppState>>,
    Path(fs): Path<u64>,
    Json(body): Json<SetPreferencesRequest>,
) -> StatusCode {
    let target_fs = state.store.preferences(fs).map_or(fs, |p| p.target_fs);
    state.store.update_preferences(
        fs,
        Preferences {
            target_fs,
            learn: body.learn,
            use_predictor: body.use_predictor,
            auto_tune: body.auto_tune,
        },
    );
    StatusCode::NO_CONTENT
}

/// Removes every `data` entry whose relations no longer exist. Since
/// this server has no catalog of its own, every relation id is treated
/// as live; the demo planner never records one that doesn't "exist", so
/// this endpoint is exercised by tests that pre-seed dead relation ids
/// directly against the store.
#[utoipa::path(
    post,
    path = "/cleanup",
    tag = "admin",
    responses((status = 204, description = "Cleanup completed"))
)]
pub async fn cleanup(State(state): State<Arc<AppState>>) -> StatusCode {
    state.store.cleanup(|_relid| true);
    StatusCode::NO_CONTENT
}

/// Drops a class's preferences and every `data` entry recorded under it.
#[utoipa::path(
    delete,
    path = "/queries/{fs}",
    tag = "admin",
    params(("fs" = u64, Path, description = "Feature-space identifier")),
    responses((status = 204, description = "Class dropped"))
)]
pub async fn drop_class(State(state): State<Arc<AppState>>, Path(fs): Path<u64>) -> StatusCode {
    state.store.drop_class(fs);
    StatusCode::NO_CONTENT
}

/// Clears every table and re-seeds the common feature space.
#[utoipa::path(
    post,
    path = "/reset",
    tag = "admin",
    responses((status = 204, description = "Store reset"))
)]
pub async fn reset(State(state): State<Arc<AppState>>) -> StatusCode {
    state.store.reset();
    StatusCode::NO_CONTENT
}
