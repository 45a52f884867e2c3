//! Read-only table dumps, covering the same ground as the original's
//! `aqo_query_stat`, `aqo_query_texts`, `aqo_data`, and `aqo_queries`
//! SQL-callable functions.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::types::{DataRow, HeapUsage, QueryClassRow, QueryTextRow, StatRow};
use crate::AppState;

/// Lists every class in the `stat` table.
#[utoipa::path(
    get,
    path = "/stat",
    tag = "introspection",
    responses((status = 200, description = "Every recorded class's statistics", body = [StatRow]))
)]
pub async fn list_stat(State(state): State<Arc<AppState>>) -> Json<Vec<StatRow>> {
    let rows = state
        .store
        .stat_snapshot()
        .into_iter()
        .map(|(fs, entry)| StatRow {
            fs,
            execs_with: entry.execs_with,
            execs_without: entry.execs_without,
            cardinality_error: state.store.cardinality_error(fs),
            execution_time: state.store.execution_time(fs),
        })
        .collect();
    Json(rows)
}

/// Lists every stored query text.
#[utoipa::path(
    get,
    path = "/query-texts",
    tag = "introspection",
    responses((status = 200, description = "Every stored query text", body = [QueryTextRow]))
)]
pub async fn list_query_texts(State(state): State<Arc<AppState>>) -> Json<Vec<QueryTextRow>> {
    let rows = state
        .store
        .qtext_snapshot()
        .into_iter()
        .map(|(fs, query_text)| QueryTextRow { fs, query_text })
        .collect();
    Json(rows)
}

/// Lists every registered query class and its policy bits.
#[utoipa::path(
    get,
    path = "/queries",
    tag = "introspection",
    responses((status = 200, description = "Every registered query class", body = [QueryClassRow]))
)]
pub async fn list_queries(State(state): State<Arc<AppState>>) -> Json<Vec<QueryClassRow>> {
    let rows = state
        .store
        .queries_snapshot()
        .into_iter()
        .map(|(fs, prefs)| QueryClassRow {
            fs,
            target_fs: prefs.target_fs,
            learn: prefs.learn,
            use_predictor: prefs.use_predictor,
            auto_tune: prefs.auto_tune,
        })
        .collect();
    Json(rows)
}

/// Lists a summary of every `data` table row (feature matrices are not
/// serialized).
#[utoipa::path(
    get,
    path = "/data",
    tag = "introspection",
    responses((status = 200, description = "Every learning-matrix entry, summarized", body = [DataRow]))
)]
pub async fn list_data(State(state): State<Arc<AppState>>) -> Json<Vec<DataRow>> {
    let rows = state
        .store
        .data_rows()
        .into_iter()
        .map(|(fs, fss, cols, rows)| DataRow { fs, fss, cols, rows })
        .collect();
    Json(rows)
}

/// One class's statistics, or an empty list if it has none recorded.
#[utoipa::path(
    get,
    path = "/stat/{fs}",
    tag = "introspection",
    params(("fs" = u64, Path, description = "Feature-space identifier")),
    responses((status = 200, description = "The class's statistics, if any", body = Option<StatRow>))
)]
pub async fn get_stat(State(state): State<Arc<AppState>>, Path(fs): Path<u64>) -> Json<Option<StatRow>> {
    let row = state.store.stat_entry(fs).map(|entry| StatRow {
        fs,
        execs_with: entry.execs_with,
        execs_without: entry.execs_without,
        cardinality_error: state.store.cardinality_error(fs),
        execution_time: state.store.execution_time(fs),
    });
    Json(row)
}

/// Current heap-budget usage.
#[utoipa::path(
    get,
    path = "/heap",
    tag = "introspection",
    responses((status = 200, description = "Current heap budget usage", body = HeapUsage))
)]
pub async fn heap_usage(State(state): State<Arc<AppState>>) -> Json<HeapUsage> {
    let (used_bytes, capacity_bytes) = state.store.heap_usage();
    Json(HeapUsage {
        used_bytes,
        capacity_bytes,
    })
}
