#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]
//! HTTP introspection surface for an `aqo-core` learning store.
//!
//! Exposes read-only dumps of the four learning-store tables and the
//! mutating administration operations the original provides as
//! SQL-callable functions (`aqo_query_stat`, `aqo_query_texts`, `aqo_data`,
//! `aqo_queries`, `aqo_enable_query`, `aqo_disable_query`, `aqo_reset`,
//! `aqo_cleanup`, `aqo_drop_class`, `aqo_cardinality_error`,
//! `aqo_execution_time`), plus a `/demo/run` endpoint that drives a
//! minimal fake planner/executor through one predict-then-learn cycle for
//! demonstration and integration testing. This crate is glue around
//! [`aqo_core`], not the subject itself, and is kept thin.
//!
//! ## OpenAPI Documentation
//!
//! - Swagger UI: `GET /swagger-ui`
//! - OpenAPI JSON: `GET /api-docs/openapi.json`

mod handlers;
mod planner;
mod types;

use aqo_core::config::AqoConfig;
use aqo_core::{LearnCache, Store};
use utoipa::OpenApi;

pub use types::*;

pub use handlers::{
    cleanup, demo_run, drop_class, get_stat, health_check, heap_usage, list_data, list_queries,
    list_query_texts, list_stat, reset, set_preferences,
};

/// `aqo-server` API documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "aqo-server API",
        version = "0.3.0",
        description = "Introspection and administration surface for an adaptive cardinality predictor's learning store.",
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "introspection", description = "Read-only table dumps"),
        (name = "admin", description = "Mutating administration operations"),
        (name = "demo", description = "Fake planner/executor demo driver"),
    ),
    paths(
        handlers::health::health_check,
        handlers::introspection::list_stat,
        handlers::introspection::get_stat,
        handlers::introspection::list_query_texts,
        handlers::introspection::list_queries,
        handlers::introspection::list_data,
        handlers::introspection::heap_usage,
        handlers::admin::set_preferences,
        handlers::admin::drop_class,
        handlers::admin::cleanup,
        handlers::admin::reset,
        handlers::demo::run,
    ),
    components(
        schemas(
            StatRow,
            QueryTextRow,
            QueryClassRow,
            DataRow,
            HeapUsage,
            SetPreferencesRequest,
            DemoRunRequest,
            DemoRunResponse,
            ErrorResponse,
        )
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers.
pub struct AppState {
    /// The learning store every handler reads from or mutates.
    pub store: Store,
    /// The learn cache the demo planner stages timeout samples into.
    pub cache: LearnCache,
    /// The predictor configuration the demo planner runs under.
    pub config: AqoConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::OpenApi;

    #[test]
    fn openapi_spec_generates() {
        let openapi = ApiDoc::openapi();
        let json = openapi.to_json().expect("failed to serialize OpenAPI spec");
        assert!(!json.is_empty());
        assert!(json.contains("aqo-server API"));
    }

    #[test]
    fn openapi_documents_every_endpoint() {
        let openapi = ApiDoc::openapi();
        let json = openapi.to_json().expect("failed to serialize OpenAPI spec");
        for path in ["/health", "/stat", "/query-texts", "/queries", "/data", "/demo/run", "/reset"] {
            assert!(json.contains(path), "should document {path}");
        }
    }

    #[test]
    fn openapi_has_every_tag() {
        let openapi = ApiDoc::openapi();
        let json = openapi.to_json().expect("failed to serialize OpenAPI spec");
        for tag in ["health", "introspection", "admin", "demo"] {
            assert!(json.contains(&format!("\"{tag}\"")), "should have {tag} tag");
        }
    }

    #[test]
    fn set_preferences_request_deserializes() {
        let json = r#"{"learn": true, "use_predictor": false}"#;
        let req: SetPreferencesRequest = serde_json::from_str(json).unwrap();
        assert!(req.learn);
        assert!(!req.use_predictor);
        assert!(!req.auto_tune);
    }

    #[test]
    fn demo_run_request_defaults_relation_count() {
        let json = r#"{"fs": 1, "actual_rows": 10.0}"#;
        let req: DemoRunRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.relation_count, 1);
    }
}
