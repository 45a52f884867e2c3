//! HTTP handlers for the introspection API, organized by domain:
//! - `health`: liveness endpoint
//! - `introspection`: read-only table dumps
//! - `admin`: mutating administration operations
//! - `demo`: the fake planner/executor's predict-then-learn cycle

pub mod admin;
pub mod demo;
pub mod health;
pub mod introspection;

pub use admin::{cleanup, drop_class, reset, set_preferences};
pub use demo::run as demo_run;
pub use health::health_check;
pub use introspection::{get_stat, heap_usage, list_data, list_queries, list_query_texts, list_stat};
