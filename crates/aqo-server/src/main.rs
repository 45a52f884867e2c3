#![allow(clippy::doc_markdown)]
//! `aqo-server`: HTTP introspection surface for an `aqo-core` learning store.

use std::sync::Arc;

use aqo_core::config::AqoConfig;
use aqo_core::{LearnCache, Store};
use axum::routing::{delete, get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use aqo_server::{
    cleanup, demo_run, drop_class, get_stat, health_check, heap_usage, list_data, list_queries,
    list_query_texts, list_stat, reset, set_preferences, ApiDoc, AppState,
};

/// aqo-server: introspection and administration over a learning store
#[derive(Parser, Debug)]
#[command(name = "aqo-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the predictor configuration file.
    #[arg(long, default_value = "aqo.toml", env = "AQO_CONFIG_PATH")]
    config: String,

    /// Host address to bind to.
    #[arg(long, default_value = "0.0.0.0", env = "AQO_HOST")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, default_value = "8080", env = "AQO_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = AqoConfig::load_from_path(&args.config).unwrap_or_else(|err| {
        tracing::warn!(path = %args.config, error = %err, "failed to load config, using defaults");
        AqoConfig::default()
    });

    tracing::info!(mode = ?config.mode, "starting aqo-server");

    let store = Store::new(config.store.clone());
    if !config.store.snapshot_dir.is_empty() {
        let dir = std::path::Path::new(&config.store.snapshot_dir);
        if dir.exists() {
            if let Err(err) = aqo_core::store::snapshot::load(&store, dir) {
                tracing::warn!(error = %err, "failed to load snapshot, starting empty");
            }
        }
    }

    let state = Arc::new(AppState {
        store,
        cache: LearnCache::new(),
        config,
    });

    let api_router = Router::new()
        .route("/health", get(health_check))
        .route("/stat", get(list_stat))
        .route("/stat/{fs}", get(get_stat))
        .route("/query-texts", get(list_query_texts))
        .route("/queries", get(list_queries))
        .route("/queries/{fs}/preferences", post(set_preferences))
        .route("/queries/{fs}", delete(drop_class))
        .route("/data", get(list_data))
        .route("/heap", get(heap_usage))
        .route("/cleanup", post(cleanup))
        .route("/reset", post(reset))
        .route("/demo/run", post(demo_run))
        .with_state(state);

    let swagger_ui = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi());

    let app = api_router
        .merge(Router::<()>::new().merge(swagger_ui))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("aqo-server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
