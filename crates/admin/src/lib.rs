pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use throttlegate_rate_limit::RateLimit;
use tower_http::cors::{Any, CorsLayer};

pub use state::{AppState, GateMetrics, SharedState};

/// Build the public router: the throttled application routes and the reset
/// endpoint.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/run", get(routes::run::run))
        .route("/reset", post(routes::reset::reset))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
}

/// Build the admin API router. It can replace the rule set, so it is only
/// served on the admin listener.
pub fn build_admin_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/api/health", get(routes::health::health_check))
        // Prometheus metrics
        .route("/api/metrics", get(routes::metrics::get_metrics))
        // Rule set management
        .route(
            "/api/config",
            get(routes::config::get_config).put(routes::config::update_config),
        )
        // Counter statistics
        .route("/api/stats", get(routes::stats::get_stats))
        .with_state(state)
        .layer(cors)
}

/// Serve the public router on `listen_addr` until the server shuts down.
pub async fn run_server(state: SharedState, listen_addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("throttlegate listening on {}", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Serve the admin API on `listen_addr` until the server shuts down.
pub async fn run_admin_server(state: SharedState, listen_addr: &str) -> anyhow::Result<()> {
    let app = build_admin_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("admin API server listening on {}", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Wrap an engine in fresh shared state.
pub fn new_shared_state(limiter: RateLimit) -> anyhow::Result<SharedState> {
    Ok(Arc::new(AppState::new(limiter)?))
}
