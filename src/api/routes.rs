use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Live scanning
        .route("/api/scan", post(handlers::trigger_scan))
        .route("/api/signals", get(handlers::get_signals))
        // Backtest jobs
        .route(
            "/api/backtest",
            post(handlers::submit_backtest).get(handlers::list_jobs),
        )
        .route(
            "/api/backtest/:id",
            get(handlers::get_job).delete(handlers::delete_job),
        )
        .with_state(state)
        .layer(cors)
}
