use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::messages::send_message;
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health, stats & metrics
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new().route("/messages", post(send_message)),
        )
}
