//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub rooms: usize,
    pub subscribers: usize,
    pub store_backend: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry = state.registry.stats();

    Json(StatsResponse {
        rooms: registry.rooms,
        subscribers: registry.subscribers,
        store_backend: state.store.backend_name().to_string(),
    })
}
