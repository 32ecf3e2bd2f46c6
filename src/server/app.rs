use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::api::api_routes;
use crate::websocket::ws_handler;

use super::AppState;

/// Room for JSON framing around the largest accepted message body
const BODY_LIMIT_OVERHEAD: usize = 1024;

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.server.cors_origins);
    let body_limit = state.settings.websocket.max_body_bytes * 2 + BODY_LIMIT_OVERHEAD;

    Router::new()
        // Live delivery for the conversation with {peer_id}
        .route("/ws/{peer_id}", get(ws_handler))
        .merge(api_routes())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}
