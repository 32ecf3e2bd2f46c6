//! Participant identity supplied by the upstream gateway.
//!
//! Authentication happens before requests reach this service; the gateway
//! forwards the authenticated id in a header (`identity.header`). The id is
//! treated as opaque.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::fanout::ParticipantId;
use crate::server::AppState;

/// The authenticated participant making the request
#[derive(Debug, Clone)]
pub struct Participant(pub ParticipantId);

impl FromRequestParts<AppState> for Participant {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = state.settings.identity.header.as_str();
        let raw = parts
            .headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Identity("Missing participant identity".to_string()))?;

        ParticipantId::new(raw)
            .map(Participant)
            .map_err(|_| AppError::Identity("Empty participant identity".to_string()))
    }
}
