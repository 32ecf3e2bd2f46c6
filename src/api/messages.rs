//! Direct message publish endpoint.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::fanout::{ConversationKey, ParticipantId, PublishOutcome};
use crate::identity::Participant;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub created: DateTime<Utc>,
    /// Live subscribers the message was queued for
    pub delivered_to: usize,
    /// Subscribers dropped for not keeping up
    pub disconnected: usize,
    /// Whether a room existed for the conversation
    pub live: bool,
}

/// Store a message, then fan it out to the conversation's live subscribers.
///
/// The message is only published after the store has accepted it; a message
/// with nobody listening is still a success.
#[tracing::instrument(
    name = "http.send_message",
    skip(state, me, request),
    fields(from_id = %me.0, to_id = %request.receiver_id)
)]
pub async fn send_message(
    State(state): State<AppState>,
    me: Participant,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>)> {
    let me = me.0;
    validate_body(&request.body, state.settings.websocket.max_body_bytes)?;

    let receiver = ParticipantId::new(request.receiver_id)?;
    let key = ConversationKey::new(me.clone(), receiver.clone())?;

    let message = state.store.send(&me, &receiver, &request.body).await?;
    let outcome = state.registry.publish(&key, &message)?;
    let report = outcome.report();

    tracing::debug!(
        conversation = %key,
        delivered_to = report.delivered,
        disconnected = report.disconnected,
        "Message published"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SendMessageResponse {
            created: message.created,
            delivered_to: report.delivered,
            disconnected: report.disconnected,
            live: outcome != PublishOutcome::NoActiveRoom,
        }),
    ))
}

fn validate_body(body: &str, max_bytes: usize) -> Result<()> {
    if body.trim().is_empty() {
        return Err(AppError::Validation("Message body must not be empty".to_string()));
    }
    if body.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "Message body exceeds {} bytes",
            max_bytes
        )));
    }
    Ok(())
}
