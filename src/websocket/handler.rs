use std::time::Instant;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;

use crate::error::Result;
use crate::fanout::{ConversationKey, ParticipantId, ServingLoop};
use crate::identity::Participant;
use crate::metrics::{WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION};
use crate::server::AppState;

use super::transport::{watch_peer, WsTransport};

/// WebSocket upgrade handler for live delivery of one conversation.
///
/// The conversation key is checked before the upgrade itself, so a bad peer
/// id is a 400 whether or not the request could be upgraded.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, me),
    fields(participant = %me.0)
)]
pub async fn ws_handler(
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    me: Participant,
    Path(peer_id): Path<String>,
) -> Result<Response> {
    let me = me.0;
    let peer = ParticipantId::new(peer_id)?;
    let key = ConversationKey::new(me.clone(), peer)?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    tracing::debug!(conversation = %key, "WebSocket upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, key, me)))
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, key, me),
    fields(conversation = %key, participant = %me)
)]
async fn handle_socket(socket: WebSocket, state: AppState, key: ConversationKey, me: ParticipantId) {
    let connection_start = Instant::now();

    let (room, subscription) = match state.registry.subscribe(&key, me) {
        Ok(registered) => registered,
        Err(e) => {
            tracing::warn!(error = %e, "Subscription rejected");
            return;
        }
    };
    let subscriber = subscription.subscriber.clone();

    WS_CONNECTIONS_OPENED.inc();
    tracing::info!(subscriber_id = %subscriber.id, "WebSocket connection established");

    let (sink, stream) = socket.split();
    let watcher = tokio::spawn(watch_peer(stream, subscriber.clone()));
    let mut transport = WsTransport::new(sink);

    let result = ServingLoop::new(room, subscription, state.shutdown.child_token())
        .with_write_timeout(state.settings.websocket.write_timeout())
        .run(&mut transport)
        .await;

    watcher.abort();

    WS_CONNECTIONS_CLOSED.inc();
    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    match result {
        Ok(()) => tracing::info!(
            subscriber_id = %subscriber.id,
            duration_secs = duration,
            "WebSocket connection closed"
        ),
        Err(e) => tracing::warn!(
            subscriber_id = %subscriber.id,
            duration_secs = duration,
            error = %e,
            "WebSocket connection ended abnormally"
        ),
    }
}
