//! Adapts an axum WebSocket to the fan-out `Transport` seam.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use std::sync::Arc;

use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};

use crate::fanout::{CloseCode, CloseReason, OutboundFrame, Subscriber, Transport, TransportError};

/// "No status received" close code, used when a close frame carries no code
const NO_STATUS_CODE: u16 = 1005;

/// Write half of an upgraded WebSocket
pub struct WsTransport {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sink
            .send(Message::Text(frame.as_str().into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self, code: CloseCode, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;

        let frame = CloseFrame {
            code: code.as_u16(),
            reason: reason.into(),
        };
        if let Err(e) = self.sink.send(Message::Close(Some(frame))).await {
            tracing::trace!(error = %e, "Close frame not sent");
        }
        let _ = self.sink.close().await;
    }
}

/// Read half watcher.
///
/// Inbound data frames carry nothing for this service; the watcher only turns
/// a peer close or a read failure into a subscriber close.
pub async fn watch_peer<S>(mut stream: S, subscriber: Arc<Subscriber>)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = subscriber.closed() => return,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(Message::Close(frame))) => {
                let code = frame.map(|f| f.code).unwrap_or(NO_STATUS_CODE);
                tracing::debug!(subscriber_id = %subscriber.id, code, "Received close frame");
                subscriber.close(CloseReason::PeerClosed { code });
                return;
            }
            // Pings are answered by axum; text and binary input is ignored
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                subscriber.close(CloseReason::TransportFailure(e.to_string()));
                return;
            }
            None => {
                subscriber.close(CloseReason::Disconnected);
                return;
            }
        }
    }
}
