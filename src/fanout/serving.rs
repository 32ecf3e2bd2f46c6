//! Per-subscriber serving loop and the transport seam it writes through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::metrics::FanoutMetrics;

use super::message::OutboundFrame;
use super::room::Room;
use super::subscriber::{CloseCode, CloseReason, Subscriber, Subscription};

/// Default per-write deadline
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport already closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Write half of one accepted connection.
///
/// Framing, upgrade and handshake are the implementor's business; the
/// serving loop only sends opaque frames and closes once.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError>;

    /// Close with a status code and reason. Errors are swallowed by the implementor.
    async fn close(&mut self, code: CloseCode, reason: &str);
}

/// Abnormal ways a serving loop can end.
///
/// Cancellation and orderly peer closes are not errors and map to `Ok(())`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServeError {
    #[error("subscriber could not keep up and was disconnected")]
    SlowConsumer,

    #[error("write exceeded deadline")]
    WriteTimeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("peer closed connection with status {0}")]
    PeerClosed(u16),
}

impl ServeError {
    fn from_reason(reason: &CloseReason) -> Option<Self> {
        if reason.is_benign() {
            return None;
        }
        Some(match reason {
            CloseReason::SlowConsumer => Self::SlowConsumer,
            CloseReason::WriteTimeout => Self::WriteTimeout,
            CloseReason::TransportFailure(e) => Self::Transport(e.clone()),
            CloseReason::PeerClosed { code } => Self::PeerClosed(*code),
            CloseReason::Disconnected | CloseReason::Cancelled => {
                Self::Transport(reason.to_string())
            }
        })
    }
}

/// Removes the subscriber from its room however the loop is left, including
/// when the serving future itself is dropped.
struct RemovalGuard<'a> {
    room: &'a Room,
    subscriber_id: Uuid,
}

impl Drop for RemovalGuard<'_> {
    fn drop(&mut self) {
        self.room.remove_subscriber(self.subscriber_id);
    }
}

/// Drives delivery for one registered subscriber
pub struct ServingLoop {
    room: Arc<Room>,
    subscription: Subscription,
    cancel: CancellationToken,
    write_timeout: Duration,
}

impl ServingLoop {
    pub fn new(room: Arc<Room>, subscription: Subscription, cancel: CancellationToken) -> Self {
        Self {
            room,
            subscription,
            cancel,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Deliver queued frames until the subscriber closes or the owning token is cancelled.
    ///
    /// On exit the subscriber is always removed from the room and the
    /// transport is closed exactly once.
    pub async fn run<T>(self, transport: &mut T) -> Result<(), ServeError>
    where
        T: Transport + ?Sized,
    {
        let Self {
            room,
            subscription,
            cancel,
            write_timeout,
        } = self;
        let Subscription {
            subscriber,
            mut receiver,
        } = subscription;

        let _guard = RemovalGuard {
            room: &room,
            subscriber_id: subscriber.id,
        };

        loop {
            tokio::select! {
                biased;
                _ = subscriber.closed() => break,
                _ = cancel.cancelled() => {
                    subscriber.close(CloseReason::Cancelled);
                    break;
                }
                frame = receiver.recv() => {
                    let Some(frame) = frame else {
                        subscriber.close(CloseReason::TransportFailure("outbound queue closed".into()));
                        break;
                    };
                    if let Err(reason) =
                        write_frame(&subscriber, &cancel, transport, &frame, write_timeout).await
                    {
                        subscriber.close(reason);
                        break;
                    }
                }
            }
        }

        room.remove_subscriber(subscriber.id);

        let reason = subscriber
            .settled_reason()
            .await
            .unwrap_or(CloseReason::Cancelled);

        if subscriber.finish() {
            let code = reason.close_code();
            if timeout(write_timeout, transport.close(code, reason.description()))
                .await
                .is_err()
            {
                tracing::debug!(subscriber_id = %subscriber.id, "Transport close timed out");
            }
        }

        FanoutMetrics::record_serve_exit(reason.label());
        tracing::debug!(
            conversation = %room.key(),
            subscriber_id = %subscriber.id,
            participant = %subscriber.participant,
            reason = %reason,
            "Serving loop finished"
        );

        match ServeError::from_reason(&reason) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Write one frame under the per-write deadline, giving up early if the
/// subscriber is closed or the owning token is cancelled mid-write.
async fn write_frame<T>(
    subscriber: &Subscriber,
    cancel: &CancellationToken,
    transport: &mut T,
    frame: &OutboundFrame,
    write_timeout: Duration,
) -> Result<(), CloseReason>
where
    T: Transport + ?Sized,
{
    tokio::select! {
        biased;
        // The loop picks up the recorded reason on its next turn
        _ = subscriber.closed() => Ok(()),
        _ = cancel.cancelled() => Err(CloseReason::Cancelled),
        result = timeout(write_timeout, transport.send(frame)) => match result {
            Ok(Ok(())) => {
                FanoutMetrics::record_frame_written();
                Ok(())
            }
            Ok(Err(e)) => Err(CloseReason::TransportFailure(e.to_string())),
            Err(_) => Err(CloseReason::WriteTimeout),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::key::{ConversationKey, ParticipantId};
    use crate::fanout::subscriber::SubscriberState;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorded {
        sent: Vec<String>,
        closes: Vec<(CloseCode, String)>,
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        recorded: Arc<Mutex<Recorded>>,
        fail_sends: bool,
        hang_sends: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
            if self.hang_sends {
                futures::future::pending::<()>().await;
            }
            if self.fail_sends {
                return Err(TransportError::Io("broken pipe".into()));
            }
            self.recorded.lock().sent.push(frame.as_str().to_string());
            Ok(())
        }

        async fn close(&mut self, code: CloseCode, reason: &str) {
            self.recorded.lock().closes.push((code, reason.to_string()));
        }
    }

    fn room() -> Arc<Room> {
        Arc::new(Room::new(ConversationKey::from_ids("a", "b").unwrap(), 4))
    }

    fn pid() -> ParticipantId {
        ParticipantId::new("a").unwrap()
    }

    #[tokio::test]
    async fn test_delivers_then_cancels_cleanly() {
        let room = room();
        let subscription = room.subscribe(pid()).unwrap();
        let subscriber = subscription.subscriber.clone();
        let cancel = CancellationToken::new();
        let mut transport = MockTransport::default();
        let recorded = transport.recorded.clone();

        let serving = ServingLoop::new(room.clone(), subscription, cancel.clone());
        let task = tokio::spawn(async move { serving.run(&mut transport).await });

        room.publish_frame(&"one".into());
        room.publish_frame(&"two".into());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert_eq!(result, Ok(()));

        let recorded = recorded.lock();
        assert_eq!(recorded.sent, vec!["one", "two"]);
        assert_eq!(recorded.closes, vec![(CloseCode::GoingAway, "server shutting down".to_string())]);
        assert!(!room.contains(subscriber.id));
        assert_eq!(subscriber.state(), SubscriberState::Closed);
    }

    #[tokio::test]
    async fn test_send_failure_ends_loop() {
        let room = room();
        let subscription = room.subscribe(pid()).unwrap();
        let mut transport = MockTransport {
            fail_sends: true,
            ..Default::default()
        };
        let recorded = transport.recorded.clone();

        let serving = ServingLoop::new(room.clone(), subscription, CancellationToken::new());
        room.publish_frame(&"x".into());

        let result = serving.run(&mut transport).await;
        assert!(matches!(result, Err(ServeError::Transport(_))));
        assert_eq!(recorded.lock().closes.len(), 1);
        assert_eq!(room.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_deadline() {
        let room = room();
        let subscription = room.subscribe(pid()).unwrap();
        let mut transport = MockTransport {
            hang_sends: true,
            ..Default::default()
        };
        let recorded = transport.recorded.clone();

        let serving = ServingLoop::new(room.clone(), subscription, CancellationToken::new())
            .with_write_timeout(Duration::from_secs(5));
        room.publish_frame(&"x".into());

        let result = serving.run(&mut transport).await;
        assert_eq!(result, Err(ServeError::WriteTimeout));
        assert_eq!(recorded.lock().closes[0].0, CloseCode::InternalError);
        assert_eq!(room.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_orderly_peer_close_is_ok() {
        let room = room();
        let subscription = room.subscribe(pid()).unwrap();
        subscription.subscriber.close(CloseReason::PeerClosed { code: 1001 });

        let mut transport = MockTransport::default();
        let serving = ServingLoop::new(room.clone(), subscription, CancellationToken::new());
        assert_eq!(serving.run(&mut transport).await, Ok(()));
    }

    #[tokio::test]
    async fn test_abnormal_peer_close_is_surfaced() {
        let room = room();
        let subscription = room.subscribe(pid()).unwrap();
        subscription.subscriber.close(CloseReason::PeerClosed { code: 1002 });

        let mut transport = MockTransport::default();
        let serving = ServingLoop::new(room.clone(), subscription, CancellationToken::new());
        assert_eq!(serving.run(&mut transport).await, Err(ServeError::PeerClosed(1002)));
        assert_eq!(room.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_future_still_removes_subscriber() {
        let room = room();
        let subscription = room.subscribe(pid()).unwrap();
        let mut transport = MockTransport::default();
        let serving = ServingLoop::new(room.clone(), subscription, CancellationToken::new());

        let task = tokio::spawn(async move {
            let _ = serving.run(&mut transport).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(room.subscriber_count(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(room.subscriber_count(), 0);
    }
}
