//! Fan-out unit for one two-party conversation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::metrics::FanoutMetrics;

use super::key::{ConversationKey, ParticipantId};
use super::message::{DirectMessage, OutboundFrame};
use super::subscriber::{CloseReason, EnqueueResult, Subscriber, Subscription};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of one broadcast over a room's subscriber set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Subscribers the frame was queued for
    pub delivered: usize,
    /// Subscribers signalled to disconnect because their queue was full
    pub disconnected: usize,
    /// Subscribers already on their way out
    pub skipped: usize,
}

struct RoomInner {
    subscribers: HashMap<Uuid, Arc<Subscriber>>,
    /// When the subscriber set last became empty
    idle_since: Option<Instant>,
    evicted: bool,
}

/// Holds the live subscribers of one conversation.
///
/// The lock guards the subscriber set only; it is never held across an await
/// and never while a transport is written to or closed.
pub struct Room {
    key: ConversationKey,
    queue_capacity: usize,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(key: ConversationKey, queue_capacity: usize) -> Self {
        Self {
            key,
            queue_capacity,
            inner: Mutex::new(RoomInner {
                subscribers: HashMap::new(),
                idle_since: Some(Instant::now()),
                evicted: false,
            }),
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Create and register a subscriber using this room's queue capacity.
    ///
    /// Returns `None` if the room has been evicted from its registry.
    pub fn subscribe(&self, participant: ParticipantId) -> Option<Subscription> {
        let subscription = Subscriber::channel(participant, self.queue_capacity);
        if self.add_subscriber(subscription.subscriber.clone()) {
            Some(subscription)
        } else {
            None
        }
    }

    /// Register a subscriber. Adding the same subscriber twice is a no-op.
    ///
    /// Returns `false` only when the room has been evicted.
    pub fn add_subscriber(&self, subscriber: Arc<Subscriber>) -> bool {
        let mut inner = self.inner.lock();
        if inner.evicted {
            return false;
        }
        inner.subscribers.insert(subscriber.id, subscriber);
        inner.idle_since = None;
        true
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn remove_subscriber(&self, subscriber_id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.subscribers.remove(&subscriber_id).is_some();
        if removed && inner.subscribers.is_empty() {
            inner.idle_since = Some(Instant::now());
        }
        removed
    }

    pub fn contains(&self, subscriber_id: Uuid) -> bool {
        self.inner.lock().subscribers.contains_key(&subscriber_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Serialize a message once and fan it out to every open subscriber
    pub fn publish(&self, message: &DirectMessage) -> Result<PublishReport, PublishError> {
        let frame = OutboundFrame::encode(message)?;
        Ok(self.publish_frame(&frame))
    }

    /// Offer a frame to every open subscriber without waiting on any of them.
    ///
    /// A subscriber whose queue is full is only signalled to close here; its
    /// serving loop closes the transport and removes it from the set.
    pub fn publish_frame(&self, frame: &OutboundFrame) -> PublishReport {
        let mut report = PublishReport::default();
        let inner = self.inner.lock();

        for subscriber in inner.subscribers.values() {
            if !subscriber.is_open() {
                report.skipped += 1;
                continue;
            }

            match subscriber.try_enqueue(frame.clone()) {
                EnqueueResult::Queued => report.delivered += 1,
                EnqueueResult::Full => {
                    if subscriber.close(CloseReason::SlowConsumer) {
                        report.disconnected += 1;
                        tracing::warn!(
                            conversation = %self.key,
                            subscriber_id = %subscriber.id,
                            participant = %subscriber.participant,
                            queue_capacity = self.queue_capacity,
                            "Disconnecting slow subscriber"
                        );
                    }
                }
                EnqueueResult::Closed => report.skipped += 1,
            }
        }
        drop(inner);

        FanoutMetrics::record_publish(&report);
        report
    }

    pub fn is_evicted(&self) -> bool {
        self.inner.lock().evicted
    }

    /// Mark the room evicted if it has had no subscribers for at least `grace`.
    ///
    /// Once evicted a room accepts no further subscribers.
    pub(crate) fn try_evict(&self, grace: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.evicted || !inner.subscribers.is_empty() {
            return false;
        }
        let idle_long_enough = inner
            .idle_since
            .is_some_and(|since| Instant::now().saturating_duration_since(since) >= grace);
        if idle_long_enough {
            inner.evicted = true;
        }
        idle_long_enough
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("key", &self.key)
            .field("queue_capacity", &self.queue_capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
