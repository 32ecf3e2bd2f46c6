use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::metrics::{FanoutMetrics, ROOMS_ACTIVE};

use super::key::{ConversationKey, ParticipantId};
use super::message::DirectMessage;
use super::room::{PublishError, PublishReport, Room};
use super::subscriber::Subscription;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("{participant} is not a participant of conversation {conversation}")]
    NotAParticipant {
        participant: ParticipantId,
        conversation: String,
    },
}

/// What happened to a published message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No room exists for the conversation, so nobody is listening
    NoActiveRoom,
    /// The room's subscriber set was walked, possibly with zero members
    Delivered(PublishReport),
}

impl PublishOutcome {
    pub fn report(&self) -> PublishReport {
        match self {
            Self::NoActiveRoom => PublishReport::default(),
            Self::Delivered(report) => *report,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryStats {
    pub rooms: usize,
    pub subscribers: usize,
}

/// Resolves conversation keys to their single room.
///
/// The map lock covers only the lookup-or-insert step; callers receive an
/// `Arc<Room>` and operate on it without holding any registry lock.
pub struct RoomRegistry {
    rooms: DashMap<ConversationKey, Arc<Room>>,
    queue_capacity: usize,
}

impl RoomRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            queue_capacity,
        }
    }

    /// Return the room for `key`, creating it exactly once if absent
    pub fn resolve_or_create(&self, key: &ConversationKey) -> Arc<Room> {
        if let Some(room) = self.rooms.get(key) {
            return room.value().clone();
        }

        self.rooms
            .entry(key.clone())
            .or_insert_with(|| {
                ROOMS_ACTIVE.inc();
                tracing::debug!(conversation = %key, "Room created");
                Arc::new(Room::new(key.clone(), self.queue_capacity))
            })
            .value()
            .clone()
    }

    /// Look up an existing room without creating one
    pub fn get(&self, key: &ConversationKey) -> Option<Arc<Room>> {
        self.rooms.get(key).map(|room| room.value().clone())
    }

    /// Register a new subscriber for `participant` in the conversation's room
    pub fn subscribe(
        &self,
        key: &ConversationKey,
        participant: ParticipantId,
    ) -> Result<(Arc<Room>, Subscription), SubscribeError> {
        if !key.contains(&participant) {
            return Err(SubscribeError::NotAParticipant {
                participant,
                conversation: key.to_string(),
            });
        }

        loop {
            let room = self.resolve_or_create(key);
            // An evicted room has already left the map, so the next resolve creates a fresh one
            if let Some(subscription) = room.subscribe(participant.clone()) {
                tracing::debug!(
                    conversation = %key,
                    subscriber_id = %subscription.subscriber.id,
                    participant = %participant,
                    "Subscriber registered"
                );
                return Ok((room, subscription));
            }
        }
    }

    /// Fan a stored message out to the conversation's live subscribers
    pub fn publish(
        &self,
        key: &ConversationKey,
        message: &DirectMessage,
    ) -> Result<PublishOutcome, PublishError> {
        let Some(room) = self.get(key) else {
            tracing::trace!(conversation = %key, "No active room for publish");
            return Ok(PublishOutcome::NoActiveRoom);
        };

        let report = room.publish(message)?;
        Ok(PublishOutcome::Delivered(report))
    }

    /// Drop rooms whose subscriber set has been empty for at least `grace`
    pub fn reap_idle(&self, grace: Duration) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, room| !room.try_evict(grace));
        let reaped = before.saturating_sub(self.rooms.len());

        if reaped > 0 {
            ROOMS_ACTIVE.sub(reaped as i64);
            FanoutMetrics::record_rooms_reaped(reaped as u64);
        }
        reaped
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.value().clone()).collect();
        RegistryStats {
            rooms: rooms.len(),
            subscribers: rooms.iter().map(|room| room.subscriber_count()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(a: &str, b: &str) -> ConversationKey {
        ConversationKey::from_ids(a, b).unwrap()
    }

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    #[test]
    fn test_resolve_is_order_independent() {
        let registry = RoomRegistry::new(8);
        let ab = registry.resolve_or_create(&key("a", "b"));
        let ba = registry.resolve_or_create(&key("b", "a"));

        assert!(Arc::ptr_eq(&ab, &ba));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_does_not_create() {
        let registry = RoomRegistry::new(8);
        assert!(registry.get(&key("a", "b")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subscribe_rejects_outsider() {
        let registry = RoomRegistry::new(8);
        let err = registry.subscribe(&key("a", "b"), pid("c")).unwrap_err();
        assert!(matches!(err, SubscribeError::NotAParticipant { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_publish_without_room_is_noop() {
        let registry = RoomRegistry::new(8);
        let msg = DirectMessage {
            from_id: pid("a"),
            to_id: pid("b"),
            body: "hi".into(),
            created: chrono::Utc::now(),
            sender: "A".into(),
            receiver: "B".into(),
        };

        let outcome = registry.publish(&key("a", "b"), &msg).unwrap();
        assert_eq!(outcome, PublishOutcome::NoActiveRoom);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_idle_rooms() {
        let registry = RoomRegistry::new(8);
        let (room, sub) = registry.subscribe(&key("a", "b"), pid("a")).unwrap();
        registry.resolve_or_create(&key("c", "d"));

        tokio::time::advance(Duration::from_secs(120)).await;
        // "a:b" still has a subscriber, "c:d" never had one
        assert_eq!(registry.reap_idle(Duration::from_secs(60)), 1);
        assert_eq!(registry.len(), 1);

        room.remove_subscriber(sub.subscriber.id);
        assert_eq!(registry.reap_idle(Duration::from_secs(60)), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.reap_idle(Duration::from_secs(60)), 1);
        assert!(registry.is_empty());
        assert!(room.is_evicted());

        // A later subscribe gets a fresh room
        let (fresh, _sub) = registry.subscribe(&key("b", "a"), pid("b")).unwrap();
        assert!(!Arc::ptr_eq(&room, &fresh));
    }

    #[test]
    fn test_stats() {
        let registry = RoomRegistry::new(8);
        let (_r1, _s1) = registry.subscribe(&key("a", "b"), pid("a")).unwrap();
        let (_r2, _s2) = registry.subscribe(&key("a", "b"), pid("b")).unwrap();
        let (_r3, _s3) = registry.subscribe(&key("a", "c"), pid("c")).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.rooms, 2);
        assert_eq!(stats.subscribers, 3);
    }
}
