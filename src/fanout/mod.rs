//! Live fan-out of stored direct messages to connected peers.
//!
//! - `key`: participant ids and the canonical conversation key
//! - `message`: the wire message and its pre-serialized frame
//! - `subscriber`: per-connection queue and close state machine
//! - `room`: subscriber set and non-blocking broadcast
//! - `registry`: one room per conversation, created on demand, reaped when idle
//! - `serving`: the per-subscriber write loop and the `Transport` seam

mod key;
mod message;
mod registry;
mod room;
mod serving;
mod subscriber;

pub use key::{ConversationKey, KeyError, ParticipantId};
pub use message::{DirectMessage, OutboundFrame};
pub use registry::{PublishOutcome, RegistryStats, RoomRegistry, SubscribeError};
pub use room::{PublishError, PublishReport, Room};
pub use serving::{ServeError, ServingLoop, Transport, TransportError, DEFAULT_WRITE_TIMEOUT};
pub use subscriber::{
    CloseCode, CloseReason, EnqueueResult, Subscriber, SubscriberState, Subscription,
};
