//! Per-connection delivery agent and its close state machine

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::key::ParticipantId;
use super::message::OutboundFrame;

const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Close status codes the fan-out layer asks a transport to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Normal,
    GoingAway,
    PolicyViolation,
    InternalError,
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::PolicyViolation => 1008,
            Self::InternalError => 1011,
        }
    }
}

/// Peer close codes that count as an orderly goodbye
const BENIGN_PEER_CODES: [u16; 3] = [1000, 1001, 1005];

/// Why a subscriber left the `Open` state. The first trigger wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Outbound queue was full when a message was published
    SlowConsumer,
    /// Peer sent a close frame
    PeerClosed { code: u16 },
    /// Peer went away without a close frame
    Disconnected,
    /// Read or write on the transport failed
    TransportFailure(String),
    /// A single write exceeded the per-write deadline
    WriteTimeout,
    /// The owning context was cancelled (server shutdown)
    Cancelled,
}

impl CloseReason {
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::SlowConsumer => CloseCode::PolicyViolation,
            Self::PeerClosed { .. } | Self::Disconnected => CloseCode::Normal,
            Self::TransportFailure(_) | Self::WriteTimeout => CloseCode::InternalError,
            Self::Cancelled => CloseCode::GoingAway,
        }
    }

    /// Reason text sent along with the close code
    pub fn description(&self) -> &str {
        match self {
            Self::SlowConsumer => "connection too slow to keep up with messages",
            Self::PeerClosed { .. } | Self::Disconnected => "",
            Self::TransportFailure(_) => "transport failure",
            Self::WriteTimeout => "write timed out",
            Self::Cancelled => "server shutting down",
        }
    }

    /// Whether this is an ordinary end of a connection rather than something to log as an error
    pub fn is_benign(&self) -> bool {
        match self {
            Self::Cancelled | Self::Disconnected => true,
            Self::PeerClosed { code } => BENIGN_PEER_CODES.contains(code),
            _ => false,
        }
    }

    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::SlowConsumer => "slow_consumer",
            Self::PeerClosed { .. } => "peer_closed",
            Self::Disconnected => "disconnected",
            Self::TransportFailure(_) => "transport_failure",
            Self::WriteTimeout => "write_timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed { code } => write!(f, "peer closed with code {}", code),
            Self::TransportFailure(e) => write!(f, "transport failure: {}", e),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Open,
    Closing,
    Closed,
}

/// Outcome of a non-blocking enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued,
    Full,
    Closed,
}

/// One live connection's delivery agent.
///
/// Owned by exactly one room (through its subscriber set) and driven by
/// exactly one serving loop, which holds the receiving half of the queue.
pub struct Subscriber {
    pub id: Uuid,
    pub participant: ParticipantId,
    sender: mpsc::Sender<OutboundFrame>,
    state: AtomicU8,
    reason: OnceLock<CloseReason>,
    closed: CancellationToken,
}

/// A freshly registered subscriber together with its queue receiver
#[derive(Debug)]
pub struct Subscription {
    pub subscriber: Arc<Subscriber>,
    pub receiver: mpsc::Receiver<OutboundFrame>,
}

impl Subscriber {
    /// Create a subscriber with a bounded outbound queue of `capacity` frames
    pub fn channel(participant: ParticipantId, capacity: usize) -> Subscription {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let subscriber = Arc::new(Self {
            id: Uuid::new_v4(),
            participant,
            sender,
            state: AtomicU8::new(STATE_OPEN),
            reason: OnceLock::new(),
            closed: CancellationToken::new(),
        });
        Subscription {
            subscriber,
            receiver,
        }
    }

    pub fn state(&self) -> SubscriberState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => SubscriberState::Open,
            STATE_CLOSING => SubscriberState::Closing,
            _ => SubscriberState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_OPEN
    }

    /// Offer a frame without waiting for queue space
    pub fn try_enqueue(&self, frame: OutboundFrame) -> EnqueueResult {
        if !self.is_open() {
            return EnqueueResult::Closed;
        }
        match self.sender.try_send(frame) {
            Ok(()) => EnqueueResult::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueResult::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueResult::Closed,
        }
    }

    /// Request the `Open -> Closing` transition.
    ///
    /// Only the first caller wins and has its reason recorded; every later
    /// call is a no-op returning `false`. Never blocks and never touches the
    /// transport, so it is safe to call while a room lock is held.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        tracing::debug!(
            subscriber_id = %self.id,
            participant = %self.participant,
            reason = %reason,
            "Subscriber closing"
        );

        let _ = self.reason.set(reason);
        self.closed.cancel();
        true
    }

    /// Complete the `Closing -> Closed` transition.
    ///
    /// Returns `true` exactly once; the caller that gets `true` owns closing the transport.
    pub fn finish(&self) -> bool {
        self.state
            .compare_exchange(STATE_CLOSING, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The reason recorded by the winning close trigger
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.reason.get()
    }

    /// The winning close reason, once the winner has recorded it.
    ///
    /// A caller that lost the `Open -> Closing` race can get here before the
    /// winner stores its reason; the closed signal fires only after the store.
    /// Waits until some trigger closes the subscriber.
    pub async fn settled_reason(&self) -> Option<CloseReason> {
        self.closed().await;
        self.reason.get().cloned()
    }

    /// Resolves once the subscriber has left the `Open` state
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("participant", &self.participant)
            .field("state", &self.state())
            .finish()
    }
}
