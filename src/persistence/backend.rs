//! Backend trait for message storage.

use async_trait::async_trait;
use thiserror::Error;

use crate::fanout::{DirectMessage, ParticipantId};

/// Errors that can occur during message store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Sender or receiver is not a known user
    #[error("unknown participant {0}")]
    UnknownParticipant(String),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into a message
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable store for direct messages.
///
/// `send` must complete before a message is published to live subscribers;
/// live delivery never compensates for a failed write.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Durably store a message and return it with both display names resolved
    async fn send(
        &self,
        from: &ParticipantId,
        to: &ParticipantId,
        body: &str,
    ) -> Result<DirectMessage, StoreError>;

    /// All messages exchanged between two participants, oldest first
    async fn get_history(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
    ) -> Result<Vec<DirectMessage>, StoreError>;

    /// Display name of a participant, if known
    async fn display_name(&self, id: &ParticipantId) -> Result<Option<String>, StoreError>;

    /// Backend name, for logs and stats
    fn backend_name(&self) -> &'static str;
}
