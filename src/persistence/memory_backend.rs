//! In-memory message store.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::fanout::{ConversationKey, DirectMessage, ParticipantId};
use crate::metrics::StoreMetrics;

use super::backend::{MessageStore, StoreError};

/// Process-local message store.
///
/// Keeps one append-only log per conversation. With `auto_register` enabled
/// unknown participants are accepted and shown under their id.
pub struct MemoryMessageStore {
    users: DashMap<ParticipantId, String>,
    conversations: DashMap<ConversationKey, Vec<DirectMessage>>,
    auto_register: bool,
}

impl MemoryMessageStore {
    /// Create a store that only accepts registered users
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            conversations: DashMap::new(),
            auto_register: false,
        }
    }

    /// Create a store that accepts any participant
    pub fn with_auto_register() -> Self {
        Self {
            auto_register: true,
            ..Self::new()
        }
    }

    pub fn register_user(&self, id: ParticipantId, display_name: impl Into<String>) {
        self.users.insert(id, display_name.into());
    }

    fn resolve_name(&self, id: &ParticipantId) -> Result<String, StoreError> {
        if let Some(name) = self.users.get(id) {
            return Ok(name.clone());
        }
        if self.auto_register {
            return Ok(self
                .users
                .entry(id.clone())
                .or_insert_with(|| id.to_string())
                .clone());
        }
        Err(StoreError::UnknownParticipant(id.to_string()))
    }

    /// Total stored messages across all conversations
    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.value().len()).sum()
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn send(
        &self,
        from: &ParticipantId,
        to: &ParticipantId,
        body: &str,
    ) -> Result<DirectMessage, StoreError> {
        let key = ConversationKey::new(from.clone(), to.clone())
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        let sender = self.resolve_name(from)?;
        let receiver = self.resolve_name(to)?;

        let message = DirectMessage {
            from_id: from.clone(),
            to_id: to.clone(),
            body: body.to_string(),
            created: Utc::now(),
            sender,
            receiver,
        };

        self.conversations
            .entry(key)
            .or_default()
            .push(message.clone());
        StoreMetrics::record_stored();

        Ok(message)
    }

    async fn get_history(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
    ) -> Result<Vec<DirectMessage>, StoreError> {
        let Ok(key) = ConversationKey::new(a.clone(), b.clone()) else {
            return Ok(Vec::new());
        };
        let mut messages = self
            .conversations
            .get(&key)
            .map(|log| log.value().clone())
            .unwrap_or_default();
        messages.sort_by_key(|m| m.created);
        Ok(messages)
    }

    async fn display_name(&self, id: &ParticipantId) -> Result<Option<String>, StoreError> {
        Ok(self.users.get(id).map(|name| name.clone()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
