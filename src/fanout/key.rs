//! Participant identifiers and the canonical two-party conversation key.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while building identifiers or conversation keys
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("participant id must not be empty")]
    EmptyParticipant,

    #[error("a conversation needs two distinct participants, got {0} twice")]
    SameParticipant(ParticipantId),
}

/// Opaque participant identifier supplied by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Result<Self, KeyError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(KeyError::EmptyParticipant);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unordered pair of distinct participants.
///
/// Always stored with the lexicographically smaller id first, so `(a, b)` and
/// `(b, a)` compare, hash and display identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    first: ParticipantId,
    second: ParticipantId,
}

impl ConversationKey {
    pub fn new(a: ParticipantId, b: ParticipantId) -> Result<Self, KeyError> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { first: a, second: b }),
            std::cmp::Ordering::Greater => Ok(Self { first: b, second: a }),
            std::cmp::Ordering::Equal => Err(KeyError::SameParticipant(a)),
        }
    }

    /// Build a key straight from raw identifier strings
    pub fn from_ids(a: &str, b: &str) -> Result<Self, KeyError> {
        Self::new(ParticipantId::new(a)?, ParticipantId::new(b)?)
    }

    pub fn first(&self) -> &ParticipantId {
        &self.first
    }

    pub fn second(&self) -> &ParticipantId {
        &self.second
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        &self.first == id || &self.second == id
    }

}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first, self.second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    #[test]
    fn test_key_is_order_independent() {
        let ab = ConversationKey::new(pid("alice"), pid("bob")).unwrap();
        let ba = ConversationKey::new(pid("bob"), pid("alice")).unwrap();

        assert_eq!(ab, ba);
        assert_eq!(ab.to_string(), "alice:bob");
        assert_eq!(ba.first().as_str(), "alice");
    }

    #[test]
    fn test_same_participant_rejected() {
        let err = ConversationKey::from_ids("u1", "u1").unwrap_err();
        assert_eq!(err, KeyError::SameParticipant(pid("u1")));
    }

    #[test]
    fn test_empty_participant_rejected() {
        assert_eq!(ParticipantId::new("").unwrap_err(), KeyError::EmptyParticipant);
        assert_eq!(ParticipantId::new("   ").unwrap_err(), KeyError::EmptyParticipant);
        assert!(ConversationKey::from_ids("u1", "").is_err());
    }

    #[test]
    fn test_contains() {
        let key = ConversationKey::from_ids("u2", "u1").unwrap();
        assert!(key.contains(&pid("u1")));
        assert!(key.contains(&pid("u2")));
        assert!(!key.contains(&pid("u3")));
    }

    #[test]
    fn test_colon_in_ids_does_not_collide() {
        // "a:b" + "c" and "a" + "b:c" render alike but are distinct keys
        let k1 = ConversationKey::from_ids("a:b", "c").unwrap();
        let k2 = ConversationKey::from_ids("a", "b:c").unwrap();
        assert_ne!(k1, k2);
    }
}
