use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::key::ParticipantId;

/// A stored direct message as delivered to live clients.
///
/// Display names are filled in by the message store; the fan-out layer
/// never derives them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub from_id: ParticipantId,
    pub to_id: ParticipantId,
    pub body: String,
    pub created: DateTime<Utc>,
    /// Sender display name
    pub sender: String,
    /// Receiver display name
    pub receiver: String,
}

/// A message serialized once per publish and queued verbatim to every subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame(Arc<str>);

impl OutboundFrame {
    pub fn encode(message: &DirectMessage) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(message)?;
        Ok(Self(Arc::from(json)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl From<&str> for OutboundFrame {
    fn from(text: &str) -> Self {
        Self(Arc::from(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> DirectMessage {
        DirectMessage {
            from_id: ParticipantId::new("u1").unwrap(),
            to_id: ParticipantId::new("u2").unwrap(),
            body: "hi".to_string(),
            created: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            sender: "Alice".to_string(),
            receiver: "Bob".to_string(),
        }
    }

    #[test]
    fn test_wire_field_names() {
        let frame = OutboundFrame::encode(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();

        assert_eq!(value["from_id"], "u1");
        assert_eq!(value["to_id"], "u2");
        assert_eq!(value["body"], "hi");
        assert_eq!(value["sender"], "Alice");
        assert_eq!(value["receiver"], "Bob");
        assert_eq!(value["created"], "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_created_round_trips() {
        let msg = sample();
        let frame = OutboundFrame::encode(&msg).unwrap();
        let decoded: DirectMessage = serde_json::from_str(frame.as_str()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_frame_clones_share_payload() {
        let frame = OutboundFrame::encode(&sample()).unwrap();
        let copy = frame.clone();
        assert_eq!(frame.as_str().as_ptr(), copy.as_str().as_ptr());
    }
}
