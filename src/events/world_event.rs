//! Event envelope published on a world's bus.
//!
//! Wire shape: `{id, type, timestamp, payload}` where the payload shape is
//! fully determined by `type`:
//!
//! - `message` → `{content, sender, senderType, inResponseTo?}`
//! - `system`  → `{action, detail?}`
//! - `sse`     → `{agentId, phase, content?, messageId}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// System actions
// ---------------------------------------------------------------------------

/// Well-known `system` event actions.
pub mod actions {
    /// An agent hit its turn limit; control returns to a human.
    pub const TURN_LIMIT_REACHED: &str = "turn-limit-reached";
    /// A reply attempt failed (provider error or timeout).
    pub const ERROR: &str = "error";
    /// Acknowledges a transport subscription.
    pub const SUBSCRIBED: &str = "subscribed";
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Human,
    Agent,
    System,
}

impl SenderType {
    /// Human and system messages reset agents' turn counters.
    pub fn resets_turn_counter(&self) -> bool {
        matches!(self, SenderType::Human | SenderType::System)
    }
}

/// Chat content from a human, agent or the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub content: String,
    pub sender: String,
    pub sender_type: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
}

/// Control notice or acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPayload {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Lifecycle phase of a streamed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SsePhase {
    Start,
    Chunk,
    End,
    Error,
}

/// Incremental delta of one in-flight reply, correlated by `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsePayload {
    pub agent_id: String,
    pub phase: SsePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub message_id: String,
}

/// Discriminator used by bus filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    System,
    Sse,
}

/// Typed payload; serde renders it as adjacent `type` + `payload` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum EventPayload {
    Message(MessagePayload),
    System(SystemPayload),
    Sse(SsePayload),
}

// ---------------------------------------------------------------------------
// WorldEvent
// ---------------------------------------------------------------------------

/// One event on a world's bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl WorldEvent {
    fn with_payload(id: String, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// A `message` event with a fresh id.
    pub fn message(
        content: impl Into<String>,
        sender: impl Into<String>,
        sender_type: SenderType,
    ) -> Self {
        Self::message_with_id(new_event_id(), content, sender, sender_type, None)
    }

    /// A `message` event with a caller-chosen id (used to correlate the final
    /// message with the `sse` deltas that preceded it).
    pub fn message_with_id(
        id: impl Into<String>,
        content: impl Into<String>,
        sender: impl Into<String>,
        sender_type: SenderType,
        in_response_to: Option<String>,
    ) -> Self {
        Self::with_payload(
            id.into(),
            EventPayload::Message(MessagePayload {
                content: content.into(),
                sender: sender.into(),
                sender_type,
                in_response_to,
            }),
        )
    }

    /// A `system` event.
    pub fn system(action: impl Into<String>, detail: Option<Value>) -> Self {
        Self::with_payload(
            new_event_id(),
            EventPayload::System(SystemPayload {
                action: action.into(),
                detail,
            }),
        )
    }

    /// An `sse` event for the reply identified by `message_id`.
    pub fn sse(
        agent_id: impl Into<String>,
        message_id: impl Into<String>,
        phase: SsePhase,
        content: Option<String>,
    ) -> Self {
        Self::with_payload(
            new_event_id(),
            EventPayload::Sse(SsePayload {
                agent_id: agent_id.into(),
                phase,
                content,
                message_id: message_id.into(),
            }),
        )
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Message(_) => EventKind::Message,
            EventPayload::System(_) => EventKind::System,
            EventPayload::Sse(_) => EventKind::Sse,
        }
    }

    pub fn as_message(&self) -> Option<&MessagePayload> {
        match &self.payload {
            EventPayload::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_system(&self) -> Option<&SystemPayload> {
        match &self.payload {
            EventPayload::System(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sse(&self) -> Option<&SsePayload> {
        match &self.payload {
            EventPayload::Sse(s) => Some(s),
            _ => None,
        }
    }

    /// Serialize for a transport frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fresh event/message id (UUID v4).
pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let event = WorldEvent::message_with_id(
            "m1",
            "hello",
            "human",
            SenderType::Human,
            None,
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["id"], "m1");
        assert_eq!(value["type"], "message");
        assert_eq!(
            value["payload"],
            json!({"content": "hello", "sender": "human", "senderType": "human"})
        );
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4, "no stray top-level fields: {keys:?}");
    }

    #[test]
    fn test_system_wire_shape() {
        let event = WorldEvent::system(actions::ERROR, Some(json!({"agentId": "a1"})));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "system");
        assert_eq!(value["payload"]["action"], "error");
        assert_eq!(value["payload"]["detail"]["agentId"], "a1");
    }

    #[test]
    fn test_sse_wire_shape() {
        let event = WorldEvent::sse("a1", "m9", SsePhase::Chunk, Some("par".into()));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "sse");
        assert_eq!(
            value["payload"],
            json!({"agentId": "a1", "phase": "chunk", "content": "par", "messageId": "m9"})
        );
    }

    #[test]
    fn test_parse_transport_frame() {
        let raw = r#"{"id":"e1","timestamp":"2024-01-01T00:00:00Z","type":"system","payload":{"action":"subscribed"}}"#;
        let event: WorldEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind(), EventKind::System);
        assert_eq!(event.as_system().unwrap().action, actions::SUBSCRIBED);
    }

    #[test]
    fn test_sender_type_reset_rule() {
        assert!(SenderType::Human.resets_turn_counter());
        assert!(SenderType::System.resets_turn_counter());
        assert!(!SenderType::Agent.resets_turn_counter());
    }
}
