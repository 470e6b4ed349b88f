//! Wire shapes pushed to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AgentId, ConversationId, MessageId};

/// Envelope tag carried by every invocation event.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventEnvelope {
    /// `"neural-event"`
    #[default]
    #[serde(rename = "neural-event")]
    NeuralEvent,
}

/// Kind of invocation event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// One incremental chunk.
    AgentResponse,
    /// The full response, after it was persisted.
    AgentResponseComplete,
}

/// Payload of an invocation event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuralEventData {
    /// Responding agent.
    pub agent_id: AgentId,
    /// Display name of the agent.
    pub agent_name: String,
    /// Incremental text, on `agent-response`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    /// Full text, on `agent-response-complete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Conversation the invocation belongs to.
    pub conversation_id: ConversationId,
    /// Persisted agent message, on `agent-response-complete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

/// `{type: "neural-event", kind, data}`
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NeuralEvent {
    /// Envelope tag.
    #[serde(rename = "type", default)]
    pub envelope: EventEnvelope,
    /// Event kind.
    pub kind: EventKind,
    /// Event payload.
    pub data: NeuralEventData,
}

impl NeuralEvent {
    /// Progress event for one chunk.
    #[must_use]
    pub fn chunk(
        agent_id: AgentId,
        agent_name: impl Into<String>,
        chunk: impl Into<String>,
        conversation_id: ConversationId,
    ) -> Self {
        Self {
            envelope: EventEnvelope::NeuralEvent,
            kind: EventKind::AgentResponse,
            data: NeuralEventData {
                agent_id,
                agent_name: agent_name.into(),
                chunk: Some(chunk.into()),
                response: None,
                conversation_id,
                message_id: None,
            },
        }
    }

    /// Completion event carrying the full response and the persisted message id.
    #[must_use]
    pub fn complete(
        agent_id: AgentId,
        agent_name: impl Into<String>,
        response: impl Into<String>,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Self {
        Self {
            envelope: EventEnvelope::NeuralEvent,
            kind: EventKind::AgentResponseComplete,
            data: NeuralEventData {
                agent_id,
                agent_name: agent_name.into(),
                chunk: None,
                response: Some(response.into()),
                conversation_id,
                message_id: Some(message_id),
            },
        }
    }
}

/// First frame sent on a new subscriber connection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConnectionMessage {
    /// Always `"connection"`.
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// Always `"connected"`.
    pub status: &'static str,
    /// Connection time.
    pub timestamp: DateTime<Utc>,
}

impl ConnectionMessage {
    /// Connection acknowledgement stamped with the current time.
    #[must_use]
    pub fn connected() -> Self {
        Self {
            message_type: "connection",
            status: "connected",
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_event_wire_shape() {
        let event = NeuralEvent::chunk(
            AgentId::from("a1"),
            "GPT-4 Strategist",
            "Hi",
            ConversationId::from("c1"),
        );
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "type": "neural-event",
                "kind": "agent-response",
                "data": {
                    "agentId": "a1",
                    "agentName": "GPT-4 Strategist",
                    "chunk": "Hi",
                    "conversationId": "c1"
                }
            })
        );
    }

    #[test]
    fn test_complete_event_wire_shape() {
        let event = NeuralEvent::complete(
            AgentId::from("a1"),
            "GPT-4 Strategist",
            "Hi there!",
            ConversationId::from("c1"),
            MessageId::from("m2"),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "agent-response-complete");
        assert_eq!(value["data"]["response"], "Hi there!");
        assert_eq!(value["data"]["messageId"], "m2");
        assert!(value["data"].get("chunk").is_none());

        let parsed: NeuralEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_connection_message() {
        let value = serde_json::to_value(ConnectionMessage::connected()).unwrap();
        assert_eq!(value["type"], "connection");
        assert_eq!(value["status"], "connected");
        assert!(value["timestamp"].is_string());
    }
}
