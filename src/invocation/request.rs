//! Invoke request and outcome.

use serde::{Deserialize, Serialize};

use crate::domain::ids::{AgentId, ConversationId, MessageId};
use crate::invocation::error::{InvocationError, InvocationResult};

/// Error text for a request missing `agentId` or `message`.
pub const MISSING_FIELDS: &str = "Missing required fields: agentId, message";

/// Raw request body: `{agentId, message, conversationId?}`.
///
/// Every field is optional here so that missing values become a
/// validation error instead of a deserialization failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    /// Agent to invoke.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// User message.
    #[serde(default)]
    pub message: Option<String>,
    /// Existing conversation to append to.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl InvokeRequest {
    /// Request for a new conversation.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            message: Some(message.into()),
            conversation_id: None,
        }
    }

    /// Continue an existing conversation.
    #[must_use]
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Check required fields.
    ///
    /// An empty `conversationId` counts as absent.
    ///
    /// # Errors
    /// Returns [`InvocationError::Validation`] if `agentId` or `message` is
    /// missing or empty.
    pub fn validate(self) -> InvocationResult<ValidatedRequest> {
        let agent_id = self.agent_id.filter(|id| !id.is_empty());
        let message = self.message.filter(|m| !m.is_empty());
        let (Some(agent_id), Some(message)) = (agent_id, message) else {
            return Err(InvocationError::Validation(MISSING_FIELDS.to_string()));
        };

        Ok(ValidatedRequest {
            agent_id: AgentId::from(agent_id),
            message,
            conversation_id: self
                .conversation_id
                .filter(|id| !id.is_empty())
                .map(ConversationId::from),
        })
    }
}

/// A request whose required fields are present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Agent to invoke.
    pub agent_id: AgentId,
    /// User message, non-empty.
    pub message: String,
    /// Conversation to append to, if any.
    pub conversation_id: Option<ConversationId>,
}

/// Result of a completed invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationOutcome {
    /// Full response, the concatenation of every chunk.
    pub response: String,
    /// Conversation the exchange was stored in.
    pub conversation_id: ConversationId,
    /// Persisted agent message.
    pub message_id: MessageId,
    /// Chunks received from the provider.
    pub chunk_count: usize,
    /// Stream frames skipped because they could not be decoded.
    pub decode_failures: u64,
}

/// Conversation title: the first `max_chars` characters of the message.
#[must_use]
pub fn conversation_title(message: &str, max_chars: usize) -> String {
    message.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_agent_and_message() {
        for request in [
            InvokeRequest::default(),
            InvokeRequest {
                agent_id: Some("a1".to_string()),
                ..InvokeRequest::default()
            },
            InvokeRequest::new("", "Hello"),
            InvokeRequest::new("a1", ""),
        ] {
            match request.validate() {
                Err(InvocationError::Validation(message)) => assert_eq!(message, MISSING_FIELDS),
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_ignores_empty_conversation_id() {
        let validated = InvokeRequest::new("a1", "Hello")
            .in_conversation("")
            .validate()
            .unwrap();
        assert_eq!(validated.agent_id, AgentId::from("a1"));
        assert!(validated.conversation_id.is_none());
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: InvokeRequest = serde_json::from_str(
            r#"{"agentId":"a1","message":"Hello","conversationId":"c1"}"#,
        )
        .unwrap();
        assert_eq!(request, InvokeRequest::new("a1", "Hello").in_conversation("c1"));
    }

    #[test]
    fn test_conversation_title_is_char_safe() {
        assert_eq!(conversation_title("Hello", 50), "Hello");
        let long = "é".repeat(60);
        let title = conversation_title(&long, 50);
        assert_eq!(title.chars().count(), 50);
        assert_eq!(conversation_title("🦙🦙🦙", 2), "🦙🦙");
    }
}
