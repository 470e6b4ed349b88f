//! Agent, conversation and message records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::ids::{AgentId, ConversationId, MessageId};

/// Message type recorded for regular conversation turns.
pub const DEFAULT_MESSAGE_TYPE: &str = "message";

/// Emoji given to agents created without one.
pub const DEFAULT_AGENT_EMOJI: &str = "🤖";

/// Workspace given to agents created without one.
pub const DEFAULT_AGENT_WORKSPACE: &str = "default";

/// Supported provider backends.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions API.
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini generative language API.
    Gemini,
    /// Local Ollama server.
    Ollama,
}

impl ProviderKind {
    /// All supported kinds.
    pub const ALL: [Self; 3] = [Self::OpenAi, Self::Gemini, Self::Ollama];

    /// Stable string form, as stored on agents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(value.to_string()),
        }
    }
}

/// Lifecycle status of an agent.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Listed and invocable.
    #[default]
    Active,
    /// Hidden from listings.
    Inactive,
}

impl AgentStatus {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(value.to_string()),
        }
    }
}

/// A configured language-model agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Agent identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Provider kind as stored. Parsed by the provider registry.
    pub provider: String,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Opaque provider configuration (`apiKey`, `baseUrl`, `temperature`, ...).
    pub config: Map<String, Value>,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Optional human description.
    pub description: Option<String>,
    /// Emoji shown next to the name.
    pub emoji: String,
    /// Workspace label.
    pub workspace: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Read a string entry from the agent configuration, ignoring blank values.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Fields for creating an agent.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    /// Optional fixed identifier; minted when absent.
    #[serde(default)]
    pub id: Option<AgentId>,
    /// Display name.
    pub name: String,
    /// Provider kind string.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Provider configuration.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: AgentStatus,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional emoji.
    #[serde(default)]
    pub emoji: Option<String>,
    /// Optional workspace label.
    #[serde(default)]
    pub workspace: Option<String>,
}

impl NewAgent {
    /// Build an active agent with the given identity.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Use a fixed identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<AgentId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Set description, emoji and workspace.
    #[must_use]
    pub fn with_profile(
        mut self,
        description: impl Into<String>,
        emoji: impl Into<String>,
        workspace: impl Into<String>,
    ) -> Self {
        self.description = Some(description.into());
        self.emoji = Some(emoji.into());
        self.workspace = Some(workspace.into());
        self
    }
}

/// A conversation grouping messages.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Title, derived from the first user message.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Author role of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Sent by the caller.
    User,
    /// Produced by an agent.
    Agent,
}

impl MessageRole {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            _ => Err(value.to_string()),
        }
    }
}

/// A persisted message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author role.
    pub role: MessageRole,
    /// Producing agent, for agent messages.
    pub agent_id: Option<AgentId>,
    /// Text content.
    pub content: String,
    /// Message type label.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a message; the store assigns id and creation time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewMessage {
    /// Owning conversation; must exist.
    pub conversation_id: ConversationId,
    /// Author role.
    pub role: MessageRole,
    /// Producing agent, for agent messages.
    pub agent_id: Option<AgentId>,
    /// Text content.
    pub content: String,
    /// Message type label.
    pub message_type: String,
}

impl NewMessage {
    /// Build a user message.
    #[must_use]
    pub fn user(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role: MessageRole::User,
            agent_id: None,
            content: content.into(),
            message_type: DEFAULT_MESSAGE_TYPE.to_string(),
        }
    }

    /// Build an agent reply.
    #[must_use]
    pub fn agent(
        conversation_id: ConversationId,
        agent_id: AgentId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            role: MessageRole::Agent,
            agent_id: Some(agent_id),
            content: content.into(),
            message_type: DEFAULT_MESSAGE_TYPE.to_string(),
        }
    }
}
