//! Core records, identifiers, configuration and configuration errors.

pub mod config;
pub mod errors;
pub mod ids;
pub mod model;

pub use config::{
    BroadcastConfig, InvocationConfig, ProviderEndpoint, ProvidersConfig, RelayConfig,
    ServerConfig, StorageConfig,
};
pub use errors::{ConfigError, ConfigResult};
pub use ids::{AgentId, ConversationId, MessageId};
pub use model::{
    Agent, AgentStatus, Conversation, Message, MessageRole, NewAgent, NewMessage, ProviderKind,
};
