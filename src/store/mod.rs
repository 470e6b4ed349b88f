//! Durable storage of agents, conversations and messages.
//!
//! Operations are independent: no transaction spans two calls, so a
//! caller that persists a user message and later fails to persist the
//! reply leaves the first write in place.

pub mod error;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteConversationStore;

use std::future::Future;
use std::pin::Pin;

use crate::domain::ids::{AgentId, ConversationId};
use crate::domain::model::{Agent, Conversation, Message, NewAgent, NewMessage};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Conversation store trait.
pub trait ConversationStore: Send + Sync {
    /// Look up an agent by id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn find_agent(&self, id: &AgentId) -> StoreFuture<'_, StoreResult<Option<Agent>>>;

    /// Look up a conversation by id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn find_conversation(
        &self,
        id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>>;

    /// Create a conversation with a freshly minted id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_conversation(&self, title: String) -> StoreFuture<'_, StoreResult<Conversation>>;

    /// Append a message to an existing conversation.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownConversation`] if the conversation does
    /// not exist, or an error if storage access fails.
    fn create_message(&self, message: NewMessage) -> StoreFuture<'_, StoreResult<Message>>;

    /// List messages of a conversation in insertion order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<Vec<Message>>>;

    /// List active agents, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_active_agents(&self) -> StoreFuture<'_, StoreResult<Vec<Agent>>>;

    /// Create an agent.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the id is taken.
    fn create_agent(&self, agent: NewAgent) -> StoreFuture<'_, StoreResult<Agent>>;

    /// Delete every agent and return how many were removed.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn clear_agents(&self) -> StoreFuture<'_, StoreResult<usize>>;
}
