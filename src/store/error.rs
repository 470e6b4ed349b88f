//! Error types for the persistence layer.

use thiserror::Error;

use crate::domain::ids::ConversationId;

/// Persistence error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A message referenced a conversation that does not exist.
    #[error("unknown conversation: {0}")]
    UnknownConversation(ConversationId),
    /// A stored row could not be mapped back to a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Agent config (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
