//! `SQLite` implementation of the conversation store.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use serde_json::{Map, Value};
use tokio_rusqlite::Connection;

use crate::domain::ids::{AgentId, ConversationId, MessageId};
use crate::domain::model::{
    Agent, Conversation, DEFAULT_AGENT_EMOJI, DEFAULT_AGENT_WORKSPACE, Message, NewAgent,
    NewMessage,
};
use crate::store::error::{StoreError, StoreResult};
use crate::store::{ConversationStore, StoreFuture};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        provider TEXT NOT NULL,
        model TEXT NOT NULL,
        config TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'active',
        description TEXT,
        emoji TEXT NOT NULL,
        workspace TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        conversation_id TEXT NOT NULL REFERENCES conversations (id),
        role TEXT NOT NULL,
        agent_id TEXT,
        content TEXT NOT NULL,
        type TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation_seq
        ON messages (conversation_id, seq);
";

const AGENT_COLUMNS: &str =
    "id, name, provider, model, config, status, description, emoji, workspace, created_at";

/// Agent row as read from `SQLite`, before validation.
struct AgentRow {
    id: String,
    name: String,
    provider: String,
    model: String,
    config: String,
    status: String,
    description: Option<String>,
    emoji: String,
    workspace: String,
    created_at: i64,
}

impl AgentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            provider: row.get(2)?,
            model: row.get(3)?,
            config: row.get(4)?,
            status: row.get(5)?,
            description: row.get(6)?,
            emoji: row.get(7)?,
            workspace: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_agent(self) -> StoreResult<Agent> {
        let config: Map<String, Value> = serde_json::from_str(&self.config)?;
        let status = self
            .status
            .parse()
            .map_err(|err| StoreError::Corrupt(format!("invalid agent status: {err}")))?;
        Ok(Agent {
            id: AgentId::from(self.id),
            name: self.name,
            provider: self.provider,
            model: self.model,
            config,
            status,
            description: self.description,
            emoji: self.emoji,
            workspace: self.workspace,
            created_at: from_millis(self.created_at)?,
        })
    }
}

/// Message row as read from `SQLite`, before validation.
struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    agent_id: Option<String>,
    content: String,
    message_type: String,
    created_at: i64,
}

impl MessageRow {
    fn into_message(self) -> StoreResult<Message> {
        let role = self
            .role
            .parse()
            .map_err(|err| StoreError::Corrupt(format!("invalid message role: {err}")))?;
        Ok(Message {
            id: MessageId::from(self.id),
            conversation_id: ConversationId::from(self.conversation_id),
            role,
            agent_id: self.agent_id.map(AgentId::from),
            content: self.content,
            message_type: self.message_type,
            created_at: from_millis(self.created_at)?,
        })
    }
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("invalid timestamp: {ms}")))
}

/// `SQLite`-backed [`ConversationStore`].
pub struct SqliteConversationStore {
    conn: Connection,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> StoreResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Number of stored `(conversations, messages)`.
    #[cfg(test)]
    pub(crate) async fn row_counts(&self) -> StoreResult<(i64, i64)> {
        let counts = self
            .conn
            .call(|conn| {
                let conversations =
                    conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
                let messages =
                    conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
                Ok((conversations, messages))
            })
            .await?;
        Ok(counts)
    }
}

impl ConversationStore for SqliteConversationStore {
    fn find_agent(&self, id: &AgentId) -> StoreFuture<'_, StoreResult<Option<Agent>>> {
        let id = id.to_string();
        Box::pin(async move {
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
                            rusqlite::params![id],
                            AgentRow::from_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;
            row.map(AgentRow::into_agent).transpose()
        })
    }

    fn find_conversation(
        &self,
        id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>> {
        let id = id.to_string();
        Box::pin(async move {
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            "SELECT id, title, created_at FROM conversations WHERE id = ?1",
                            rusqlite::params![id],
                            |row| {
                                let id: String = row.get(0)?;
                                let title: String = row.get(1)?;
                                let created_at: i64 = row.get(2)?;
                                Ok((id, title, created_at))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(|(id, title, created_at)| {
                Ok(Conversation {
                    id: ConversationId::from(id),
                    title,
                    created_at: from_millis(created_at)?,
                })
            })
            .transpose()
        })
    }

    fn create_conversation(&self, title: String) -> StoreFuture<'_, StoreResult<Conversation>> {
        Box::pin(async move {
            let conversation = Conversation {
                id: ConversationId::new(),
                title,
                created_at: Utc::now(),
            };
            let id = conversation.id.to_string();
            let title = conversation.title.clone();
            let created_at = conversation.created_at.timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO conversations (id, title, created_at) VALUES (?1, ?2, ?3)",
                        rusqlite::params![id, title, created_at],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(conversation)
        })
    }

    fn create_message(&self, message: NewMessage) -> StoreFuture<'_, StoreResult<Message>> {
        Box::pin(async move {
            let stored = Message {
                id: MessageId::new(),
                conversation_id: message.conversation_id,
                role: message.role,
                agent_id: message.agent_id,
                content: message.content,
                message_type: message.message_type,
                created_at: Utc::now(),
            };

            let id = stored.id.to_string();
            let conversation_id = stored.conversation_id.to_string();
            let role = stored.role.to_string();
            let agent_id = stored.agent_id.as_ref().map(ToString::to_string);
            let content = stored.content.clone();
            let message_type = stored.message_type.clone();
            let created_at = stored.created_at.timestamp_millis();

            let inserted = self
                .conn
                .call(move |conn| {
                    let exists = conn
                        .query_row(
                            "SELECT 1 FROM conversations WHERE id = ?1",
                            rusqlite::params![conversation_id],
                            |_| Ok(()),
                        )
                        .optional()?
                        .is_some();
                    if !exists {
                        return Ok(false);
                    }
                    conn.execute(
                        "INSERT INTO messages
                         (id, conversation_id, role, agent_id, content, type, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        rusqlite::params![
                            id,
                            conversation_id,
                            role,
                            agent_id,
                            content,
                            message_type,
                            created_at
                        ],
                    )?;
                    Ok(true)
                })
                .await?;

            if !inserted {
                return Err(StoreError::UnknownConversation(stored.conversation_id));
            }
            Ok(stored)
        })
    }

    fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<Vec<Message>>> {
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, role, agent_id, content, type, created_at
                         FROM messages
                         WHERE conversation_id = ?1
                         ORDER BY seq",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![conversation_id], |row| {
                            Ok(MessageRow {
                                id: row.get(0)?,
                                conversation_id: row.get(1)?,
                                role: row.get(2)?,
                                agent_id: row.get(3)?,
                                content: row.get(4)?,
                                message_type: row.get(5)?,
                                created_at: row.get(6)?,
                            })
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    fn list_active_agents(&self) -> StoreFuture<'_, StoreResult<Vec<Agent>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(|conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {AGENT_COLUMNS} FROM agents
                         WHERE status = 'active'
                         ORDER BY created_at DESC, rowid DESC"
                    ))?;
                    let rows = stmt
                        .query_map([], AgentRow::from_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter().map(AgentRow::into_agent).collect()
        })
    }

    fn create_agent(&self, agent: NewAgent) -> StoreFuture<'_, StoreResult<Agent>> {
        Box::pin(async move {
            let stored = Agent {
                id: agent.id.unwrap_or_else(AgentId::new),
                name: agent.name,
                provider: agent.provider,
                model: agent.model,
                config: agent.config,
                status: agent.status,
                description: agent.description,
                emoji: agent
                    .emoji
                    .unwrap_or_else(|| DEFAULT_AGENT_EMOJI.to_string()),
                workspace: agent
                    .workspace
                    .unwrap_or_else(|| DEFAULT_AGENT_WORKSPACE.to_string()),
                created_at: Utc::now(),
            };

            let config = serde_json::to_string(&stored.config)?;
            let row = AgentRow {
                id: stored.id.to_string(),
                name: stored.name.clone(),
                provider: stored.provider.clone(),
                model: stored.model.clone(),
                config,
                status: stored.status.to_string(),
                description: stored.description.clone(),
                emoji: stored.emoji.clone(),
                workspace: stored.workspace.clone(),
                created_at: stored.created_at.timestamp_millis(),
            };

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO agents ({AGENT_COLUMNS})
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                        ),
                        rusqlite::params![
                            row.id,
                            row.name,
                            row.provider,
                            row.model,
                            row.config,
                            row.status,
                            row.description,
                            row.emoji,
                            row.workspace,
                            row.created_at
                        ],
                    )?;
                    Ok(())
                })
                .await?;

            tracing::debug!(agent_id = %stored.id, provider = %stored.provider, "Agent created");
            Ok(stored)
        })
    }

    fn clear_agents(&self) -> StoreFuture<'_, StoreResult<usize>> {
        Box::pin(async move {
            let removed = self
                .conn
                .call(|conn| Ok(conn.execute("DELETE FROM agents", [])?))
                .await?;
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{AgentStatus, MessageRole};

    async fn store() -> SqliteConversationStore {
        SqliteConversationStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_agent_roundtrip_with_fixed_id() {
        let store = store().await;
        let created = store
            .create_agent(
                NewAgent::new("Llama", "ollama", "llama3")
                    .with_id("a1")
                    .with_config("temperature", 0.2),
            )
            .await
            .unwrap();
        assert_eq!(created.emoji, DEFAULT_AGENT_EMOJI);
        assert_eq!(created.workspace, DEFAULT_AGENT_WORKSPACE);

        let found = store.find_agent(&AgentId::from("a1")).await.unwrap();
        assert_eq!(found.as_ref().map(|a| a.name.as_str()), Some("Llama"));
        assert_eq!(
            found.and_then(|a| a.config.get("temperature").cloned()),
            Some(serde_json::json!(0.2))
        );
        assert!(store.find_agent(&AgentId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_agents_newest_first() {
        let store = store().await;
        store.create_agent(NewAgent::new("First", "ollama", "m")).await.unwrap();
        store.create_agent(NewAgent::new("Second", "openai", "m")).await.unwrap();
        let mut hidden = NewAgent::new("Hidden", "gemini", "m");
        hidden.status = AgentStatus::Inactive;
        store.create_agent(hidden).await.unwrap();

        let names: Vec<String> = store
            .list_active_agents()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Second", "First"]);

        assert_eq!(store.clear_agents().await.unwrap(), 3);
        assert!(store.list_active_agents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_keep_insertion_order() {
        let store = store().await;
        let conversation = store.create_conversation("Hello".to_string()).await.unwrap();
        let found = store.find_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(found.id, conversation.id);
        assert_eq!(found.title, "Hello");

        for i in 0..5 {
            let message = if i % 2 == 0 {
                NewMessage::user(conversation.id.clone(), format!("m{i}"))
            } else {
                NewMessage::agent(conversation.id.clone(), AgentId::from("a1"), format!("m{i}"))
            };
            store.create_message(message).await.unwrap();
        }

        let messages = store.list_messages(&conversation.id).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(messages[1].role, MessageRole::Agent);
        assert_eq!(messages[1].agent_id, Some(AgentId::from("a1")));
        assert_eq!(messages[0].message_type, "message");
    }

    #[tokio::test]
    async fn test_message_for_unknown_conversation_is_rejected() {
        let store = store().await;
        let err = store
            .create_message(NewMessage::user(ConversationId::from("nope"), "hi"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::UnknownConversation(id) if id.as_str() == "nope"));
        assert!(
            store
                .list_messages(&ConversationId::from("nope"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");

        let conversation_id = {
            let store = SqliteConversationStore::open(&path).await.unwrap();
            let conversation = store.create_conversation("Persisted".to_string()).await.unwrap();
            store
                .create_message(NewMessage::user(conversation.id.clone(), "kept"))
                .await
                .unwrap();
            conversation.id
        };

        let reopened = SqliteConversationStore::open(&path).await.unwrap();
        let messages = reopened.list_messages(&conversation_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }
}
