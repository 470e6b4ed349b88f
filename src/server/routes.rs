//! HTTP route handlers for the relay API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::domain::ids::{AgentId, ConversationId, MessageId};
use crate::domain::model::{Agent, AgentStatus, Message, NewAgent};
use crate::invocation::InvokeRequest;
use crate::invocation::request::MISSING_FIELDS;
use crate::server::error::ApiError;
use crate::server::state::AppState;
use crate::server::ws::ws_handler;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/invoke", post(invoke_agent))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/conversations/{id}/messages", get(list_messages))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Health check endpoint.
#[allow(clippy::unused_async)] // axum handlers must be async
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "neural-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": state.hub.subscriber_count()
    }))
}

/// Successful invoke response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    /// Always `true`.
    pub success: bool,
    /// Full agent response.
    pub response: String,
    /// Conversation the exchange was stored in.
    pub conversation_id: ConversationId,
    /// Persisted agent message.
    pub message_id: MessageId,
}

/// Invoke an agent.
///
/// The invocation runs on its own task. If this handler is dropped because
/// the client went away, the drop guard cancels the invocation.
async fn invoke_agent(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!("Rejected invoke body: {rejection}");
        ApiError::BadRequest(MISSING_FIELDS)
    })?;

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let coordinator = state.coordinator.clone();
    let task = tokio::spawn(async move { coordinator.invoke(request, cancel).await });
    let joined = task.await;
    guard.disarm();

    let outcome = joined.map_err(ApiError::internal)??;
    Ok(Json(InvokeResponse {
        success: true,
        response: outcome.response,
        conversation_id: outcome.conversation_id,
        message_id: outcome.message_id,
    }))
}

/// Agent listing entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    /// Agent id.
    pub id: AgentId,
    /// Display name.
    pub identity_name: String,
    /// Display emoji.
    pub identity_emoji: String,
    /// Workspace label.
    pub workspace: String,
    /// Model identifier.
    pub model: String,
    /// Provider kind.
    pub provider: String,
    /// Optional description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: AgentStatus,
}

impl From<Agent> for AgentSummary {
    fn from(agent: Agent) -> Self {
        Self {
            id: agent.id,
            identity_name: agent.name,
            identity_emoji: agent.emoji,
            workspace: agent.workspace,
            model: agent.model,
            provider: agent.provider,
            description: agent.description,
            status: agent.status,
        }
    }
}

/// List active agents, newest first.
async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AgentSummary>>, ApiError> {
    let agents = state
        .store
        .list_active_agents()
        .await
        .map_err(|err| ApiError::Internal {
            public: "Failed to fetch agents",
            cause: err.to_string(),
        })?;
    Ok(Json(agents.into_iter().map(AgentSummary::from).collect()))
}

/// Agent creation request.
#[derive(Debug, Default, Deserialize)]
pub struct CreateAgentRequest {
    /// Display name (required).
    #[serde(default)]
    pub name: Option<String>,
    /// Provider kind (required).
    #[serde(default)]
    pub provider: Option<String>,
    /// Model identifier (required).
    #[serde(default)]
    pub model: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional emoji.
    #[serde(default)]
    pub emoji: Option<String>,
    /// Optional workspace.
    #[serde(default)]
    pub workspace: Option<String>,
    /// Optional provider configuration.
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
}

const MISSING_AGENT_FIELDS: &str = "Missing required fields: name, provider, model";

impl CreateAgentRequest {
    fn into_new_agent(self) -> Result<NewAgent, ApiError> {
        let required = |value: Option<String>| value.filter(|v| !v.is_empty());
        let (Some(name), Some(provider), Some(model)) =
            (required(self.name), required(self.provider), required(self.model))
        else {
            return Err(ApiError::BadRequest(MISSING_AGENT_FIELDS));
        };

        let mut agent = NewAgent::new(name, provider, model);
        agent.description = self.description;
        agent.emoji = self.emoji.filter(|e| !e.is_empty());
        agent.workspace = self.workspace.filter(|w| !w.is_empty());
        agent.config = self.config.unwrap_or_default();
        Ok(agent)
    }
}

/// Create an agent.
async fn create_agent(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateAgentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let Json(request) = body.map_err(|_| ApiError::BadRequest(MISSING_AGENT_FIELDS))?;
    let agent = state
        .store
        .create_agent(request.into_new_agent()?)
        .await
        .map_err(|err| ApiError::Internal {
            public: "Failed to create agent",
            cause: err.to_string(),
        })?;
    tracing::info!(agent_id = %agent.id, name = %agent.name, "Agent created");
    Ok((StatusCode::CREATED, Json(agent)))
}

/// Conversation transcript in insertion order.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let id = ConversationId::from(id);
    if state.store.find_conversation(&id).await?.is_none() {
        return Err(ApiError::NotFound("Conversation not found"));
    }
    Ok(Json(state.store.list_messages(&id).await?))
}
