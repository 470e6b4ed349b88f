//! Drives one invocation from request to persisted reply.
//!
//! The coordinator holds the shared dependencies and is reused across
//! requests. Each request gets its own `Invocation`, which owns the chunk
//! accumulator and is consumed when it reaches a terminal state.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{BroadcastHub, NeuralEvent};
use crate::domain::config::InvocationConfig;
use crate::domain::ids::ConversationId;
use crate::domain::model::{Agent, Conversation, NewMessage};
use crate::invocation::error::{InvocationError, InvocationResult};
use crate::invocation::request::{
    InvocationOutcome, InvokeRequest, ValidatedRequest, conversation_title,
};
use crate::providers::{InvokeOptions, ProviderError, ProviderRegistry};
use crate::store::ConversationStore;

/// Lifecycle of a single invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvocationState {
    /// Agent found, nothing written yet.
    Idle,
    /// Conversation found or created.
    ConversationResolved,
    /// User message stored.
    UserMessagePersisted,
    /// Provider stream open.
    Streaming,
    /// Agent message stored and completion published.
    Completed,
    /// Ended with an error; no agent message stored.
    Failed,
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ConversationResolved => "conversation_resolved",
            Self::UserMessagePersisted => "user_message_persisted",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared dependencies for invocations.
#[derive(Clone)]
pub struct InvocationCoordinator {
    store: Arc<dyn ConversationStore>,
    registry: ProviderRegistry,
    hub: Arc<BroadcastHub>,
    config: InvocationConfig,
}

impl InvocationCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        registry: ProviderRegistry,
        hub: Arc<BroadcastHub>,
        config: InvocationConfig,
    ) -> Self {
        Self {
            store,
            registry,
            hub,
            config,
        }
    }

    /// Run one invocation to completion.
    ///
    /// Validation and the agent lookup happen before any write. Cancelling
    /// `cancel` while the provider streams ends the invocation with a
    /// cancelled provider error.
    ///
    /// # Errors
    /// Returns an [`InvocationError`] describing the first failing step.
    pub async fn invoke(
        &self,
        request: InvokeRequest,
        cancel: CancellationToken,
    ) -> InvocationResult<InvocationOutcome> {
        let request = request.validate()?;
        let agent = self
            .store
            .find_agent(&request.agent_id)
            .await?
            .ok_or_else(|| InvocationError::AgentNotFound(request.agent_id.clone()))?;

        Invocation::new(self, agent, request, cancel).run().await
    }
}

impl fmt::Debug for InvocationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationCoordinator")
            .field("hub", &self.hub)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Per-request state. Never shared, never reused.
struct Invocation<'a> {
    coordinator: &'a InvocationCoordinator,
    agent: Agent,
    message: String,
    requested_conversation: Option<ConversationId>,
    cancel: CancellationToken,
    state: InvocationState,
}

impl<'a> Invocation<'a> {
    fn new(
        coordinator: &'a InvocationCoordinator,
        agent: Agent,
        request: ValidatedRequest,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            agent,
            message: request.message,
            requested_conversation: request.conversation_id,
            cancel,
            state: InvocationState::Idle,
        }
    }

    fn transition(&mut self, next: InvocationState) {
        tracing::debug!(
            agent_id = %self.agent.id,
            from = %self.state,
            to = %next,
            "Invocation state change"
        );
        self.state = next;
    }

    async fn run(mut self) -> InvocationResult<InvocationOutcome> {
        match self.drive().await {
            Ok(outcome) => {
                self.transition(InvocationState::Completed);
                tracing::info!(
                    agent_id = %self.agent.id,
                    conversation_id = %outcome.conversation_id,
                    chunks = outcome.chunk_count,
                    decode_failures = outcome.decode_failures,
                    "Invocation completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                let failed_in = self.state;
                self.transition(InvocationState::Failed);
                tracing::error!(
                    agent_id = %self.agent.id,
                    state = %failed_in,
                    "Invocation failed: {err}"
                );
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> InvocationResult<InvocationOutcome> {
        let coordinator = self.coordinator;
        let store = &coordinator.store;

        let conversation = self.resolve_conversation().await?;
        self.transition(InvocationState::ConversationResolved);

        store
            .create_message(NewMessage::user(conversation.id.clone(), self.message.clone()))
            .await?;
        self.transition(InvocationState::UserMessagePersisted);

        let adapter = coordinator.registry.resolve_for_agent(&self.agent)?;
        let provider = adapter.kind();
        let options = InvokeOptions::from_agent_config(&self.agent.config);

        let mut stream = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(ProviderError::cancelled(provider).into()),
            result = adapter.stream_invoke(&self.message, &options) => result?,
        };
        let decode_failures = stream.decode_failures();
        self.transition(InvocationState::Streaming);

        let mut response = String::new();
        let mut chunk_count = 0_usize;
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(ProviderError::cancelled(provider).into());
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            response.push_str(&chunk);
            chunk_count += 1;
            coordinator.hub.publish(&NeuralEvent::chunk(
                self.agent.id.clone(),
                self.agent.name.clone(),
                chunk,
                conversation.id.clone(),
            ));
        }

        let reply = store
            .create_message(NewMessage::agent(
                conversation.id.clone(),
                self.agent.id.clone(),
                response.clone(),
            ))
            .await?;

        coordinator.hub.publish(&NeuralEvent::complete(
            self.agent.id.clone(),
            self.agent.name.clone(),
            response.clone(),
            conversation.id.clone(),
            reply.id.clone(),
        ));

        Ok(InvocationOutcome {
            response,
            conversation_id: conversation.id,
            message_id: reply.id,
            chunk_count,
            decode_failures: decode_failures.count(),
        })
    }

    /// Reuse the requested conversation when it exists, otherwise create one.
    async fn resolve_conversation(&self) -> InvocationResult<Conversation> {
        let store = &self.coordinator.store;
        if let Some(id) = &self.requested_conversation {
            if let Some(conversation) = store.find_conversation(id).await? {
                return Ok(conversation);
            }
            tracing::debug!(conversation_id = %id, "Requested conversation not found, creating one");
        }

        let title = conversation_title(&self.message, self.coordinator.config.title_max_chars);
        Ok(store.create_conversation(title).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::broadcast::{EventKind, Subscription};
    use crate::domain::config::ProvidersConfig;
    use crate::domain::ids::AgentId;
    use crate::domain::model::{MessageRole, NewAgent};
    use crate::providers::ProviderErrorKind;
    use crate::store::SqliteConversationStore;

    struct Harness {
        coordinator: InvocationCoordinator,
        store: Arc<SqliteConversationStore>,
        hub: Arc<BroadcastHub>,
    }

    async fn harness(providers: ProvidersConfig) -> Harness {
        let store = Arc::new(SqliteConversationStore::open_in_memory().await.unwrap());
        let hub = Arc::new(BroadcastHub::default());
        let registry = ProviderRegistry::new(providers, Duration::from_secs(5)).unwrap();
        let coordinator = InvocationCoordinator::new(
            store.clone(),
            registry,
            hub.clone(),
            InvocationConfig::default(),
        );
        Harness {
            coordinator,
            store,
            hub,
        }
    }

    fn openai_sse(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            let frame = serde_json::json!({ "choices": [{ "delta": { "content": chunk } }] });
            body.push_str(&format!("data: {frame}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn mock_openai(body: String) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;
        server
    }

    async fn openai_harness(server: &MockServer) -> Harness {
        let mut providers = ProvidersConfig::default().with_openai_key("sk-test");
        providers.openai.base_url = server.uri();
        let harness = harness(providers).await;
        harness
            .store
            .create_agent(NewAgent::new("GPT-4 Strategist", "openai", "gpt-4").with_id("a1"))
            .await
            .unwrap();
        harness
    }

    fn drain(subscription: &mut Subscription) -> Vec<NeuralEvent> {
        let mut events = Vec::new();
        while let Some(frame) = subscription.try_recv() {
            events.push(serde_json::from_str(&frame).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_scenario_a_new_conversation() {
        let server = mock_openai(openai_sse(&["Hi", " there", "!"])).await;
        let harness = openai_harness(&server).await;
        let mut subscriber = harness.hub.register();

        let outcome = harness
            .coordinator
            .invoke(InvokeRequest::new("a1", "Hello"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.response, "Hi there!");
        assert_eq!(outcome.chunk_count, 3);
        assert_eq!(outcome.decode_failures, 0);
        assert_eq!(harness.store.row_counts().await.unwrap(), (1, 2));

        let conversation = harness
            .store
            .find_conversation(&outcome.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.title, "Hello");

        let messages = harness.store.list_messages(&outcome.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].role, MessageRole::Agent);
        assert_eq!(messages[1].id, outcome.message_id);
        assert_eq!(messages[1].agent_id, Some(AgentId::from("a1")));

        let events = drain(&mut subscriber);
        assert_eq!(events.len(), 4);
        let chunks: String = events
            .iter()
            .filter(|e| e.kind == EventKind::AgentResponse)
            .filter_map(|e| e.data.chunk.clone())
            .collect();
        assert_eq!(chunks, messages[1].content);

        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::AgentResponseComplete);
        assert_eq!(last.data.response.as_deref(), Some("Hi there!"));
        assert_eq!(last.data.message_id.as_ref(), Some(&outcome.message_id));
        assert_eq!(last.data.agent_name, "GPT-4 Strategist");
        assert!(events.iter().all(|e| e.data.conversation_id == outcome.conversation_id));
    }

    #[tokio::test]
    async fn test_scenario_b_unknown_agent_has_no_side_effects() {
        let server = mock_openai(openai_sse(&["unused"])).await;
        let harness = openai_harness(&server).await;
        let mut subscriber = harness.hub.register();

        let err = harness
            .coordinator
            .invoke(
                InvokeRequest::new("unknown-id", "Hello").in_conversation("c-none"),
                CancellationToken::new(),
            )
            .await
            .err()
            .unwrap();

        assert!(matches!(err, InvocationError::AgentNotFound(id) if id.as_str() == "unknown-id"));

        let err = harness
            .coordinator
            .invoke(InvokeRequest::new("unknown-id", "Hello"), CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InvocationError::AgentNotFound(_)));
        assert!(drain(&mut subscriber).is_empty());
        assert_eq!(harness.store.row_counts().await.unwrap(), (0, 0));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_c_missing_key_fails_before_network() {
        let server = mock_openai(openai_sse(&["unused"])).await;
        let mut providers = ProvidersConfig::default();
        providers.openai.base_url = server.uri();
        let harness = harness(providers).await;
        harness
            .store
            .create_agent(NewAgent::new("Keyless", "openai", "gpt-4").with_id("a1"))
            .await
            .unwrap();
        let mut subscriber = harness.hub.register();

        let err = harness
            .coordinator
            .invoke(InvokeRequest::new("a1", "Hello"), CancellationToken::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            InvocationError::Config(crate::domain::errors::ConfigError::MissingCredential {
                name: "OPENAI_API_KEY"
            })
        ));
        assert!(drain(&mut subscriber).is_empty());
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_d_same_conversation_appends_pairs() {
        let server = mock_openai(openai_sse(&["ok"])).await;
        let harness = openai_harness(&server).await;

        let first = harness
            .coordinator
            .invoke(InvokeRequest::new("a1", "First"), CancellationToken::new())
            .await
            .unwrap();
        let before = harness.store.list_messages(&first.conversation_id).await.unwrap();
        assert_eq!(harness.store.row_counts().await.unwrap(), (1, 2));

        let second = harness
            .coordinator
            .invoke(
                InvokeRequest::new("a1", "Second").in_conversation(first.conversation_id.as_str()),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(second.conversation_id, first.conversation_id);
        assert_eq!(harness.store.row_counts().await.unwrap(), (1, 4));

        let after = harness.store.list_messages(&first.conversation_id).await.unwrap();
        assert_eq!(after.len(), 4);
        assert_eq!(&after[..2], &before[..]);
        let contents: Vec<&str> = after.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["First", "ok", "Second", "ok"]);
        assert_eq!(after[3].id, second.message_id);
    }

    #[tokio::test]
    async fn test_unknown_conversation_id_creates_new_conversation() {
        let server = mock_openai(openai_sse(&["ok"])).await;
        let harness = openai_harness(&server).await;

        let outcome = harness
            .coordinator
            .invoke(
                InvokeRequest::new("a1", "Hello").in_conversation("stale-id"),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_ne!(outcome.conversation_id.as_str(), "stale-id");
        assert_eq!(harness.store.row_counts().await.unwrap(), (1, 2));
        assert_eq!(
            harness.store.list_messages(&outcome.conversation_id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_discards_partial_content() {
        let body = format!(
            "{}data: {}\n\n",
            openai_sse(&["Partial"]).replace("data: [DONE]\n\n", ""),
            serde_json::json!({ "error": { "message": "overloaded" } })
        );
        let server = mock_openai(body).await;
        let harness = openai_harness(&server).await;
        let mut subscriber = harness.hub.register();

        let err = harness
            .coordinator
            .invoke(InvokeRequest::new("a1", "Hello"), CancellationToken::new())
            .await
            .err()
            .unwrap();
        let InvocationError::Provider(provider_err) = err else {
            panic!("expected provider error");
        };
        assert_eq!(provider_err.kind, ProviderErrorKind::Backend);

        // The chunk was broadcast, but no completion and no agent message.
        let events = drain(&mut subscriber);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::AgentResponse);
        let messages = harness
            .store
            .list_messages(&events[0].data.conversation_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(harness.store.row_counts().await.unwrap(), (1, 1));
    }

    #[tokio::test]
    async fn test_http_error_surfaces_as_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let harness = openai_harness(&server).await;

        let err = harness
            .coordinator
            .invoke(InvokeRequest::new("a1", "Hello"), CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            InvocationError::Provider(ProviderError {
                kind: ProviderErrorKind::HttpStatus(500),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_invocation_stores_no_reply() {
        let server = mock_openai(openai_sse(&["never"])).await;
        let harness = openai_harness(&server).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = harness
            .coordinator
            .invoke(InvokeRequest::new("a1", "Hello"), cancel)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            InvocationError::Provider(ProviderError {
                kind: ProviderErrorKind::Cancelled,
                ..
            })
        ));

        // Only the user message made it to the store.
        assert_eq!(harness.store.row_counts().await.unwrap(), (1, 1));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_validation_error_has_no_side_effects() {
        let server = mock_openai(openai_sse(&["unused"])).await;
        let harness = openai_harness(&server).await;

        let err = harness
            .coordinator
            .invoke(
                InvokeRequest {
                    agent_id: Some("a1".to_string()),
                    ..InvokeRequest::default()
                },
                CancellationToken::new(),
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InvocationError::Validation(_)));
        assert_eq!(harness.store.row_counts().await.unwrap(), (0, 0));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
