//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::broadcast::BroadcastHub;
use crate::domain::config::RelayConfig;
use crate::invocation::InvocationCoordinator;
use crate::providers::ProviderRegistry;
use crate::server::error::StartupError;
use crate::store::{ConversationStore, SqliteConversationStore};

/// Shared application state.
pub struct AppState {
    /// Agent, conversation and message storage.
    pub store: Arc<dyn ConversationStore>,
    /// Live subscriber set.
    pub hub: Arc<BroadcastHub>,
    /// Invocation entry point.
    pub coordinator: InvocationCoordinator,
}

impl AppState {
    /// Build the state from configuration, opening the `SQLite` database.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened.
    pub async fn new(config: &RelayConfig) -> Result<Arc<Self>, StartupError> {
        config.validate()?;
        let store = SqliteConversationStore::open(&config.storage.sqlite_path).await?;
        tracing::info!(path = %config.storage.sqlite_path.display(), "Opened conversation store");
        Self::with_store(config, Arc::new(store))
    }

    /// Build the state around an existing store.
    ///
    /// # Errors
    /// Returns an error if the HTTP client for providers cannot be built.
    pub fn with_store(
        config: &RelayConfig,
        store: Arc<dyn ConversationStore>,
    ) -> Result<Arc<Self>, StartupError> {
        let hub = Arc::new(BroadcastHub::new(config.broadcast.subscriber_buffer));
        let registry = ProviderRegistry::new(
            config.providers.clone(),
            config.invocation.provider_timeout(),
        )?;
        let coordinator = InvocationCoordinator::new(
            Arc::clone(&store),
            registry,
            Arc::clone(&hub),
            config.invocation.clone(),
        );

        Ok(Arc::new(Self {
            store,
            hub,
            coordinator,
        }))
    }
}
