//! Invocation failure taxonomy.

use thiserror::Error;

use crate::domain::errors::ConfigError;
use crate::domain::ids::AgentId;
use crate::providers::ProviderError;
use crate::store::StoreError;

/// Why an invocation did not complete.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The request is malformed. Nothing was written.
    #[error("invalid request: {0}")]
    Validation(String),
    /// No agent has the requested id. Nothing was written.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),
    /// The agent's provider cannot be built.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The provider call failed; partial output was discarded.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// A store operation failed.
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// Convenience result alias for invocations.
pub type InvocationResult<T> = Result<T, InvocationError>;
