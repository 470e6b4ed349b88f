//! Maps an agent's provider kind to a ready adapter.
//!
//! Credential precedence, highest first:
//! 1. `apiKey` / `baseUrl` in the agent's config map
//! 2. process defaults loaded from the environment at startup
//!
//! Every check runs before any network activity.

use std::time::Duration;

use crate::domain::config::{GOOGLE_API_KEY_ENV, OPENAI_API_KEY_ENV, ProvidersConfig};
use crate::domain::errors::{ConfigError, ConfigResult, validate_url};
use crate::domain::model::{Agent, ProviderKind};
use crate::providers::{GeminiAdapter, OllamaAdapter, OpenAiAdapter, ProviderAdapter, USER_AGENT};

/// Per-agent credential overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialSource {
    /// API key overriding the process default.
    pub api_key: Option<String>,
    /// Base URL overriding the process default.
    pub base_url: Option<String>,
}

impl CredentialSource {
    /// Read `apiKey` and `baseUrl` from an agent's config map.
    #[must_use]
    pub fn from_agent(agent: &Agent) -> Self {
        Self {
            api_key: agent.config_str("apiKey").map(ToString::to_string),
            base_url: agent.config_str("baseUrl").map(ToString::to_string),
        }
    }
}

/// Builds provider adapters from process defaults and per-agent overrides.
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    defaults: ProvidersConfig,
    client: reqwest::Client,
}

impl ProviderRegistry {
    /// Create a registry sharing one HTTP client across adapters.
    ///
    /// `timeout` bounds each provider call, body streaming included.
    ///
    /// # Errors
    /// Returns [`ConfigError::HttpClient`] if the client cannot be built.
    pub fn new(defaults: ProvidersConfig, timeout: Duration) -> ConfigResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { defaults, client })
    }

    /// Resolve the adapter for `kind` serving `model`.
    ///
    /// # Errors
    /// - [`ConfigError::UnknownProvider`] for an unsupported kind
    /// - [`ConfigError::MissingCredential`] when a required API key is absent
    /// - [`ConfigError::InvalidUrl`] when the effective base URL does not parse
    pub fn resolve(
        &self,
        kind: &str,
        model: &str,
        source: &CredentialSource,
    ) -> ConfigResult<Box<dyn ProviderAdapter>> {
        let kind: ProviderKind = kind.parse().map_err(ConfigError::UnknownProvider)?;

        let adapter: Box<dyn ProviderAdapter> = match kind {
            ProviderKind::OpenAi => {
                let defaults = &self.defaults.openai;
                let api_key = pick(source.api_key.as_deref(), defaults.api_key.as_deref())
                    .ok_or(ConfigError::MissingCredential {
                        name: OPENAI_API_KEY_ENV,
                    })?;
                let base_url = base_url(source, &defaults.base_url)?;
                Box::new(OpenAiAdapter::new(self.client.clone(), api_key, base_url, model))
            }
            ProviderKind::Gemini => {
                let defaults = &self.defaults.gemini;
                let api_key = pick(source.api_key.as_deref(), defaults.api_key.as_deref())
                    .ok_or(ConfigError::MissingCredential {
                        name: GOOGLE_API_KEY_ENV,
                    })?;
                let base_url = base_url(source, &defaults.base_url)?;
                Box::new(GeminiAdapter::new(self.client.clone(), api_key, base_url, model))
            }
            ProviderKind::Ollama => {
                let base_url = base_url(source, &self.defaults.ollama.base_url)?;
                Box::new(OllamaAdapter::new(self.client.clone(), base_url, model))
            }
        };

        tracing::debug!(provider = %kind, model, "Resolved provider adapter");
        Ok(adapter)
    }

    /// Resolve the adapter for an agent, honouring its config overrides.
    ///
    /// # Errors
    /// See [`ProviderRegistry::resolve`].
    pub fn resolve_for_agent(&self, agent: &Agent) -> ConfigResult<Box<dyn ProviderAdapter>> {
        self.resolve(&agent.provider, &agent.model, &CredentialSource::from_agent(agent))
    }
}

fn pick<'a>(preferred: Option<&'a str>, fallback: Option<&'a str>) -> Option<&'a str> {
    preferred
        .or(fallback)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn base_url(source: &CredentialSource, default: &str) -> ConfigResult<String> {
    let url = pick(source.base_url.as_deref(), Some(default)).unwrap_or(default);
    validate_url(url)?;
    Ok(url.to_string())
}
