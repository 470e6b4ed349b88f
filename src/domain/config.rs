//! Configuration for the relay server.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{ConfigError, ConfigResult, validate_url};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3001;
/// Default `OpenAI` API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// Default Ollama base URL.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Environment variable holding the `OpenAI` API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable holding the Google API key.
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Top-level relay configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Persistence settings.
    pub storage: StorageConfig,
    /// Provider credentials and endpoints.
    pub providers: ProvidersConfig,
    /// Invocation settings.
    pub invocation: InvocationConfig,
    /// Broadcast settings.
    pub broadcast: BroadcastConfig,
}

impl RelayConfig {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Unset or unparsable numeric values keep their defaults.
    #[must_use]
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(port) = get("NEURAL_RELAY_PORT").and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }
        if let Some(path) = get("NEURAL_RELAY_DB") {
            config.storage.sqlite_path = PathBuf::from(path);
        }

        config.providers.openai.api_key = get(OPENAI_API_KEY_ENV);
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.providers.openai.base_url = url;
        }
        config.providers.gemini.api_key = get(GOOGLE_API_KEY_ENV);
        if let Some(url) = get("GEMINI_BASE_URL") {
            config.providers.gemini.base_url = url;
        }
        if let Some(url) = get("OLLAMA_BASE_URL") {
            config.providers.ollama.base_url = url;
        }

        if let Some(secs) = get("NEURAL_RELAY_PROVIDER_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.invocation.provider_timeout_secs = secs;
        }
        if let Some(buffer) = get("NEURAL_RELAY_SUBSCRIBER_BUFFER").and_then(|s| s.parse().ok()) {
            config.broadcast.subscriber_buffer = buffer;
        }

        config
    }

    /// Validate configuration invariants.
    ///
    /// Credentials are not required here; they are checked when an agent
    /// for that provider is invoked.
    ///
    /// # Errors
    /// Returns an error if any value is out of range or a URL is invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.invocation.title_max_chars == 0 {
            return Err(ConfigError::Invalid(
                "invocation.title_max_chars must be > 0".to_string(),
            ));
        }

        if self.invocation.provider_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "invocation.provider_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.broadcast.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.subscriber_buffer must be > 0".to_string(),
            ));
        }

        validate_url(&self.providers.openai.base_url)?;
        validate_url(&self.providers.gemini.base_url)?;
        validate_url(&self.providers.ollama.base_url)?;

        Ok(())
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("neural_relay.db"),
        }
    }
}

/// Credential and endpoint for one provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// API key, when the provider needs one.
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
}

impl ProviderEndpoint {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
        }
    }
}

/// Process-level provider defaults, overridable per agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// `OpenAI`-compatible backend.
    pub openai: ProviderEndpoint,
    /// Gemini backend.
    pub gemini: ProviderEndpoint,
    /// Ollama backend.
    pub ollama: ProviderEndpoint,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: ProviderEndpoint::with_base_url(DEFAULT_OPENAI_BASE_URL),
            gemini: ProviderEndpoint::with_base_url(DEFAULT_GEMINI_BASE_URL),
            ollama: ProviderEndpoint::with_base_url(DEFAULT_OLLAMA_BASE_URL),
        }
    }
}

impl ProvidersConfig {
    /// Set the `OpenAI` API key.
    #[must_use]
    pub fn with_openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai.api_key = Some(key.into());
        self
    }

    /// Set the Google API key.
    #[must_use]
    pub fn with_gemini_key(mut self, key: impl Into<String>) -> Self {
        self.gemini.api_key = Some(key.into());
        self
    }
}

/// Invocation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvocationConfig {
    /// Maximum characters of the first message used as a conversation title.
    pub title_max_chars: usize,
    /// Upper bound on a single provider call, streaming included.
    pub provider_timeout_secs: u64,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            title_max_chars: 50,
            provider_timeout_secs: 300,
        }
    }
}

impl InvocationConfig {
    /// Provider call timeout.
    #[must_use]
    pub const fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Broadcast settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Queue depth per subscriber before it is considered too slow and dropped.
    pub subscriber_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
        }
    }
}
