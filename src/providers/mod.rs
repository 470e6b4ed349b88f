//! Provider adapters: one per language-model backend.
//!
//! Every adapter exposes the same two capabilities:
//! - `invoke`: a single blocking call returning the whole response text
//! - `stream_invoke`: a [`ChunkStream`] of text fragments in backend order
//!
//! Each adapter owns the decoding of its backend's wire format
//! (SSE for `OpenAI` and Gemini, newline-delimited JSON for Ollama).

pub mod error;
pub mod frames;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod stream;

pub use error::{ProviderError, ProviderErrorKind, ProviderResult};
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use registry::{CredentialSource, ProviderRegistry};
pub use stream::{ChunkStream, DecodeFailures};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::model::ProviderKind;

/// Standard User-Agent header for outgoing provider requests.
pub const USER_AGENT: &str = concat!("neural-relay/", env!("CARGO_PKG_VERSION"));

/// Per-call generation options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvokeOptions {
    /// System prompt sent ahead of the user prompt.
    pub system_prompt: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Cap on generated tokens.
    pub max_tokens: Option<u32>,
}

impl InvokeOptions {
    /// Read options from an agent configuration map.
    ///
    /// Recognized keys: `systemPrompt`, `temperature`, `maxTokens`.
    /// Values of the wrong type are ignored.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_agent_config(config: &Map<String, Value>) -> Self {
        Self {
            system_prompt: config
                .get("systemPrompt")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|prompt| !prompt.is_empty())
                .map(ToString::to_string),
            temperature: config
                .get("temperature")
                .and_then(Value::as_f64)
                .map(|t| t as f32),
            max_tokens: config
                .get("maxTokens")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
        }
    }
}

/// Capability set shared by all provider backends.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Backend this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Run a non-streaming generation and return the full text.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] on transport failure, non-success status
    /// or a backend-reported error.
    async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> ProviderResult<String>;

    /// Start a streaming generation.
    ///
    /// Fails early when the request cannot be sent or the status is not a
    /// success; later failures surface as an `Err` item of the stream.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] if the backend cannot be reached or
    /// rejects the request.
    async fn stream_invoke(&self, prompt: &str, options: &InvokeOptions)
    -> ProviderResult<ChunkStream>;
}

/// Chat message in the `{role, content}` shape used by `OpenAI` and Ollama.
#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Build the message list for a single-prompt chat request.
pub(crate) fn chat_messages<'a>(prompt: &'a str, options: &'a InvokeOptions) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = options.system_prompt.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: prompt,
    });
    messages
}

/// Send a request and turn transport failures and non-success statuses into errors.
pub(crate) async fn send_checked(
    provider: ProviderKind,
    request: reqwest::RequestBuilder,
) -> ProviderResult<reqwest::Response> {
    let response = request
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .map_err(|err| ProviderError::from_reqwest(provider, &err))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::http_status(provider, status.as_u16(), &body));
    }

    Ok(response)
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
