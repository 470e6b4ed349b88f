//! Ollama `/api/chat` adapter.
//!
//! Streaming responses are newline-delimited JSON objects; the last one
//! carries `"done": true`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::model::ProviderKind;
use crate::providers::frames::{Frame, decode_frames, error_message, ndjson_frames};
use crate::providers::{
    ChatMessage, ChunkStream, DecodeFailures, InvokeOptions, ProviderAdapter, ProviderError,
    ProviderResult, chat_messages, endpoint, send_checked,
};

const CHAT_PATH: &str = "/api/chat";

/// Adapter for a local or remote Ollama server. No credentials are needed.
pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaAdapter {
    /// Create an adapter for `model` served at `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn request(&self, prompt: &str, options: &InvokeOptions, stream: bool) -> reqwest::RequestBuilder {
        let model_options = (options.temperature.is_some() || options.max_tokens.is_some())
            .then_some(ModelOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            });
        let body = ChatRequest {
            model: &self.model,
            messages: chat_messages(prompt, options),
            stream,
            options: model_options,
        };

        self.client
            .post(endpoint(&self.base_url, CHAT_PATH))
            .json(&body)
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> ProviderResult<String> {
        let response = send_checked(self.kind(), self.request(prompt, options, false)).await?;
        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::from_reqwest(self.kind(), &err))?;

        if let Some(error) = reply.error {
            return Err(ProviderError::backend(self.kind(), error_message(&error)));
        }
        Ok(reply.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream_invoke(
        &self,
        prompt: &str,
        options: &InvokeOptions,
    ) -> ProviderResult<ChunkStream> {
        let response = send_checked(self.kind(), self.request(prompt, options, true)).await?;
        tracing::debug!(model = %self.model, "Ollama stream opened");
        let failures = DecodeFailures::new();
        let frames = ndjson_frames(response.bytes_stream(), self.kind(), failures.clone());
        Ok(decode_frames(frames, self.kind(), failures, decode_stream_line))
    }
}

fn decode_stream_line(line: &str) -> Result<Frame, serde_json::Error> {
    let reply: ChatResponse = serde_json::from_str(line)?;
    if let Some(error) = reply.error {
        return Ok(Frame::Failed(error_message(&error)));
    }

    let text = reply.message.map(|m| m.content).unwrap_or_default();
    if reply.done && text.is_empty() {
        Ok(Frame::Done)
    } else {
        // The final object may still carry a last fragment.
        Ok(Frame::Text(text))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions>,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}
