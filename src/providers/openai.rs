//! `OpenAI`-compatible chat completions adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::model::ProviderKind;
use crate::providers::frames::{Frame, decode_frames, error_message, sse_frames};
use crate::providers::{
    ChatMessage, ChunkStream, DecodeFailures, InvokeOptions, ProviderAdapter, ProviderError,
    ProviderResult, chat_messages, endpoint, send_checked,
};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const DONE_SENTINEL: &str = "[DONE]";

/// Adapter for `POST {base}/chat/completions`.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiAdapter {
    /// Create an adapter for `model`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn request(&self, prompt: &str, options: &InvokeOptions, stream: bool) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.model,
            messages: chat_messages(prompt, options),
            stream,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let accept = if stream { "text/event-stream" } else { "application/json" };

        self.client
            .post(endpoint(&self.base_url, CHAT_COMPLETIONS_PATH))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, accept)
            .json(&body)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> ProviderResult<String> {
        let response = send_checked(self.kind(), self.request(prompt, options, false)).await?;
        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|err| ProviderError::from_reqwest(self.kind(), &err))?;

        if let Some(error) = completion.error {
            return Err(ProviderError::backend(self.kind(), error_message(&error)));
        }

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default())
    }

    async fn stream_invoke(
        &self,
        prompt: &str,
        options: &InvokeOptions,
    ) -> ProviderResult<ChunkStream> {
        let response = send_checked(self.kind(), self.request(prompt, options, true)).await?;
        tracing::debug!(model = %self.model, "OpenAI stream opened");
        let frames = sse_frames(response.bytes_stream(), self.kind());
        Ok(decode_frames(frames, self.kind(), DecodeFailures::new(), decode_stream_frame))
    }
}

/// Decode one `data:` payload of a chat completions stream.
fn decode_stream_frame(data: &str) -> Result<Frame, serde_json::Error> {
    if data == DONE_SENTINEL {
        return Ok(Frame::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)?;
    if let Some(error) = chunk.error {
        return Ok(Frame::Failed(error_message(&error)));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .map_or(Frame::Skip, Frame::Text))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<ContentHolder>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<ContentHolder>,
}

#[derive(Debug, Deserialize)]
struct ContentHolder {
    content: Option<String>,
}
