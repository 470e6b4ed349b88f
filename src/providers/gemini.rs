//! Gemini `generateContent` adapter.
//!
//! Streaming uses `streamGenerateContent?alt=sse`; each SSE frame is a full
//! `GenerateContentResponse` whose candidate parts carry the new text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::model::ProviderKind;
use crate::providers::frames::{Frame, decode_frames, error_message, sse_frames};
use crate::providers::{
    ChunkStream, DecodeFailures, InvokeOptions, ProviderAdapter, ProviderError, ProviderResult,
    endpoint, send_checked,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Adapter for the Gemini generative language API.
pub struct GeminiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiAdapter {
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
        let path = if stream {
            format!("/v1beta/models/{}:streamGenerateContent?alt=sse", self.model)
        } else {
            format!("/v1beta/models/{}:generateContent", self.model)
        };

        let generation_config = (options.temperature.is_some() || options.max_tokens.is_some())
            .then_some(GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            });
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: options.system_prompt.as_deref().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config,
        };

        self.client
            .post(endpoint(&self.base_url, &path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> ProviderResult<String> {
        let response = send_checked(self.kind(), self.request(prompt, options, false)).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::from_reqwest(self.kind(), &err))?;

        if let Some(error) = body.error {
            return Err(ProviderError::backend(self.kind(), error_message(&error)));
        }
        Ok(body.text())
    }

    async fn stream_invoke(
        &self,
        prompt: &str,
        options: &InvokeOptions,
    ) -> ProviderResult<ChunkStream> {
        let response = send_checked(self.kind(), self.request(prompt, options, true)).await?;
        tracing::debug!(model = %self.model, "Gemini stream opened");
        let frames = sse_frames(response.bytes_stream(), self.kind());
        Ok(decode_frames(frames, self.kind(), DecodeFailures::new(), decode_stream_frame))
    }
}

fn decode_stream_frame(data: &str) -> Result<Frame, serde_json::Error> {
    let body: GenerateResponse = serde_json::from_str(data)?;
    if let Some(error) = body.error {
        return Ok(Frame::Failed(error_message(&error)));
    }
    Ok(Frame::Text(body.text()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<Value>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, thought parts excluded.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter(|part| !part.thought)
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::providers::ProviderErrorKind;

    fn frame(text: &str) -> String {
        let value = serde_json::json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        });
        format!("data: {value}\n\n")
    }

    #[test]
    fn test_decode_ignores_thought_parts() {
        let data = r#"{"candidates":[{"content":{"parts":[
            {"text":"thinking...","thought":true},
            {"text":"Answer"},
            {"text":" part"}
        ]}}]}"#;
        assert_eq!(
            decode_stream_frame(data).ok(),
            Some(Frame::Text("Answer part".to_string()))
        );
    }

    #[test]
    fn test_decode_usage_only_frame_is_empty_text() {
        let data = r#"{"usageMetadata":{"promptTokenCount":3}}"#;
        assert_eq!(decode_stream_frame(data).ok(), Some(Frame::Text(String::new())));
    }

    #[tokio::test]
    async fn test_stream_invoke() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(format!("{}{}", frame("Bonjour"), frame(" monde"))),
            )
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::new(reqwest::Client::new(), "g-key", server.uri(), "gemini-pro");
        let stream = adapter
            .stream_invoke("Salut", &InvokeOptions::default())
            .await
            .unwrap();
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(
            chunks,
            vec![Ok("Bonjour".to_string()), Ok(" monde".to_string())]
        );
    }

    #[tokio::test]
    async fn test_backend_error_frame_ends_stream() {
        let server = MockServer::start().await;
        let body = format!(
            "{}data: {}\n\n{}",
            frame("partial"),
            serde_json::json!({ "error": { "code": 503, "message": "model overloaded" } }),
            frame("never")
        );
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::new(reqwest::Client::new(), "g-key", server.uri(), "gemini-pro");
        let chunks: Vec<_> = adapter
            .stream_invoke("Salut", &InvokeOptions::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Ok("partial".to_string()));
        let err = chunks[1].clone().err().unwrap();
        assert_eq!(err.kind, ProviderErrorKind::Backend);
        assert_eq!(err.message, "model overloaded");
    }

    #[tokio::test]
    async fn test_invoke() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "Full" }, { "text": " reply" }] } }]
            })))
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::new(reqwest::Client::new(), "g-key", server.uri(), "gemini-pro");
        let text = adapter.invoke("Salut", &InvokeOptions::default()).await.unwrap();
        assert_eq!(text, "Full reply");
    }
}
