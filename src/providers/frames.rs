//! Wire framing shared by the adapters.
//!
//! Two framings are in use:
//! - Server-Sent Events (`OpenAI`, Gemini): each `data:` payload is one frame.
//! - Newline-delimited JSON (Ollama): each non-empty line is one frame.
//!
//! Frames are then decoded independently by a provider-specific function.
//! A frame that fails to decode is skipped and counted; the stream goes on.

use std::collections::VecDeque;

use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};

use crate::domain::model::ProviderKind;
use crate::providers::error::{ProviderError, ProviderErrorKind, ProviderResult};
use crate::providers::stream::{ChunkStream, DecodeFailures};

/// Raw response body as produced by `reqwest::Response::bytes_stream`.
pub type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Raw frame payloads, or the transport error that ended them.
pub type FrameStream = BoxStream<'static, ProviderResult<String>>;

/// Outcome of decoding one frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    /// A text fragment (possibly empty, in which case it is dropped).
    Text(String),
    /// A well-formed frame carrying no text (role markers, usage, keep-alives).
    Skip,
    /// The backend signalled the end of the generation.
    Done,
    /// The backend reported an error.
    Failed(String),
}

/// Split an SSE body into `data:` payloads.
pub fn sse_frames<S>(body: S, provider: ProviderKind) -> FrameStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    body.eventsource()
        .map(move |event| match event {
            Ok(event) => Ok(event.data),
            Err(EventStreamError::Transport(err)) => Err(ProviderError::from_reqwest(provider, &err)),
            Err(err) => Err(ProviderError::new(
                provider,
                ProviderErrorKind::Transport,
                format!("malformed event stream: {err}"),
            )),
        })
        .boxed()
}

struct LineSplitter {
    body: ByteStream,
    buffer: Vec<u8>,
    lines: VecDeque<String>,
    finished: bool,
    provider: ProviderKind,
    failures: DecodeFailures,
}

impl LineSplitter {
    fn drain_complete_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line);
        }
    }

    fn flush_tail(&mut self) {
        let tail = std::mem::take(&mut self.buffer);
        self.push_line(&tail);
    }

    fn push_line(&mut self, raw: &[u8]) {
        match std::str::from_utf8(raw) {
            Ok(line) => {
                let line = line.trim();
                if !line.is_empty() {
                    self.lines.push_back(line.to_string());
                }
            }
            Err(err) => {
                self.failures.record();
                tracing::warn!(
                    provider = %self.provider,
                    skipped = self.failures.count(),
                    "Skipping stream line with invalid UTF-8: {err}"
                );
            }
        }
    }
}

/// Split a newline-delimited body into lines.
///
/// Lines are cut on raw bytes before UTF-8 decoding, so a multi-byte
/// character spanning two network reads stays intact. A line that is not
/// valid UTF-8 is skipped and recorded in `failures`. A trailing line
/// without a newline is emitted when the body ends.
pub fn ndjson_frames<S>(body: S, provider: ProviderKind, failures: DecodeFailures) -> FrameStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let splitter = LineSplitter {
        body: body.boxed(),
        buffer: Vec::new(),
        lines: VecDeque::new(),
        finished: false,
        provider,
        failures,
    };

    stream::unfold(splitter, |mut splitter| async move {
        loop {
            if let Some(line) = splitter.lines.pop_front() {
                return Some((Ok(line), splitter));
            }
            if splitter.finished {
                return None;
            }
            match splitter.body.next().await {
                Some(Ok(bytes)) => {
                    splitter.buffer.extend_from_slice(&bytes);
                    splitter.drain_complete_lines();
                }
                Some(Err(err)) => {
                    splitter.finished = true;
                    splitter.buffer.clear();
                    let err = ProviderError::from_reqwest(splitter.provider, &err);
                    return Some((Err(err), splitter));
                }
                None => {
                    splitter.finished = true;
                    splitter.flush_tail();
                }
            }
        }
    })
    .boxed()
}

struct FrameDecoder<F> {
    frames: FrameStream,
    decode: F,
    failures: DecodeFailures,
    provider: ProviderKind,
    finished: bool,
}

/// Decode frames into a [`ChunkStream`].
///
/// Undecodable frames are recorded in `failures`, which the returned stream
/// exposes. Empty fragments are dropped. The stream ends on [`Frame::Done`],
/// on the end of the body, or right after the first error.
pub fn decode_frames<F>(
    frames: FrameStream,
    provider: ProviderKind,
    failures: DecodeFailures,
    decode: F,
) -> ChunkStream
where
    F: Fn(&str) -> Result<Frame, serde_json::Error> + Send + 'static,
{
    let decoder = FrameDecoder {
        frames,
        decode,
        failures: failures.clone(),
        provider,
        finished: false,
    };

    let chunks = stream::unfold(decoder, |mut decoder| async move {
        if decoder.finished {
            return None;
        }
        loop {
            let data = match decoder.frames.next().await {
                None => return None,
                Some(Err(err)) => {
                    decoder.finished = true;
                    return Some((Err(err), decoder));
                }
                Some(Ok(data)) => data,
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }

            match (decoder.decode)(data) {
                Ok(Frame::Text(text)) if !text.is_empty() => {
                    return Some((Ok(text), decoder));
                }
                Ok(Frame::Text(_) | Frame::Skip) => {}
                Ok(Frame::Done) => return None,
                Ok(Frame::Failed(message)) => {
                    decoder.finished = true;
                    let err = ProviderError::backend(decoder.provider, message);
                    return Some((Err(err), decoder));
                }
                Err(err) => {
                    decoder.failures.record();
                    tracing::warn!(
                        provider = %decoder.provider,
                        skipped = decoder.failures.count(),
                        "Skipping undecodable stream frame: {err}"
                    );
                }
            }
        }
    })
    .fuse()
    .boxed();

    ChunkStream::new(chunks, failures)
}

/// Extract a readable message from a backend `error` value.
///
/// Backends send either a bare string or an object with a `message` field.
#[must_use]
pub fn error_message(error: &serde_json::Value) -> String {
    error
        .as_str()
        .or_else(|| error.get("message").and_then(serde_json::Value::as_str))
        .map_or_else(|| error.to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        let parts: Vec<Result<Bytes, reqwest::Error>> = parts
            .iter()
            .map(|part| Ok(Bytes::copy_from_slice(part)))
            .collect();
        stream::iter(parts)
    }

    fn plain_text(data: &str) -> Result<Frame, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(data)?;
        if let Some(error) = value.get("error") {
            return Ok(Frame::Failed(error_message(error)));
        }
        if value.get("done").and_then(serde_json::Value::as_bool) == Some(true) {
            return Ok(Frame::Done);
        }
        Ok(value
            .get("text")
            .and_then(serde_json::Value::as_str)
            .map_or(Frame::Skip, |t| Frame::Text(t.to_string())))
    }

    #[tokio::test]
    async fn test_ndjson_keeps_split_multibyte_characters() {
        // "é" is 0xC3 0xA9; split it across two reads.
        let frames: Vec<_> = ndjson_frames(
            body(&[b"{\"text\":\"caf\xC3", b"\xA9\"}\n{\"text\":\"!\"}"]),
            ProviderKind::Ollama,
            DecodeFailures::new(),
        )
        .collect()
        .await;
        assert_eq!(
            frames,
            vec![
                Ok("{\"text\":\"café\"}".to_string()),
                Ok("{\"text\":\"!\"}".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ndjson_skips_blank_lines() {
        let frames: Vec<_> = ndjson_frames(
            body(&[b"\n\n{\"a\":1}\r\n\n"]),
            ProviderKind::Ollama,
            DecodeFailures::new(),
        )
        .collect()
        .await;
        assert_eq!(frames, vec![Ok("{\"a\":1}".to_string())]);
    }

    #[tokio::test]
    async fn test_sse_frames_extract_data() {
        let frames: Vec<_> = sse_frames(
            body(&[b"data: {\"text\":\"a\"}\n\n: comment\n\nda", b"ta: [DONE]\n\n"]),
            ProviderKind::OpenAi,
        )
        .collect()
        .await;
        assert_eq!(
            frames,
            vec![Ok("{\"text\":\"a\"}".to_string()), Ok("[DONE]".to_string())]
        );
    }

    fn decode_ndjson(parts: &[&[u8]]) -> ChunkStream {
        let failures = DecodeFailures::new();
        let frames = ndjson_frames(body(parts), ProviderKind::Ollama, failures.clone());
        decode_frames(frames, ProviderKind::Ollama, failures, plain_text)
    }

    #[tokio::test]
    async fn test_decode_skips_and_counts_bad_frames() {
        let stream = decode_ndjson(&[
            b"{\"text\":\"Hi\"}\nnot json\n{\"text\":\"\"}\n{\"text\":\" there\"}\n",
        ]);
        let failures = stream.decode_failures();
        let chunks: Vec<_> = stream.collect().await;

        assert_eq!(chunks, vec![Ok("Hi".to_string()), Ok(" there".to_string())]);
        assert_eq!(failures.count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_counted_not_replaced() {
        // 0xFF never appears in UTF-8.
        let stream = decode_ndjson(&[b"{\"text\":\"a\"}\n{\"text\":\"\xFF\"}\n{\"text\":\"b\"}\n"]);
        let failures = stream.decode_failures();
        let chunks: Vec<_> = stream.collect().await;

        assert_eq!(chunks, vec![Ok("a".to_string()), Ok("b".to_string())]);
        assert!(chunks.iter().flatten().all(|c| !c.contains('\u{FFFD}')));
        assert_eq!(failures.count(), 1);
    }

    #[tokio::test]
    async fn test_decode_stops_at_done_and_after_error() {
        let chunks: Vec<_> =
            decode_ndjson(&[b"{\"text\":\"a\"}\n{\"done\":true}\n{\"text\":\"late\"}\n"])
                .collect()
                .await;
        assert_eq!(chunks, vec![Ok("a".to_string())]);

        let chunks: Vec<_> = decode_ndjson(&[
            b"{\"text\":\"a\"}\n{\"error\":\"model crashed\"}\n{\"text\":\"b\"}\n",
        ])
        .collect()
        .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Ok("a".to_string()));
        let err = chunks[1].clone().err();
        assert_eq!(err.map(|e| e.kind), Some(ProviderErrorKind::Backend));
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&serde_json::json!("boom")), "boom");
        assert_eq!(
            error_message(&serde_json::json!({ "message": "quota", "code": 429 })),
            "quota"
        );
        assert_eq!(error_message(&serde_json::json!({ "code": 1 })), "{\"code\":1}");
    }
}
