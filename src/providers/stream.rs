//! The chunk stream every adapter returns from `stream_invoke`.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use futures::stream::BoxStream;

use crate::providers::error::ProviderResult;

/// Counter of stream frames that could not be decoded and were skipped.
///
/// Cloning shares the counter.
#[derive(Clone, Debug, Default)]
pub struct DecodeFailures(Arc<AtomicU64>);

impl DecodeFailures {
    /// Create a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one skipped frame.
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of frames skipped so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Finite, single-use sequence of text fragments produced by one provider call.
///
/// Fragments arrive in backend order. The stream ends after the backend
/// finishes, or right after yielding its first error.
pub struct ChunkStream {
    inner: BoxStream<'static, ProviderResult<String>>,
    decode_failures: DecodeFailures,
}

impl ChunkStream {
    /// Wrap a fused fragment stream and the counter its decoder writes to.
    #[must_use]
    pub const fn new(
        inner: BoxStream<'static, ProviderResult<String>>,
        decode_failures: DecodeFailures,
    ) -> Self {
        Self {
            inner,
            decode_failures,
        }
    }

    /// Handle on the skipped-frame counter for this call.
    #[must_use]
    pub fn decode_failures(&self) -> DecodeFailures {
        self.decode_failures.clone()
    }
}

impl Stream for ChunkStream {
    type Item = ProviderResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("decode_failures", &self.decode_failures.count())
            .finish_non_exhaustive()
    }
}
