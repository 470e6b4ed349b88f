//! Provider call errors.

use std::fmt;

use thiserror::Error;

use crate::domain::model::ProviderKind;

/// Classification of a provider failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderErrorKind {
    /// Connection or body-read failure.
    Transport,
    /// The backend answered with a non-success HTTP status.
    HttpStatus(u16),
    /// The backend reported an error inside the response payload.
    Backend,
    /// The call exceeded its time budget.
    Timeout,
    /// The caller cancelled the invocation.
    Cancelled,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::HttpStatus(status) => write!(f, "http status {status}"),
            Self::Backend => f.write_str("backend"),
            Self::Timeout => f.write_str("timeout"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A failed provider call. Never retried by the adapter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{provider} provider error ({kind}): {message}")]
pub struct ProviderError {
    /// Backend that failed.
    pub provider: ProviderKind,
    /// Failure class.
    pub kind: ProviderErrorKind,
    /// Human-readable cause.
    pub message: String,
}

impl ProviderError {
    /// Build an error.
    #[must_use]
    pub fn new(provider: ProviderKind, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    /// Non-success status, with the (truncated) response body as cause.
    #[must_use]
    pub fn http_status(provider: ProviderKind, status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("{provider} API returned status {status}")
        } else {
            let excerpt: String = body.chars().take(500).collect();
            format!("{provider} API returned status {status}: {excerpt}")
        };
        Self::new(provider, ProviderErrorKind::HttpStatus(status), message)
    }

    /// Error reported by the backend inside the stream.
    #[must_use]
    pub fn backend(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Backend, message)
    }

    /// Invocation cancelled by the caller.
    #[must_use]
    pub fn cancelled(provider: ProviderKind) -> Self {
        Self::new(provider, ProviderErrorKind::Cancelled, "invocation cancelled")
    }

    /// Classify a `reqwest` failure.
    #[must_use]
    pub fn from_reqwest(provider: ProviderKind, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(provider, ProviderErrorKind::Timeout, format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::new(
                provider,
                ProviderErrorKind::Transport,
                format!("connection failed: {err}"),
            )
        } else {
            Self::new(
                provider,
                ProviderErrorKind::Transport,
                format!("network error: {err}"),
            )
        }
    }
}

/// Convenience result alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;
