//! Error payloads returned by the HTTP surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::domain::errors::ConfigError;
use crate::invocation::InvocationError;
use crate::store::StoreError;

/// Generic message for failures whose cause is not exposed.
pub const INTERNAL_ERROR: &str = "Internal server error";

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

/// An error that maps onto a status code and a `{error, details?}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 400 with the given message.
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    /// 404 with the given message.
    #[error("not found: {0}")]
    NotFound(&'static str),
    /// 500 `{error: "Agent invocation failed", details}`.
    #[error("agent invocation failed: {0}")]
    InvocationFailed(String),
    /// 500 with a fixed public message; the cause is only logged.
    #[error("{public}: {cause}")]
    Internal {
        /// Message returned to the client.
        public: &'static str,
        /// Logged cause.
        cause: String,
    },
}

impl ApiError {
    /// 500 with [`INTERNAL_ERROR`] as public message.
    pub fn internal(cause: impl ToString) -> Self {
        Self::Internal {
            public: INTERNAL_ERROR,
            cause: cause.to_string(),
        }
    }
}

impl From<InvocationError> for ApiError {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Validation(_) => {
                Self::BadRequest(crate::invocation::request::MISSING_FIELDS)
            }
            InvocationError::AgentNotFound(_) => Self::NotFound("Agent not found"),
            InvocationError::Provider(err) => Self::InvocationFailed(err.to_string()),
            InvocationError::Config(err) => Self::internal(err),
            InvocationError::Persistence(err) => Self::internal(err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, *message, None),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, *message, None),
            Self::InvocationFailed(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Agent invocation failed",
                Some(details.as_str()),
            ),
            Self::Internal { public, cause } => {
                tracing::error!("{public}: {cause}");
                (StatusCode::INTERNAL_SERVER_ERROR, *public, None)
            }
        };
        (status, Json(ErrorBody { error, details })).into_response()
    }
}

/// Failure while building the application state.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The database could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}
