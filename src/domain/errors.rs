//! Configuration error types.

use thiserror::Error;

/// Invalid configuration or a missing credential.
///
/// Raised before any network activity takes place.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A credential required by the selected provider is absent.
    #[error("missing required credential: {name}")]
    MissingCredential {
        /// Name of the missing credential (environment variable or config key).
        name: &'static str,
    },
    /// The agent names a provider kind this crate does not support.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    /// A configured base URL could not be parsed.
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        /// Offending value.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
    /// Any other out-of-range value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Convenience result alias for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Parse a base URL, reporting the offending value on failure.
///
/// # Errors
/// Returns [`ConfigError::InvalidUrl`] if `url` is not a valid absolute URL.
pub fn validate_url(url: &str) -> ConfigResult<()> {
    url::Url::parse(url).map_err(|source| ConfigError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(())
}
