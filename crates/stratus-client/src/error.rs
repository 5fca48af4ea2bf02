//! Error types for the client library.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error body returned by OpenAI-compatible APIs.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorDetail,
}

/// The `error` object inside an [`ErrorResponse`].
#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable error message.
    pub message: String,
}

/// Errors that can occur while talking to an LLM provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Transport-level failure (DNS, connection reset, TLS).
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Failure inside the retry middleware stack.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    /// Request or response body could not be (de)serialized.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The provider rejected the credentials (HTTP 401).
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The provider is throttling requests (HTTP 429).
    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimitError {
        /// Delay suggested by the provider, if any.
        retry_after: Option<Duration>,
    },

    /// The provider is temporarily unable to serve the request (HTTP 5xx).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The client is misconfigured (missing API key, bad base URL).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The request did not complete in time.
    #[error("Timeout error")]
    TimeoutError,

    /// The request failed local validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider answered with something unusable (e.g. no choices).
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request carries tools but the client cannot send them.
    #[error("Tool execution not supported")]
    ToolsNotSupported,

    /// Any other non-success HTTP status.
    #[error("Request error: {0}")]
    RequestError(String),
}

impl ClientError {
    /// Whether the failure is transient.
    ///
    /// The agent loop never retries on its own; this is informational for
    /// callers that want to.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_)
                | Self::MiddlewareError(_)
                | Self::TimeoutError
                | Self::RateLimitError { .. }
                | Self::ServiceUnavailable(_)
        )
    }

    /// Whether this is an authentication failure.
    #[must_use]
    pub const fn is_authentication_error(&self) -> bool {
        matches!(self, Self::AuthenticationError(_))
    }

    /// Provider-suggested wait before retrying, for rate-limit errors.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitError { retry_after } => *retry_after,
            _ => None,
        }
    }
}
