//! OpenAI-compatible client implementation.
//!
//! Works against any endpoint that implements `POST /chat/completions`
//! (Groq by default).
//!
//! # Error Handling
//!
//! - **Authentication errors (401)**: invalid or missing API key
//! - **Rate limiting (429)**: surfaced as [`ClientError::RateLimitError`]
//! - **Server errors (5xx)**: surfaced as [`ClientError::ServiceUnavailable`]
//! - **Invalid responses**: missing or malformed response data
//!
//! Transport retries are handled by `reqwest-retry` middleware and are off
//! unless [`RetryConfig::max_retries`](stratus_common::RetryConfig) is raised.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use stratus_common::chat::{Message, MessageRole};
use stratus_common::client::{ChatRequest, ChatResponse, Config};
use stratus_common::tools::ToolCall;

use crate::LLMClient;
use crate::error::{ClientError, ErrorResponse};
use crate::openai::{ChatCompletionRequest, ChatCompletionResponse, OpenAIMessage};

/// Base URL used when the configuration does not name one.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Client for OpenAI-compatible chat-completions APIs.
///
/// The API key is kept in a `SecretString` and redacted from `Debug` output.
#[derive(Clone)]
pub struct OpenAIClient {
    client: ClientWithMiddleware,
    api_key: Arc<SecretString>,
    base_url: String,
    config: Arc<Config>,
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenAIClient {
    /// Create a new client from a configuration.
    ///
    /// ```no_run
    /// use stratus_client::OpenAIClient;
    /// use stratus_common::Config;
    ///
    /// let config = Config::new("groq", "llama3-70b-8192")
    ///     .with_api_key("gsk_...")
    ///     .with_timeout(30);
    ///
    /// let client = OpenAIClient::new(config)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing, the base URL does not
    /// parse, or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::ConfigurationError("API key is required".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        url::Url::parse(&base_url).map_err(|e| {
            ClientError::ConfigurationError(format!("Invalid base URL '{base_url}': {e}"))
        })?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                config.retry_config.initial_delay,
                config.retry_config.max_delay,
            )
            .build_with_max_retries(config.retry_config.max_retries);

        // None means no client-side timeout; the agent loop bounds each call anyway
        let reqwest_client = match config.timeout_seconds {
            Some(timeout) => reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout))
                .build()?,
            None => reqwest::Client::builder().build()?,
        };

        let client = reqwest_middleware::ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_key: Arc::new(api_key),
            base_url,
            config: Arc::new(config),
        })
    }

    /// Set a custom base URL for the API endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Arc::make_mut(&mut self.config).base_url = Some(base_url.clone());
        self.base_url = base_url;
        self
    }

    /// Set the model to use for chat completions.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    async fn make_request<T: for<'de> Deserialize<'de>, B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let body = serde_json::to_string(body).map_err(ClientError::SerializationError)?;
        debug!("POST {url}: {body}");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| match e {
                reqwest_middleware::Error::Reqwest(inner) if inner.is_timeout() => {
                    ClientError::TimeoutError
                }
                other => ClientError::MiddlewareError(other),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);

            let error_text = response.text().await.map_err(|e| {
                warn!("Failed to read error response body: {e}");
                ClientError::NetworkError(e)
            })?;

            let error_message = match serde_json::from_str::<ErrorResponse>(&error_text) {
                Ok(parsed) => parsed.error.message,
                Err(parse_err) => {
                    debug!("Error body is not structured JSON ({parse_err}), using raw text");
                    error_text
                }
            };

            error!(
                "API request failed with status {}: {}",
                status.as_u16(),
                error_message
            );

            return Err(match status.as_u16() {
                401 => ClientError::AuthenticationError(error_message),
                429 => ClientError::RateLimitError { retry_after },
                500..=599 => ClientError::ServiceUnavailable(error_message),
                _ => ClientError::RequestError(error_message),
            });
        }

        let response_text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::TimeoutError
            } else {
                ClientError::NetworkError(e)
            }
        })?;
        debug!("Raw API response: {response_text}");

        serde_json::from_str(&response_text).map_err(ClientError::SerializationError)
    }

    /// Convert a wire message into a conversation message.
    ///
    /// Tool call arguments are passed through as-is; they are validated when
    /// the call is dispatched.
    fn convert_openai_message_to_message(
        openai_msg: &OpenAIMessage,
        conversation_id: Uuid,
    ) -> Message {
        let tool_calls: SmallVec<[ToolCall; 2]> = openai_msg
            .tool_calls
            .as_ref()
            .map(|tcs| tcs.iter().map(ToolCall::from).collect())
            .unwrap_or_default();

        let mut message = Message::new(
            conversation_id,
            openai_msg.role,
            openai_msg.content.clone().unwrap_or_default(),
        );
        message.tool_calls = tool_calls;
        message.tool_call_id.clone_from(&openai_msg.tool_call_id);
        message.name.clone_from(&openai_msg.name);
        message
    }
}

/// Reads a `Retry-After` value given in seconds. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl LLMClient for OpenAIClient {
    fn config(&self) -> &Config {
        &self.config
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.validate_request(request)?;

        let openai_request = ChatCompletionRequest::from((request, self.config.as_ref()));

        let response: ChatCompletionResponse = self
            .make_request("chat/completions", &openai_request)
            .await?;

        let choice = response.choices.first().ok_or_else(|| {
            warn!(
                "Received empty choices array from API. Response ID: {}, Model: {}",
                response.id, response.model
            );
            ClientError::InvalidResponse("API returned no choices in response".to_string())
        })?;

        if choice.message.role != MessageRole::Assistant {
            return Err(ClientError::InvalidResponse(format!(
                "expected an assistant message, got {}",
                choice.message.role
            ))
            .into());
        }

        let conversation_id = request
            .messages
            .first()
            .ok_or_else(|| {
                ClientError::InvalidRequest("Request must contain at least one message".to_string())
            })?
            .conversation_id;

        let message = Self::convert_openai_message_to_message(&choice.message, conversation_id);

        let finish_reason = choice
            .finish_reason
            .as_ref()
            .and_then(|reason| reason.parse().ok());

        Ok(ChatResponse {
            message,
            model: response.model,
            usage: response.usage,
            finish_reason,
            created_at: i64::try_from(response.created)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or_else(Utc::now),
            response_id: Some(response.id),
        })
    }
}
