//! # stratus-client
//!
//! Chat-completions client for LLM providers that speak the OpenAI wire format
//! (Groq, OpenAI, local OpenAI-compatible servers).
//!
//! The agent loop only depends on the [`LLMClient`] trait, so tests can swap in
//! a scripted client.
//!
//! ## Example
//!
//! ```no_run
//! use stratus_client::{LLMClient, OpenAIClient};
//! use stratus_common::{ChatRequest, Config, Message};
//! use uuid::Uuid;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("groq", "llama3-70b-8192")
//!     .with_api_key("gsk_...")
//!     .with_base_url("https://api.groq.com/openai/v1");
//!
//! let client = OpenAIClient::new(config)?;
//!
//! let message = Message::user(Uuid::new_v4(), "Hello, world!");
//! let request = ChatRequest::from((client.config(), vec![message]));
//!
//! let response = client.chat(&request).await?;
//! println!("Response: {}", response.message.content);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use stratus_common::{ChatRequest, ChatResponse, Config};

pub mod error;
pub mod openai;

pub use error::ClientError;
pub use openai::OpenAIClient;

/// Trait for LLM client implementations.
///
/// Implementations must be thread-safe (Send + Sync) since one client is
/// shared by every session of a process.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Get the client's configuration.
    fn config(&self) -> &Config;

    /// Send a chat completion request to the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request fails validation
    /// - Network communication fails
    /// - The API returns an error (authentication, rate limit, etc.)
    /// - The response cannot be parsed
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Check if the client supports tool/function calling.
    fn supports_tools(&self) -> bool;

    /// Validate a chat request before sending.
    ///
    /// Checks that at least one message is provided and that tools are not
    /// sent to a client that cannot handle them.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    fn validate_request(&self, request: &ChatRequest) -> Result<()> {
        request
            .validate()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        if !self.supports_tools() && request.has_tools() {
            return Err(ClientError::ToolsNotSupported.into());
        }

        Ok(())
    }
}
