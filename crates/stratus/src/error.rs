use stratus_client::ClientError;
use thiserror::Error;

/// Why an agent run did not produce an answer.
///
/// Tool failures are not here: they are folded into the conversation as
/// tool results and the model decides what to do with them.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AgentError {
    /// Rejected before any external call (e.g. an empty query).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The model call failed, timed out or returned something unusable.
    #[error("Provider error: {0}")]
    Provider(#[source] anyhow::Error),

    /// The model kept requesting tools after the allowed number of rounds.
    #[error("Round limit exceeded: model still requested tools after {rounds} tool rounds")]
    RoundLimitExceeded { rounds: u32 },

    #[error("Cancelled")]
    Cancelled,

    /// A message could not be appended without breaking conversation ordering.
    #[error("Conversation error: {0}")]
    Conversation(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    /// The provider-level cause, when the model call itself failed.
    #[must_use]
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Provider(source) => source.downcast_ref::<ClientError>(),
            _ => None,
        }
    }

    /// Whether asking again later may succeed (rate limits, timeouts, 5xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.client_error().is_some_and(ClientError::is_retryable)
    }
}
