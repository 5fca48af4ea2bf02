//! Per-user session: one agent loop plus the conversation it remembers.

use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use stratus_client::LLMClient;
use stratus_common::chat::{Conversation, MessageRole};

use crate::core::{AgentLoop, AgentOutcome};
use crate::error::AgentError;
use crate::prompt::PromptAssembler;

/// Whether earlier turns are sent along with a new query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Every query starts from a fresh `[system, user]` conversation.
    Stateless,
    /// Queries are appended to the running conversation.
    #[default]
    Buffered,
}

/// Message counts of the current conversation. The system message is not
/// counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
    pub tool: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages ({} user, {} assistant, {} tool)",
            self.total, self.user, self.assistant, self.tool
        )
    }
}

/// Owns one conversation; never share a session between users.
pub struct Session<C: LLMClient> {
    agent: AgentLoop<C>,
    assembler: PromptAssembler,
    memory: MemoryMode,
    conversation: Conversation,
}

impl<C: LLMClient> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<C: LLMClient> Session<C> {
    pub fn new(agent: AgentLoop<C>, assembler: PromptAssembler, memory: MemoryMode) -> Self {
        let conversation = assembler.preamble();
        Self {
            agent,
            assembler,
            memory,
            conversation,
        }
    }

    #[must_use]
    pub const fn memory(&self) -> MemoryMode {
        self.memory
    }

    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[must_use]
    pub const fn agent(&self) -> &AgentLoop<C> {
        &self.agent
    }

    /// Answers `query`, or returns a human-readable `"Error: ..."` line.
    pub async fn run_query(&mut self, query: &str) -> String {
        match self.try_run_query(query).await {
            Ok(answer) => answer,
            Err(e) => format!("Error: {e}"),
        }
    }

    /// Answers `query` with the model's final text.
    ///
    /// # Errors
    ///
    /// Any [`AgentError`] from assembling the prompt or running the loop.
    pub async fn try_run_query(&mut self, query: &str) -> Result<String, AgentError> {
        self.run_turn(query, &CancellationToken::new())
            .await
            .map(|outcome| outcome.answer)
    }

    /// Runs one query to completion.
    ///
    /// On failure the conversation is restored to what it was before the
    /// query, so memory never holds a half-finished turn.
    ///
    /// # Errors
    ///
    /// Any [`AgentError`] from assembling the prompt or running the loop.
    pub async fn run_turn(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        if self.memory == MemoryMode::Stateless {
            // Validate before discarding anything
            let fresh = self.assembler.assemble(query)?;
            self.conversation = fresh;
        } else {
            self.assembler.continue_with(&mut self.conversation, query)?;
        }
        // Everything up to and excluding the new user message
        let checkpoint = self.conversation.len().saturating_sub(1);

        match self
            .agent
            .run_with_cancellation(&mut self.conversation, cancel)
            .await
        {
            Ok(outcome) => {
                info!(
                    "Query answered in {} tool round(s), {} tokens",
                    outcome.rounds, outcome.usage.total_tokens
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    "Query failed, rolling conversation back to {checkpoint} message(s): {e}"
                );
                self.conversation.truncate(checkpoint);
                Err(e)
            }
        }
    }

    /// Forgets every turn, keeping the system instruction.
    pub fn clear(&mut self) {
        self.conversation = self.assembler.preamble();
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let user = self.conversation.count_role(MessageRole::User);
        let assistant = self.conversation.count_role(MessageRole::Assistant);
        let tool = self.conversation.count_role(MessageRole::Tool);
        SessionStats {
            total: user + assistant + tool,
            user,
            assistant,
            tool,
        }
    }
}
