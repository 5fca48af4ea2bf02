//! Builds the message sequence handed to the agent loop.
//!
//! A fresh conversation is always `[system, user]`. Tool steps are appended
//! after the user message by the loop, so the tail of the conversation acts as
//! the agent's scratchpad.

use log::debug;
use stratus_common::chat::Conversation;

use crate::error::AgentError;

/// System instruction used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that provides helpful answers to user queries.";

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_instruction: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl PromptAssembler {
    /// A blank instruction means conversations start without a system message.
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
        }
    }

    #[must_use]
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// A conversation holding only the system instruction.
    #[must_use]
    pub fn preamble(&self) -> Conversation {
        let mut conversation = Conversation::new();
        if !self.system_instruction.trim().is_empty() {
            let system = conversation.system_message(self.system_instruction.clone());
            if let Err(e) = conversation.add_message(system) {
                debug!("System instruction not added: {e}");
            }
        }
        conversation
    }

    /// Starts a new conversation for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidInput`] for an empty or whitespace-only query.
    pub fn assemble(&self, query: &str) -> Result<Conversation, AgentError> {
        let query = validate_query(query)?;
        let mut conversation = self.preamble();
        let user = conversation.user_message(query);
        conversation
            .add_message(user)
            .map_err(AgentError::Conversation)?;
        Ok(conversation)
    }

    /// Appends `query` as a new user turn of an existing conversation.
    ///
    /// An empty conversation gets the system instruction first.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidInput`] for an empty or whitespace-only
    /// query, and [`AgentError::Conversation`] if the message cannot be
    /// appended.
    pub fn continue_with(
        &self,
        conversation: &mut Conversation,
        query: &str,
    ) -> Result<(), AgentError> {
        let query = validate_query(query)?;

        if conversation.is_empty() && !self.system_instruction.trim().is_empty() {
            let system = conversation.system_message(self.system_instruction.clone());
            conversation
                .add_message(system)
                .map_err(AgentError::Conversation)?;
        }

        let pending = conversation.pending_tool_calls();
        if !pending.is_empty() {
            return Err(AgentError::Conversation(anyhow::anyhow!(
                "{} tool call(s) are still unanswered",
                pending.len()
            )));
        }

        let user = conversation.user_message(query);
        conversation
            .add_message(user)
            .map_err(AgentError::Conversation)
    }
}

fn validate_query(query: &str) -> Result<&str, AgentError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(AgentError::InvalidInput("query must not be empty".to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use stratus_common::chat::MessageRole;
    use stratus_common::tools::ToolCall;

    fn roles(conversation: &Conversation) -> Vec<MessageRole> {
        conversation.get_messages().iter().map(|m| m.role).collect()
    }

    #[test]
    fn test_assemble_produces_system_then_user() {
        let assembler = PromptAssembler::default();
        let conversation = assembler
            .assemble("What's the weather in Pokhara?")
            .unwrap();

        assert_eq!(roles(&conversation), vec![MessageRole::System, MessageRole::User]);
        let messages = conversation.get_messages();
        assert_eq!(messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(messages[1].content, "What's the weather in Pokhara?");
    }

    #[test]
    fn test_assemble_rejects_blank_queries() {
        let assembler = PromptAssembler::default();
        for query in ["", "   ", "\n\t"] {
            let err = assembler.assemble(query).unwrap_err();
            assert!(matches!(err, AgentError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_assemble_trims_query() {
        let conversation = PromptAssembler::default().assemble("  hi  ").unwrap();
        assert_eq!(conversation.get_messages()[1].content, "hi");
    }

    #[test]
    fn test_blank_instruction_omits_system_message() {
        let conversation = PromptAssembler::new("").assemble("hi").unwrap();
        assert_eq!(roles(&conversation), vec![MessageRole::User]);
    }

    #[test]
    fn test_preamble_holds_only_the_system_message() {
        let preamble = PromptAssembler::new("Be brief.").preamble();
        assert_eq!(roles(&preamble), vec![MessageRole::System]);
        assert_eq!(preamble.get_messages()[0].content, "Be brief.");
        assert!(PromptAssembler::new("  ").preamble().is_empty());
    }

    #[test]
    fn test_continue_with_appends_user_turn() {
        let assembler = PromptAssembler::new("Be brief.");
        let mut conversation = assembler.assemble("first").unwrap();
        let reply = conversation.assistant_message("answer");
        conversation.add_message(reply).unwrap();

        assembler.continue_with(&mut conversation, "second").unwrap();

        assert_eq!(
            roles(&conversation),
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(conversation.last().unwrap().content, "second");
    }

    #[test]
    fn test_continue_with_on_empty_conversation_adds_system() {
        let assembler = PromptAssembler::default();
        let mut conversation = Conversation::new();
        assembler.continue_with(&mut conversation, "hello").unwrap();
        assert_eq!(roles(&conversation), vec![MessageRole::System, MessageRole::User]);
    }

    #[test]
    fn test_continue_with_rejects_blank_query_without_mutating() {
        let assembler = PromptAssembler::default();
        let mut conversation = assembler.preamble();
        let err = assembler.continue_with(&mut conversation, " ").unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_continue_with_refuses_dangling_tool_calls() {
        let assembler = PromptAssembler::default();
        let mut conversation = assembler.assemble("weather?").unwrap();
        let request = conversation
            .assistant_message("")
            .with_tool_calls(vec![ToolCall::new("get_weather", "{}")])
            .unwrap();
        conversation.add_message(request).unwrap();

        let err = assembler
            .continue_with(&mut conversation, "next")
            .unwrap_err();
        assert!(matches!(err, AgentError::Conversation(_)));
    }
}
