//! Conversation and message management for LLM interactions.
//!
//! The module centers around two types:
//!
//! - [`Message`]: a single role-tagged message (system, user, assistant, tool)
//! - [`Conversation`]: the ordered message history handed to the model
//!
//! # Ordering rules
//!
//! [`Conversation::add_message`] keeps the history well formed:
//!
//! - every message carries the conversation's id
//! - a system message may only open the conversation, and appears at most once
//! - a tool message must answer an invocation requested by the most recent
//!   assistant message, and each invocation is answered at most once
//! - no other message may follow until every invocation has been answered
//!
//! # Example
//!
//! ```
//! use stratus_common::chat::{Conversation, MessageRole};
//! use stratus_common::tools::ToolCall;
//!
//! let mut conversation = Conversation::new();
//! conversation.add_message(conversation.system_message("You are helpful.")).unwrap();
//! conversation.add_message(conversation.user_message("Weather in Kathmandu?")).unwrap();
//!
//! let call = ToolCall::with_id("call_1", "get_weather", r#"{"lat":27.7,"lon":85.3}"#);
//! let assistant = conversation
//!     .assistant_message("")
//!     .with_tool_calls(vec![call])
//!     .unwrap();
//! conversation.add_message(assistant).unwrap();
//!
//! let result = conversation
//!     .tool_message(r#"{"current_weather":{}}"#, "call_1", "get_weather")
//!     .unwrap();
//! conversation.add_message(result).unwrap();
//!
//! assert_eq!(conversation.count_role(MessageRole::Tool), 1);
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::tools::ToolCall;

/// The role of a message sender.
///
/// Serialized as lowercase strings matching the OpenAI API format.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MessageRole {
    /// Instructions for the model. Only ever the first message.
    #[serde(rename = "system")]
    System,
    /// Input from the end user.
    #[serde(rename = "user")]
    User,
    /// Model output: final text, tool invocation requests, or both.
    #[serde(rename = "assistant")]
    Assistant,
    /// The result of one tool invocation.
    #[serde(rename = "tool")]
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        f.write_str(name)
    }
}

/// A single message in a conversation.
///
/// Use the convenience constructors for common message types:
///
/// ```
/// use stratus_common::chat::Message;
/// use uuid::Uuid;
///
/// let conv_id = Uuid::new_v4();
/// let system = Message::system(conv_id, "You are a helpful assistant");
/// let user = Message::user(conv_id, "What is the weather in Pokhara?");
/// let tool = Message::tool(
///     conv_id,
///     r#"{"temperature": 21.3}"#,
///     "call_123".to_string(),
///     "get_weather".to_string(),
/// )
/// .expect("valid tool message");
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, TypedBuilder)]
pub struct Message {
    /// Unique identifier for this message.
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    /// ID of the conversation this message belongs to.
    pub conversation_id: Uuid,

    /// The role of the message sender.
    pub role: MessageRole,

    /// The text content of the message.
    ///
    /// For tool messages this is the serialized tool result. May be empty for
    /// assistant messages that only request tool calls.
    pub content: String,

    /// When this message was created.
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,

    /// Tool invocations requested by an assistant message.
    ///
    /// `SmallVec` avoids a heap allocation for the common one-or-two case.
    #[builder(default)]
    pub tool_calls: SmallVec<[ToolCall; 2]>,

    /// For tool messages, the invocation this message answers.
    #[builder(default)]
    pub tool_call_id: Option<String>,

    /// For tool messages, the name of the tool that ran.
    #[builder(default)]
    pub name: Option<String>,
}

impl Message {
    /// Creates a new message with the specified role and content.
    pub fn new(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: SmallVec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Creates a new system message.
    pub fn system(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::System, content)
    }

    /// Creates a new user message.
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::User, content)
    }

    /// Creates a new assistant message.
    pub fn assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::Assistant, content)
    }

    /// Creates a new tool result message.
    ///
    /// # Errors
    ///
    /// Returns an error if `tool_call_id` or `function_name` is empty.
    pub fn tool(
        conversation_id: Uuid,
        content: impl Into<String>,
        tool_call_id: String,
        function_name: String,
    ) -> anyhow::Result<Self> {
        if tool_call_id.is_empty() {
            anyhow::bail!("Tool call ID cannot be empty");
        }
        if function_name.is_empty() {
            anyhow::bail!("Function name cannot be empty for tool messages");
        }
        let mut msg = Self::new(conversation_id, MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id);
        msg.name = Some(function_name);
        Ok(msg)
    }

    /// Sets the tool calls for this message.
    ///
    /// # Errors
    ///
    /// Returns an error if this message is not an assistant message.
    pub fn with_tool_calls(
        mut self,
        tool_calls: impl Into<SmallVec<[ToolCall; 2]>>,
    ) -> anyhow::Result<Self> {
        if self.role != MessageRole::Assistant {
            anyhow::bail!(
                "Tool calls can only be added to assistant messages, found {}",
                self.role
            );
        }
        self.tool_calls = tool_calls.into();
        Ok(self)
    }

    /// Returns whether this is an assistant message requesting tools.
    #[must_use]
    pub fn requests_tools(&self) -> bool {
        self.role == MessageRole::Assistant && !self.tool_calls.is_empty()
    }
}

/// The ordered message history exchanged with the model.
///
/// A conversation is owned by exactly one session; nothing here is shared.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    /// Unique identifier for this conversation.
    pub id: Uuid,

    /// Messages in chronological order.
    pub messages: Vec<Message>,

    /// When this conversation was created.
    pub created_at: DateTime<Utc>,

    /// Last time a message was added or the history was reset.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Creates an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the conversation as modified.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Appends a message after checking the ordering rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the message belongs to another conversation, is a
    /// misplaced or repeated system message, is a tool message that does not
    /// answer a pending invocation of the latest assistant message, or is any
    /// other message while invocations are still unanswered.
    pub fn add_message(&mut self, message: Message) -> anyhow::Result<()> {
        if message.conversation_id != self.id {
            anyhow::bail!(
                "Message conversation ID {} does not match conversation ID {}",
                message.conversation_id,
                self.id
            );
        }

        match message.role {
            MessageRole::System if !self.messages.is_empty() => {
                anyhow::bail!("System message must be the first message in a conversation");
            }
            MessageRole::Tool => {
                let call_id = message
                    .tool_call_id
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("Tool message is missing a tool_call_id"))?;
                if !self.pending_tool_calls().iter().any(|id| id == call_id) {
                    anyhow::bail!(
                        "Tool message answers '{call_id}', which is not a pending invocation of the latest assistant message"
                    );
                }
            }
            role => {
                let pending = self.pending_tool_calls();
                if !pending.is_empty() {
                    anyhow::bail!(
                        "Cannot add a {role} message while tool call(s) {} are unanswered",
                        pending.join(", ")
                    );
                }
            }
        }

        self.messages.push(message);
        self.touch();
        Ok(())
    }

    /// Invocation ids requested by the latest assistant message that have no
    /// tool result yet.
    ///
    /// Empty when anything other than tool results follows that assistant
    /// message.
    #[must_use]
    pub fn pending_tool_calls(&self) -> Vec<String> {
        let Some(idx) = self
            .messages
            .iter()
            .rposition(|m| m.role != MessageRole::Tool)
        else {
            return Vec::new();
        };
        let anchor = &self.messages[idx];
        if anchor.role != MessageRole::Assistant {
            return Vec::new();
        }

        let answered: Vec<&str> = self.messages[idx + 1..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();

        anchor
            .tool_calls
            .iter()
            .filter(|tc| !answered.contains(&tc.id.as_str()))
            .map(|tc| tc.id.clone())
            .collect()
    }

    /// Returns the messages in order.
    #[must_use]
    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages with the given role.
    #[must_use]
    pub fn count_role(&self, role: MessageRole) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    /// The most recent message, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Drops every message after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        if len < self.messages.len() {
            debug!(
                "Conversation {}: dropping {} message(s)",
                self.id,
                self.messages.len() - len
            );
            self.messages.truncate(len);
            self.touch();
        }
    }

    /// Removes everything except a leading system message.
    pub fn clear(&mut self) {
        let keep = usize::from(
            self.messages
                .first()
                .is_some_and(|m| m.role == MessageRole::System),
        );
        self.messages.truncate(keep);
        self.touch();
    }

    /// Creates a user message linked to this conversation.
    pub fn user_message(&self, content: impl Into<String>) -> Message {
        Message::user(self.id, content)
    }

    /// Creates an assistant message linked to this conversation.
    pub fn assistant_message(&self, content: impl Into<String>) -> Message {
        Message::assistant(self.id, content)
    }

    /// Creates a system message linked to this conversation.
    pub fn system_message(&self, content: impl Into<String>) -> Message {
        Message::system(self.id, content)
    }

    /// Creates a tool message linked to this conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if `tool_call_id` or `function_name` is empty.
    pub fn tool_message(
        &self,
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        function_name: impl Into<String>,
    ) -> anyhow::Result<Message> {
        Message::tool(self.id, content, tool_call_id.into(), function_name.into())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn conversation_with_tool_request(ids: &[&str]) -> Conversation {
        let mut conv = Conversation::new();
        conv.add_message(conv.system_message("sys")).unwrap();
        conv.add_message(conv.user_message("hi")).unwrap();
        let calls: Vec<ToolCall> = ids
            .iter()
            .map(|id| ToolCall::with_id(*id, "get_weather", "{}"))
            .collect();
        let assistant = conv.assistant_message("").with_tool_calls(calls).unwrap();
        conv.add_message(assistant).unwrap();
        conv
    }

    #[test]
    fn test_message_creation() {
        let conv_id = Uuid::new_v4();
        let msg = Message::user(conv_id, "Hello, world!");

        assert_eq!(msg.conversation_id, conv_id);
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Hello, world!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&MessageRole::Tool).unwrap(), "\"tool\"");
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
    }

    #[test]
    fn test_tool_calls_only_on_assistant() {
        let conv_id = Uuid::new_v4();
        let call = ToolCall::new("get_weather", "{}");

        let user = Message::user(conv_id, "What's the weather?");
        assert!(user.with_tool_calls(vec![call.clone()]).is_err());

        let assistant = Message::assistant(conv_id, "").with_tool_calls(vec![call]).unwrap();
        assert!(assistant.requests_tools());
    }

    #[test]
    fn test_tool_message_validation() {
        let conv_id = Uuid::new_v4();
        assert!(Message::tool(conv_id, "r", String::new(), "f".to_string()).is_err());
        assert!(Message::tool(conv_id, "r", "call_1".to_string(), String::new()).is_err());
        let msg = Message::tool(conv_id, "r", "call_1".to_string(), "f".to_string()).unwrap();
        assert_eq!(msg.name.as_deref(), Some("f"));
    }

    #[test]
    fn test_add_message_wrong_conversation() {
        let mut conv1 = Conversation::new();
        let conv2 = Conversation::new();
        assert!(conv1.add_message(conv2.user_message("Hello")).is_err());
        assert!(conv1.is_empty());
    }

    #[test]
    fn test_system_message_must_be_first_and_unique() {
        let mut conv = Conversation::new();
        conv.add_message(conv.system_message("one")).unwrap();
        assert!(conv.add_message(conv.system_message("two")).is_err());

        let mut late = Conversation::new();
        late.add_message(late.user_message("hi")).unwrap();
        assert!(late.add_message(late.system_message("sys")).is_err());
    }

    #[test]
    fn test_tool_message_must_answer_pending_call() {
        let mut conv = conversation_with_tool_request(&["call_a", "call_b"]);
        assert_eq!(conv.pending_tool_calls(), vec!["call_a", "call_b"]);

        let unknown = conv.tool_message("x", "call_z", "get_weather").unwrap();
        assert!(conv.add_message(unknown).is_err());

        let a = conv.tool_message("x", "call_a", "get_weather").unwrap();
        conv.add_message(a).unwrap();
        assert_eq!(conv.pending_tool_calls(), vec!["call_b"]);

        let repeat = conv.tool_message("x", "call_a", "get_weather").unwrap();
        assert!(conv.add_message(repeat).is_err());

        let b = conv.tool_message("x", "call_b", "get_weather").unwrap();
        conv.add_message(b).unwrap();
        assert!(conv.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_no_new_turn_while_calls_unanswered() {
        let mut conv = conversation_with_tool_request(&["call_a"]);

        assert!(conv.add_message(conv.user_message("never mind")).is_err());
        assert!(conv.add_message(conv.assistant_message("done")).is_err());
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.pending_tool_calls(), vec!["call_a"]);

        let answer = conv.tool_message("x", "call_a", "get_weather").unwrap();
        conv.add_message(answer).unwrap();
        conv.add_message(conv.user_message("and tomorrow?")).unwrap();
        assert!(conv.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_clear_keeps_system_message() {
        let mut conv = conversation_with_tool_request(&["call_a"]);
        conv.clear();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages[0].role, MessageRole::System);

        let mut no_system = Conversation::new();
        no_system.add_message(no_system.user_message("hi")).unwrap();
        no_system.clear();
        assert!(no_system.is_empty());
    }

    #[test]
    fn test_truncate_and_counts() {
        let mut conv = conversation_with_tool_request(&["call_a"]);
        assert_eq!(conv.count_role(MessageRole::Assistant), 1);
        conv.truncate(2);
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.count_role(MessageRole::Assistant), 0);
        assert_eq!(conv.last().unwrap().role, MessageRole::User);
    }

    #[test]
    fn test_add_message_updates_timestamp() {
        let mut conv = Conversation::new();
        let created = conv.updated_at;
        conv.add_message(conv.user_message("Hello")).unwrap();
        assert!(conv.updated_at >= created);
    }
}
