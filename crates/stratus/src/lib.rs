//! # stratus
//!
//! A tool-augmented query agent. A user query is wrapped in a system
//! instruction, sent to a chat-completions model together with the registered
//! tool definitions, and every tool call the model makes is dispatched and fed
//! back until the model answers in plain text.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratus::{
//!     AgentLoop, Config, MemoryMode, OpenAIClient, PromptAssembler, Session, ToolRegistry,
//!     WeatherTool,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::new("groq", "llama3-70b-8192").with_api_key("gsk-...");
//! let client = OpenAIClient::new(config)?;
//!
//! let registry = ToolRegistry::new();
//! registry.register(Arc::new(WeatherTool::new()))?;
//!
//! let agent = AgentLoop::new(client, registry).with_max_rounds(5)?;
//! let mut session = Session::new(agent, PromptAssembler::default(), MemoryMode::Buffered);
//!
//! let answer = session.run_query("What's the weather like in Kathmandu?").await;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Pieces
//!
//! - [`PromptAssembler`]: turns a query into a `[system, user]` conversation
//! - [`ToolRegistry`]: name-keyed tools, argument validation and dispatch
//! - [`AgentLoop`]: the bounded model/tool state machine
//! - [`Session`]: one user's conversation memory on top of the loop

pub mod core;
pub mod error;
pub mod events;
pub mod prompt;
pub mod session;

#[cfg(test)]
mod testing;

pub use stratus_client::*;
pub use stratus_common::*;
pub use stratus_tools::*;

pub use core::{AgentLoop, AgentOutcome, AgentState, DEFAULT_MAX_ROUNDS, DEFAULT_MODEL_TIMEOUT};
pub use error::AgentError;
pub use events::{AgentEvent, EventCallback};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, PromptAssembler};
pub use session::{MemoryMode, Session, SessionStats};
