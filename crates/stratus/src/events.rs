//! Progress notifications emitted by the agent loop.
//!
//! Events are fire-and-forget: the callback cannot influence the run. The CLI
//! uses them for its `--verbose` trace.

use stratus_common::client::Usage;

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AgentEvent {
    /// A model call is about to be made. `round` counts completed tool rounds.
    ModelTurn { round: u32 },

    /// A tool call went through the registry.
    ToolDispatched {
        name: String,
        call_id: String,
        success: bool,
        result: String,
    },

    /// Token usage reported for one model call.
    Usage(Usage),
}

pub type EventCallback = Box<dyn Fn(&AgentEvent) + Send + Sync>;
