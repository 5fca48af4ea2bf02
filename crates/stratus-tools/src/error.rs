//! Dispatch errors.

use std::time::Duration;

use stratus_common::ParamType;
use thiserror::Error;

/// Why a tool could not be registered or a call could not produce a result.
///
/// None of these abort an agent run: the registry turns them into an
/// `{"error": ...}` payload that the model gets to see.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Unknown tool: '{0}'")]
    UnknownTool(String),

    #[error("Invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Missing required parameter '{parameter}' for '{tool}'")]
    MissingParameter { tool: String, parameter: String },

    #[error("Unexpected parameter '{parameter}' for '{tool}'")]
    UnexpectedParameter { tool: String, parameter: String },

    #[error("Parameter '{parameter}' for '{tool}' must be {expected}, got {found}")]
    TypeMismatch {
        tool: String,
        parameter: String,
        expected: ParamType,
        found: &'static str,
    },

    #[error("Tool '{tool}' timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("Tool '{tool}' failed: {source}")]
    ExecutionFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
}
