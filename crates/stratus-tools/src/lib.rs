//! # stratus-tools
//!
//! Tool registry and dispatcher for the stratus agent.
//!
//! - [`ToolImplementation`]: trait every tool implements
//! - [`ToolRegistry`]: thread-safe name -> tool map with schema-validated dispatch
//! - [`weather::WeatherTool`]: current weather and a 5-hour forecast from Open-Meteo
//!
//! ## Example
//!
//! ```rust
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//! use stratus_common::{Function, Parameters, Property, Tool, ToolCall};
//! use stratus_tools::{ToolImplementation, ToolRegistry};
//!
//! struct GreetingTool;
//!
//! #[async_trait]
//! impl ToolImplementation for GreetingTool {
//!     fn get_definition(&self) -> Tool {
//!         Tool::builder()
//!             .function(Function {
//!                 name: "greet".to_string(),
//!                 description: "Greet a person by name".to_string(),
//!                 parameters: Parameters::new()
//!                     .required("name", Property::string("The person's name")),
//!             })
//!             .build()
//!     }
//!
//!     async fn execute(&self, args: &Value) -> Result<Value> {
//!         let name = args["name"].as_str().unwrap_or("stranger");
//!         Ok(json!(format!("Hello, {name}!")))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let registry = ToolRegistry::new();
//! registry.register(Arc::new(GreetingTool))?;
//!
//! let call = ToolCall::new("greet", r#"{"name": "Asha"}"#);
//! let result = registry.dispatch_to_result(&call).await;
//! assert!(!result.is_error);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! [`ToolRegistry`] is a cheap `Clone` over a shared `DashMap`, so it can be
//! handed to several sessions and dispatched from concurrently.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use serde_json::Value;

use stratus_common::json_type_name;
use stratus_common::tools::{FunctionCall, Parameters, Tool, ToolCall, ToolResult};

pub mod error;
pub mod weather;

pub use error::ToolError;
pub use weather::WeatherTool;

/// Default bound on a single tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ToolImplementation: Send + Sync {
    /// The definition advertised to the model.
    fn get_definition(&self) -> Tool;

    /// Runs the tool with arguments that already passed schema validation.
    ///
    /// # Errors
    ///
    /// Any error is reported to the model as an execution failure.
    async fn execute(&self, args: &Value) -> Result<Value>;

    /// Upper bound on one execution.
    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }
}

/// Registered tools, keyed by function name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<dyn ToolImplementation>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
        }
    }

    /// Adds a tool under its definition's name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is taken.
    pub fn register(&self, tool: Arc<dyn ToolImplementation>) -> Result<(), ToolError> {
        let name = tool.get_definition().function.name;
        match self.tools.entry(name) {
            Entry::Occupied(entry) => Err(ToolError::DuplicateTool(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!("Registered tool '{}'", entry.key());
                entry.insert(tool);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolImplementation>> {
        self.tools.get(name).map(|r| r.value().clone())
    }

    /// Definitions of every registered tool, sorted by name.
    #[must_use]
    pub fn get_all_definitions(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.iter().map(|t| t.get_definition()).collect();
        tools.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        tools
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up, validates and runs one tool call.
    ///
    /// # Errors
    ///
    /// Returns the first failure in order: unknown tool, unparseable or
    /// non-object arguments, schema violation, timeout, execution error.
    pub async fn dispatch(&self, tool_call: &ToolCall) -> Result<Value, ToolError> {
        let function = &tool_call.function;

        // Clone the Arc out so no map guard is held across the await
        let tool = self
            .get(&function.name)
            .ok_or_else(|| ToolError::UnknownTool(function.name.clone()))?;

        let args = parse_arguments(function)?;
        validate_arguments(
            &function.name,
            &tool.get_definition().function.parameters,
            &args,
        )?;

        let timeout = tool.timeout();
        debug!("Executing tool '{}' ({})", function.name, tool_call.id);
        match tokio::time::timeout(timeout, tool.execute(&args)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(ToolError::ExecutionFailed {
                tool: function.name.clone(),
                source,
            }),
            Err(_) => Err(ToolError::Timeout {
                tool: function.name.clone(),
                timeout,
            }),
        }
    }

    /// Like [`dispatch`](Self::dispatch), but folds any failure into an
    /// `{"error": ...}` result so it can be fed back to the model.
    pub async fn dispatch_to_result(&self, tool_call: &ToolCall) -> ToolResult {
        match self.dispatch(tool_call).await {
            Ok(payload) => ToolResult::success(tool_call, payload),
            Err(e) => {
                warn!("Tool call {} failed: {e}", tool_call.id);
                ToolResult::error(tool_call, e)
            }
        }
    }
}

/// Parses the raw argument string; an empty string means no arguments.
fn parse_arguments(function: &FunctionCall) -> Result<Value, ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        tool: function.name.clone(),
        reason,
    };

    let value: Value = serde_json::from_str(function.arguments_json())
        .map_err(|e| invalid(format!("not valid JSON: {e}")))?;

    if !value.is_object() {
        return Err(invalid(format!(
            "expected a JSON object, got {}",
            json_type_name(&value)
        )));
    }
    Ok(value)
}

/// Checks arguments against the declared parameters without coercion.
///
/// A `null` for an optional parameter counts as absent.
fn validate_arguments(tool: &str, schema: &Parameters, args: &Value) -> Result<(), ToolError> {
    let Some(args) = args.as_object() else {
        return Err(ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    };

    for name in &schema.required {
        if args.get(name).is_none_or(Value::is_null) {
            return Err(ToolError::MissingParameter {
                tool: tool.to_string(),
                parameter: name.clone(),
            });
        }
    }

    for name in args.keys() {
        if !schema.properties.contains_key(name) {
            return Err(ToolError::UnexpectedParameter {
                tool: tool.to_string(),
                parameter: name.clone(),
            });
        }
    }

    for (name, value) in args {
        if value.is_null() {
            continue;
        }
        if let Some(property) = schema.properties.get(name)
            && !property.prop_type.matches(value)
        {
            return Err(ToolError::TypeMismatch {
                tool: tool.to_string(),
                parameter: name.clone(),
                expected: property.prop_type,
                found: json_type_name(value),
            });
        }
    }

    Ok(())
}
