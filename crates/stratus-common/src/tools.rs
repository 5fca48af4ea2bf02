//! Tool definitions, invocation requests and results exchanged with an LLM.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::chat::Message;

/// The JSON type a tool parameter must have.
///
/// Validation is exact: a JSON string holding digits is not a `Number`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Any JSON string.
    String,
    /// Any JSON number, integral or not.
    Number,
    /// A JSON number without a fractional part.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
}

impl ParamType {
    /// Returns whether `value` has this type.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Names the JSON type of an arbitrary value, for error messages.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Describes a single property in a function parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Property {
    /// The JSON type of the property.
    #[serde(rename = "type")]
    pub prop_type: ParamType,
    /// Human-readable description of this property.
    pub description: String,
}

impl Property {
    /// Creates a property of the given type.
    #[must_use]
    pub fn new(prop_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            prop_type,
            description: description.into(),
        }
    }

    /// Creates a string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParamType::String, description)
    }

    /// Creates a number property.
    #[must_use]
    pub fn number(description: impl Into<String>) -> Self {
        Self::new(ParamType::Number, description)
    }

    /// Creates an integer property.
    #[must_use]
    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(ParamType::Integer, description)
    }

    /// Creates a boolean property.
    #[must_use]
    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(ParamType::Boolean, description)
    }
}

/// Defines the parameter schema for a function using JSON Schema conventions.
///
/// `BTreeMap` keeps the serialized schema stable between requests.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Parameters {
    /// The JSON type, always "object".
    #[serde(rename = "type")]
    pub param_type: String,
    /// Map of parameter names to their property definitions.
    pub properties: BTreeMap<String, Property>,
    /// List of required parameter names.
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self::new()
    }
}

impl Parameters {
    /// Creates an empty object schema.
    #[must_use]
    pub fn new() -> Self {
        Self {
            param_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Adds a required parameter.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, property: Property) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, property);
        self
    }

    /// Adds an optional parameter.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Returns whether `name` is listed as required.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// Describes a function that can be called by an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Function {
    /// The name of the function, unique within a registry.
    pub name: String,
    /// What the function does; the model reads this to decide applicability.
    pub description: String,
    /// Schema of the function's parameters.
    pub parameters: Parameters,
}

/// Represents a tool available to the LLM, wrapping a function.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Eq, PartialEq)]
pub struct Tool {
    /// The type of tool (defaults to "function").
    #[serde(rename = "type")]
    #[builder(default = "function".to_string())]
    pub r#type: String,
    /// The function definition.
    pub function: Function,
}

impl Tool {
    /// Convenience accessor for the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// An invocation of a function with arguments, as emitted by the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// The name of the function being called.
    pub name: String,
    /// The arguments as a single JSON string, exactly as the model produced it.
    pub arguments: String,
}

impl FunctionCall {
    /// Returns the arguments as a JSON string slice.
    ///
    /// Returns `"{}"` if the arguments string is empty.
    #[must_use]
    pub fn arguments_json(&self) -> &str {
        if self.arguments.trim().is_empty() {
            "{}"
        } else {
            &self.arguments
        }
    }
}

/// A complete tool invocation request, including its identifier.
///
/// Arguments are passed through as-is from the API response and validated
/// only at dispatch time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// The function being invoked.
    pub function: FunctionCall,
    /// The type of call, typically "function".
    pub call_type: String,
}

impl ToolCall {
    /// Creates a new tool call with a generated ID.
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::with_id(format!("call_{}", Uuid::new_v4().simple()), name, arguments)
    }

    /// Creates a tool call with an explicit ID.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            call_type: "function".to_string(),
        }
    }
}

/// Outcome of a dispatched tool call, ready to go back into the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// The invocation this result answers.
    pub tool_call_id: String,
    /// Name of the tool that was requested.
    pub name: String,
    /// Structured result, or `{"error": ...}` when `is_error` is set.
    pub payload: Value,
    /// Whether dispatch or execution failed.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn success(call: &ToolCall, payload: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.function.name.clone(),
            payload,
            is_error: false,
        }
    }

    /// A failed result carrying a human-readable reason.
    pub fn error(call: &ToolCall, reason: impl fmt::Display) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.function.name.clone(),
            payload: serde_json::json!({ "error": reason.to_string() }),
            is_error: true,
        }
    }

    /// Renders the payload as the text content of a tool message.
    ///
    /// String payloads are passed through unquoted.
    #[must_use]
    pub fn content(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Converts this result into a `tool` message for the given conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the call id or tool name is empty.
    pub fn into_message(self, conversation_id: Uuid) -> anyhow::Result<Message> {
        let content = self.content();
        Message::tool(conversation_id, content, self.tool_call_id, self.name)
    }
}
