//! # stratus-common
//!
//! Shared types for the stratus tool-augmented query agent.
//!
//! - [`chat`]: messages and the ordered conversation history
//! - [`tools`]: tool definitions, parameter schemas, invocations and results
//! - [`client`]: completion requests, responses and client configuration
//!
//! ## Example
//!
//! ```
//! use stratus_common::{Conversation, Function, Parameters, Property, Tool, ToolCall};
//!
//! let mut conv = Conversation::new();
//! conv.add_message(conv.system_message("You are a helpful assistant.")).unwrap();
//! conv.add_message(conv.user_message("Weather in Paris?")).unwrap();
//!
//! let tool = Tool::builder()
//!     .function(Function {
//!         name: "get_weather".to_string(),
//!         description: "Get current weather for a coordinate".to_string(),
//!         parameters: Parameters::new()
//!             .required("lat", Property::number("Latitude"))
//!             .required("lon", Property::number("Longitude")),
//!     })
//!     .build();
//! assert_eq!(tool.name(), "get_weather");
//!
//! let call = ToolCall::new("get_weather", r#"{"lat":48.85,"lon":2.35}"#);
//! let assistant = conv.assistant_message("").with_tool_calls(vec![call]).unwrap();
//! conv.add_message(assistant).unwrap();
//! assert_eq!(conv.pending_tool_calls().len(), 1);
//! ```

pub mod chat;
pub mod client;
pub mod tools;

pub use chat::{Conversation, Message, MessageRole};
pub use client::{ChatRequest, ChatResponse, Config, FinishReason, RetryConfig, ToolChoice, Usage};
pub use tools::{
    Function, FunctionCall, ParamType, Parameters, Property, Tool, ToolCall, ToolResult,
    json_type_name,
};
