//! Scripted doubles shared by the agent and session tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use stratus_client::LLMClient;
use stratus_common::chat::Message;
use stratus_common::client::{ChatRequest, ChatResponse, Config, FinishReason, Usage};
use stratus_common::tools::{Function, Parameters, Property, Tool, ToolCall};
use stratus_tools::ToolImplementation;

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Tools(Vec<ToolCall>),
    Fail(String),
    /// Never completes; exercises timeouts and cancellation.
    Hang,
}

#[derive(Debug, Clone, Default)]
pub struct CallCount(Arc<AtomicUsize>);

impl CallCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ScriptedClient {
    config: Config,
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    calls: CallCount,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            config: Config::new("scripted", "scripted-model")
                .with_temperature(0.7)
                .with_max_tokens(2000),
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: CallCount::default(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers every call with the same reply.
    pub fn repeating(reply: Reply) -> Self {
        let mut client = Self::new(Vec::new());
        client.fallback = Some(reply);
        client
    }

    pub fn call_count(&self) -> CallCount {
        self.calls.clone()
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<ChatRequest>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedClient {
    fn config(&self) -> &Config {
        &self.config
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;

        let conversation_id = request.messages[0].conversation_id;
        let (message, finish_reason) = match reply {
            Reply::Text(text) => (
                Message::assistant(conversation_id, text),
                FinishReason::Stop,
            ),
            Reply::Tools(calls) => (
                Message::assistant(conversation_id, "").with_tool_calls(calls)?,
                FinishReason::ToolCalls,
            ),
            Reply::Fail(reason) => {
                return Err(stratus_client::ClientError::AuthenticationError(reason).into());
            }
            Reply::Hang => return std::future::pending().await,
        };

        Ok(ChatResponse {
            message,
            model: "scripted-model".to_string(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            finish_reason: Some(finish_reason),
            created_at: chrono::Utc::now(),
            response_id: None,
        })
    }
}

/// A `get_weather`-shaped tool that answers without touching the network.
pub struct EchoTool {
    name: String,
    executions: AtomicUsize,
}

impl EchoTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolImplementation for EchoTool {
    fn get_definition(&self) -> Tool {
        Tool::builder()
            .function(Function {
                name: self.name.clone(),
                description: "Weather lookup".to_string(),
                parameters: Parameters::new()
                    .required("lat", Property::number("Latitude"))
                    .required("lon", Property::number("Longitude")),
            })
            .build()
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "current_weather": {"temperature": 21.0, "wind_speed": 4.0, "time": "2024-05-01T12:00"},
            "requested": args,
        }))
    }
}

pub fn weather_call(id: &str) -> ToolCall {
    ToolCall::with_id(id, "get_weather", r#"{"lat": 27.7172, "lon": 85.324}"#)
}
