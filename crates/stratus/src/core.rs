//! The agent loop: a bounded state machine alternating model calls and tool
//! dispatch until the model answers without requesting tools.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use tokio_util::sync::CancellationToken;

use stratus_client::{ClientError, LLMClient};
use stratus_common::chat::{Conversation, Message};
use stratus_common::client::{ChatRequest, ToolChoice, Usage};
use stratus_common::tools::ToolCall;
use stratus_tools::ToolRegistry;

use crate::error::AgentError;
use crate::events::{AgentEvent, EventCallback};

pub const DEFAULT_MAX_ROUNDS: u32 = 10;
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a run currently stands.
#[derive(Debug)]
pub enum AgentState {
    /// Waiting on the model's next reply.
    AwaitingModel,
    /// The model asked for these calls; they run in order.
    AwaitingTool(Vec<ToolCall>),
    /// The model answered without requesting tools.
    Done(String),
    Failed(AgentError),
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    /// Content of the final assistant message.
    pub answer: String,
    /// Completed tool rounds.
    pub rounds: u32,
    /// Token usage summed over every model call.
    pub usage: Usage,
}

#[derive(Debug, Default)]
struct RunProgress {
    rounds: u32,
    usage: Usage,
}

pub struct AgentLoop<C: LLMClient> {
    pub client: C,
    pub registry: ToolRegistry,
    max_rounds: u32,
    model_timeout: Duration,
    tool_choice: ToolChoice,
    event_callback: Option<EventCallback>,
}

impl<C: LLMClient> std::fmt::Debug for AgentLoop<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("registry", &self.registry)
            .field("max_rounds", &self.max_rounds)
            .field("model_timeout", &self.model_timeout)
            .field("tool_choice", &self.tool_choice)
            .finish_non_exhaustive()
    }
}

impl<C: LLMClient> AgentLoop<C> {
    pub fn new(client: C, registry: ToolRegistry) -> Self {
        Self {
            client,
            registry,
            max_rounds: DEFAULT_MAX_ROUNDS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            tool_choice: ToolChoice::Auto,
            event_callback: None,
        }
    }

    /// Sets how many tool rounds a single run may complete.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] if `max_rounds` is zero.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Result<Self, AgentError> {
        if max_rounds == 0 {
            return Err(AgentError::Configuration(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        self.max_rounds = max_rounds;
        Ok(self)
    }

    #[must_use]
    pub const fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    #[must_use]
    pub fn with_event_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub const fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(callback) = &self.event_callback {
            callback(&event);
        }
    }

    /// Runs the loop to completion on `conversation`, appending every
    /// assistant and tool message to it.
    ///
    /// # Errors
    ///
    /// See [`run_with_cancellation`](Self::run_with_cancellation).
    pub async fn run(&self, conversation: &mut Conversation) -> Result<AgentOutcome, AgentError> {
        self.run_with_cancellation(conversation, &CancellationToken::new())
            .await
    }

    /// Runs the loop, aborting as soon as `cancel` fires.
    ///
    /// The token is checked before every model call and every dispatch, and
    /// an in-flight call is dropped when it fires.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Provider`] if a model call fails or times out
    /// - [`AgentError::RoundLimitExceeded`] if the model requests tools after
    ///   `max_rounds` completed rounds
    /// - [`AgentError::Cancelled`] if `cancel` fires
    /// - [`AgentError::Conversation`] if a reply cannot be appended
    pub async fn run_with_cancellation(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        let start_time = Instant::now();
        let mut progress = RunProgress::default();
        let mut state = AgentState::AwaitingModel;

        loop {
            state = match state {
                AgentState::AwaitingModel => {
                    self.await_model(conversation, &mut progress, cancel).await
                }
                AgentState::AwaitingTool(calls) => {
                    self.dispatch_tools(conversation, &calls, &mut progress, cancel)
                        .await
                }
                AgentState::Done(answer) => {
                    info!(
                        "Run finished after {} tool round(s) ({:.2?})",
                        progress.rounds,
                        start_time.elapsed()
                    );
                    return Ok(AgentOutcome {
                        answer,
                        rounds: progress.rounds,
                        usage: progress.usage,
                    });
                }
                AgentState::Failed(e) => {
                    error!("Run failed after {} tool round(s): {e}", progress.rounds);
                    return Err(e);
                }
            };
        }
    }

    async fn await_model(
        &self,
        conversation: &mut Conversation,
        progress: &mut RunProgress,
        cancel: &CancellationToken,
    ) -> AgentState {
        if cancel.is_cancelled() {
            return AgentState::Failed(AgentError::Cancelled);
        }

        let messages: Arc<[Message]> = Arc::from(conversation.get_messages());
        let request = ChatRequest::from((self.client.config(), messages))
            .with_tools(self.registry.get_all_definitions())
            .with_tool_choice(self.tool_choice.clone());

        info!(
            "Model turn ({}/{} tool rounds completed)",
            progress.rounds, self.max_rounds
        );
        debug!("Chat request: {request}");
        self.emit(AgentEvent::ModelTurn {
            round: progress.rounds,
        });

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return AgentState::Failed(AgentError::Cancelled),
            result = tokio::time::timeout(self.model_timeout, self.client.chat(&request)) => result,
        };

        let response = match response {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return AgentState::Failed(AgentError::Provider(e)),
            Err(_) => {
                return AgentState::Failed(AgentError::Provider(ClientError::TimeoutError.into()));
            }
        };
        debug!("Chat response: {response}");

        if let Some(usage) = &response.usage {
            progress.usage.accumulate(usage);
            self.emit(AgentEvent::Usage(usage.clone()));
        }

        let mut message = response.message;
        message.conversation_id = conversation.id;

        if !message.requests_tools() {
            let answer = message.content.clone();
            return match conversation.add_message(message) {
                Ok(()) => AgentState::Done(answer),
                Err(e) => AgentState::Failed(AgentError::Conversation(e)),
            };
        }

        if progress.rounds >= self.max_rounds {
            return AgentState::Failed(AgentError::RoundLimitExceeded {
                rounds: progress.rounds,
            });
        }

        if let Err(e) = check_tool_calls(&message.tool_calls) {
            return AgentState::Failed(AgentError::Provider(e.into()));
        }

        let calls = message.tool_calls.to_vec();
        match conversation.add_message(message) {
            Ok(()) => AgentState::AwaitingTool(calls),
            Err(e) => AgentState::Failed(AgentError::Conversation(e)),
        }
    }

    async fn dispatch_tools(
        &self,
        conversation: &mut Conversation,
        calls: &[ToolCall],
        progress: &mut RunProgress,
        cancel: &CancellationToken,
    ) -> AgentState {
        for call in calls {
            if cancel.is_cancelled() {
                return AgentState::Failed(AgentError::Cancelled);
            }

            debug!(
                "Dispatching '{}' ({}) with {}",
                call.function.name,
                call.id,
                call.function.arguments_json()
            );
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return AgentState::Failed(AgentError::Cancelled),
                result = self.registry.dispatch_to_result(call) => result,
            };

            self.emit(AgentEvent::ToolDispatched {
                name: result.name.clone(),
                call_id: result.tool_call_id.clone(),
                success: !result.is_error,
                result: result.content(),
            });

            let appended = result
                .into_message(conversation.id)
                .and_then(|message| conversation.add_message(message));
            if let Err(e) = appended {
                return AgentState::Failed(AgentError::Conversation(e));
            }
        }

        progress.rounds += 1;
        debug!("Completed tool round {}", progress.rounds);
        AgentState::AwaitingModel
    }
}

/// Rejects tool calls that could not be answered with a well-formed tool message.
fn check_tool_calls(calls: &[ToolCall]) -> Result<(), ClientError> {
    let mut seen = HashSet::new();
    for call in calls {
        if call.id.is_empty() || call.function.name.is_empty() {
            return Err(ClientError::InvalidResponse(
                "tool call without an id or function name".to_string(),
            ));
        }
        if !seen.insert(call.id.as_str()) {
            return Err(ClientError::InvalidResponse(format!(
                "duplicate tool call id '{}'",
                call.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::prompt::PromptAssembler;
    use crate::testing::{EchoTool, Reply, ScriptedClient, weather_call};
    use std::sync::Mutex;
    use stratus_common::chat::MessageRole;
    use stratus_tools::WeatherTool;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry_with_echo() -> (ToolRegistry, Arc<EchoTool>) {
        let registry = ToolRegistry::new();
        let tool = Arc::new(EchoTool::new("get_weather"));
        registry.register(tool.clone()).unwrap();
        (registry, tool)
    }

    fn roles(conversation: &Conversation) -> Vec<MessageRole> {
        conversation.get_messages().iter().map(|m| m.role).collect()
    }

    fn start(query: &str) -> Conversation {
        PromptAssembler::default().assemble(query).unwrap()
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let client = ScriptedClient::new(vec![
            Reply::Tools(vec![weather_call("call_1")]),
            Reply::Text("It is 21°C and clear in Kathmandu.".into()),
        ]);
        let calls = client.call_count();
        let (registry, tool) = registry_with_echo();
        let agent = AgentLoop::new(client, registry);

        let mut conversation = start("What's the weather in Kathmandu?");
        let outcome = agent.run(&mut conversation).await.unwrap();

        assert_eq!(outcome.answer, "It is 21°C and clear in Kathmandu.");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.usage.total_tokens, 30);
        assert_eq!(calls.get(), 2);
        assert_eq!(tool.executions(), 1);
        assert_eq!(
            roles(&conversation),
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant,
            ]
        );
        let tool_message = &conversation.get_messages()[3];
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_message.name.as_deref(), Some("get_weather"));
    }

    #[tokio::test]
    async fn test_request_carries_tools_and_auto_choice() {
        let client = ScriptedClient::new(vec![Reply::Text("hi".into())]);
        let requests = client.requests();
        let (registry, _) = registry_with_echo();
        let agent = AgentLoop::new(client, registry);

        let mut conversation = start("hello");
        agent.run(&mut conversation).await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let tools = requests[0].tools.as_ref().unwrap();
        assert_eq!(tools[0].function.name, "get_weather");
        assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
        assert_eq!(requests[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_answer_without_tools() {
        let client = ScriptedClient::new(vec![Reply::Text("Hello!".into())]);
        let (registry, tool) = registry_with_echo();
        let agent = AgentLoop::new(client, registry);

        let mut conversation = start("hi");
        let outcome = agent.run(&mut conversation).await.unwrap();

        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(outcome.rounds, 0);
        assert_eq!(tool.executions(), 0);
        assert_eq!(conversation.len(), 3);
    }

    #[tokio::test]
    async fn test_always_tool_model_hits_round_limit() {
        let client = ScriptedClient::repeating(Reply::Tools(vec![weather_call("call_x")]));
        let calls = client.call_count();
        let (registry, tool) = registry_with_echo();
        let agent = AgentLoop::new(client, registry).with_max_rounds(3).unwrap();

        let mut conversation = start("loop forever");
        let err = agent.run(&mut conversation).await.unwrap_err();

        assert!(matches!(err, AgentError::RoundLimitExceeded { rounds: 3 }));
        assert_eq!(tool.executions(), 3);
        assert_eq!(calls.get(), 4);
        // The refused request is never appended, so nothing is left unanswered
        assert!(conversation.pending_tool_calls().is_empty());
        assert_eq!(conversation.count_role(MessageRole::Tool), 3);
    }

    #[tokio::test]
    async fn test_default_round_limit() {
        let client = ScriptedClient::repeating(Reply::Tools(vec![weather_call("call_x")]));
        let (registry, tool) = registry_with_echo();
        let agent = AgentLoop::new(client, registry);

        let mut conversation = start("loop forever");
        let err = agent.run(&mut conversation).await.unwrap_err();

        assert!(matches!(err, AgentError::RoundLimitExceeded { rounds: DEFAULT_MAX_ROUNDS }));
        assert_eq!(tool.executions(), usize::try_from(DEFAULT_MAX_ROUNDS).unwrap());
    }

    #[test]
    fn test_zero_max_rounds_rejected() {
        let client = ScriptedClient::new(vec![]);
        let err = AgentLoop::new(client, ToolRegistry::new())
            .with_max_rounds(0)
            .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool_adds_single_error_result() {
        let client = ScriptedClient::new(vec![
            Reply::Tools(vec![ToolCall::with_id("call_s", "get_stock_price", r#"{"ticker":"NVDA"}"#)]),
            Reply::Text("I can't look up stock prices.".into()),
        ]);
        let (registry, tool) = registry_with_echo();
        let agent = AgentLoop::new(client, registry);

        let mut conversation = start("NVDA price?");
        let outcome = agent.run(&mut conversation).await.unwrap();

        assert_eq!(outcome.answer, "I can't look up stock prices.");
        assert_eq!(conversation.count_role(MessageRole::Tool), 1);
        assert_eq!(tool.executions(), 0);
        let tool_message = &conversation.get_messages()[3];
        let payload: serde_json::Value = serde_json::from_str(&tool_message.content).unwrap();
        assert_eq!(payload["error"], "Unknown tool: 'get_stock_price'");
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_fed_back() {
        let client = ScriptedClient::new(vec![
            Reply::Tools(vec![ToolCall::with_id("call_1", "get_weather", r#"{"lat":"27.7","lon":85.3}"#)]),
            Reply::Text("Sorry.".into()),
        ]);
        let (registry, tool) = registry_with_echo();
        let agent = AgentLoop::new(client, registry);

        let mut conversation = start("weather?");
        agent.run(&mut conversation).await.unwrap();

        assert_eq!(tool.executions(), 0);
        assert!(conversation.get_messages()[3].content.contains("must be number"));
    }

    #[tokio::test]
    async fn test_multiple_calls_in_one_round_keep_order() {
        let client = ScriptedClient::new(vec![
            Reply::Tools(vec![weather_call("call_a"), weather_call("call_b")]),
            Reply::Text("Both looked up.".into()),
        ]);
        let (registry, tool) = registry_with_echo();
        let agent = AgentLoop::new(client, registry);

        let mut conversation = start("Compare two cities");
        let outcome = agent.run(&mut conversation).await.unwrap();

        assert_eq!(outcome.rounds, 1);
        assert_eq!(tool.executions(), 2);
        let ids: Vec<_> = conversation
            .get_messages()
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["call_a", "call_b"]);
    }

    #[tokio::test]
    async fn test_no_data_weather_is_a_normal_tool_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "latitude": 0.0,
                "longitude": 0.0,
                "hourly": {"time": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(WeatherTool::new().with_base_url(server.uri())))
            .unwrap();

        let client = ScriptedClient::new(vec![
            Reply::Tools(vec![weather_call("call_w")]),
            Reply::Text("No weather data is available right now.".into()),
        ]);
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let sink = dispatched.clone();
        let agent = AgentLoop::new(client, registry).with_event_callback(move |event| {
            if let AgentEvent::ToolDispatched { success, .. } = event {
                sink.lock().unwrap().push(*success);
            }
        });

        let mut conversation = start("Weather at null island?");
        let outcome = agent.run(&mut conversation).await.unwrap();

        assert_eq!(outcome.answer, "No weather data is available right now.");
        assert_eq!(*dispatched.lock().unwrap(), vec![true]);
        let payload: serde_json::Value =
            serde_json::from_str(&conversation.get_messages()[3].content).unwrap();
        assert_eq!(payload["status"], "no_data");
    }

    #[tokio::test]
    async fn test_provider_error_fails_run() {
        let client = ScriptedClient::new(vec![Reply::Fail("Invalid API Key".into())]);
        let agent = AgentLoop::new(client, ToolRegistry::new());

        let mut conversation = start("hi");
        let err = agent.run(&mut conversation).await.unwrap_err();

        assert!(matches!(err, AgentError::Provider(_)));
        assert!(err.to_string().contains("Invalid API Key"));
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_model_timeout_is_provider_error() {
        let client = ScriptedClient::new(vec![Reply::Hang]);
        let agent = AgentLoop::new(client, ToolRegistry::new())
            .with_model_timeout(Duration::from_millis(50));

        let mut conversation = start("hi");
        let err = agent.run(&mut conversation).await.unwrap_err();

        assert!(matches!(
            &err,
            AgentError::Provider(source)
                if matches!(source.downcast_ref::<ClientError>(), Some(ClientError::TimeoutError))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let client = ScriptedClient::new(vec![Reply::Text("unused".into())]);
        let calls = client.call_count();
        let agent = AgentLoop::new(client, ToolRegistry::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut conversation = start("hi");
        let err = agent
            .run_with_cancellation(&mut conversation, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_cancel_drops_in_flight_model_call() {
        let client = ScriptedClient::new(vec![Reply::Hang]);
        let agent = AgentLoop::new(client, ToolRegistry::new());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut conversation = start("hi");
        let err = agent
            .run_with_cancellation(&mut conversation, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_malformed_tool_calls_are_provider_errors() {
        let client = ScriptedClient::new(vec![Reply::Tools(vec![
            weather_call("dup"),
            weather_call("dup"),
        ])]);
        let (registry, tool) = registry_with_echo();
        let agent = AgentLoop::new(client, registry);

        let mut conversation = start("hi");
        let err = agent.run(&mut conversation).await.unwrap_err();

        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(tool.executions(), 0);
    }

    #[tokio::test]
    async fn test_events_trace_the_run() {
        let client = ScriptedClient::new(vec![
            Reply::Tools(vec![weather_call("call_1")]),
            Reply::Text("done".into()),
        ]);
        let (registry, _) = registry_with_echo();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let agent = AgentLoop::new(client, registry)
            .with_event_callback(move |event| sink.lock().unwrap().push(event.clone()));

        let mut conversation = start("hi");
        agent.run(&mut conversation).await.unwrap();

        let events = events.lock().unwrap();
        let turns: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ModelTurn { round } => Some(*round),
                _ => None,
            })
            .collect();
        assert_eq!(turns, vec![0, 1]);
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolDispatched { name, success: true, .. } if name == "get_weather"
        )));
        assert_eq!(
            events.iter().filter(|e| matches!(e, AgentEvent::Usage(_))).count(),
            2
        );
    }
}
