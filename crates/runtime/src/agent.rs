//! Agent definition and run loop.

use crate::error::{Error, Result};
use crate::model::{Backend, Message, ModelRequest, ToolResult};
use crate::tools::ToolHost;
use tracing::{debug, warn};

/// Maximum model calls per user turn. Reaching the cap is an error, not a
/// silent truncation.
pub const MAX_TURNS: usize = 8;

/// Declarative description of an agent.
///
/// Built once at startup and never mutated: an identity, a free-text
/// behavioral instruction, an opaque model identifier, and the remote tool
/// sources the agent may call. `tool_sources` is non-empty exactly when the
/// agent is expected to act beyond text generation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    pub instruction: String,
    pub model: String,
    pub tool_sources: Vec<mcp::Endpoint>,
}

/// One observable step of a run, for streaming surfaces.
#[derive(Debug, Clone)]
pub enum RunStep {
    ToolCall { name: String },
    ToolResult { name: String, ok: bool },
}

/// A configured agent: definition + backend + tool host.
pub struct Agent<B, H> {
    definition: AgentDefinition,
    backend: B,
    tools: H,
}

impl<B: Backend, H: ToolHost> Agent<B, H> {
    pub fn new(definition: AgentDefinition, backend: B, tools: H) -> Self {
        Self {
            definition,
            backend,
            tools,
        }
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Run the loop over `transcript` (which already ends with the new user
    /// message) until the model answers in plain text. The transcript is
    /// extended in place with every assistant message and tool-result turn.
    pub async fn run(&self, transcript: &mut Vec<Message>) -> Result<String> {
        self.run_observed(transcript, |_| {}).await
    }

    /// Like [`Agent::run`], reporting each tool interaction through
    /// `on_step` as it happens.
    pub async fn run_observed(
        &self,
        transcript: &mut Vec<Message>,
        mut on_step: impl FnMut(RunStep) + Send,
    ) -> Result<String> {
        // A broken tool source fails this turn only; the agent itself stays
        // up and later turns retry the connection.
        let specs = self.tools.specs().await?;

        for _ in 0..MAX_TURNS {
            let request = ModelRequest {
                system: Some(&self.definition.instruction),
                messages: transcript,
                tools: &specs,
            };
            let response = self.backend.call(request).await?;
            let message = response.message;

            debug!(
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "model call finished"
            );

            let calls = message.tool_calls();
            transcript.push(message.clone());

            if calls.is_empty() {
                return Ok(message.text());
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                on_step(RunStep::ToolCall {
                    name: call.name.clone(),
                });
                debug!(tool = %call.name, "executing tool call");

                let result = match self.tools.execute(&call).await {
                    Ok(output) => ToolResult::Success {
                        tool_call_id: call.id.clone(),
                        output,
                    },
                    Err(error) => {
                        warn!(tool = %call.name, %error, "tool call failed");
                        ToolResult::Failure {
                            tool_call_id: call.id.clone(),
                            error,
                        }
                    }
                };

                on_step(RunStep::ToolResult {
                    name: call.name.clone(),
                    ok: !result.is_failure(),
                });
                results.push(result);
            }

            transcript.push(Message::tool_results(results));
        }

        Err(Error::TurnLimit(MAX_TURNS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, ModelResponse, Part, Role, ToolCall, Usage};
    use crate::tools::EmptyToolHost;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Backend returning canned messages in order.
    struct ScriptedBackend {
        responses: Mutex<Vec<Message>>,
    }

    impl ScriptedBackend {
        fn new(mut responses: Vec<Message>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl Backend for ScriptedBackend {
        async fn call(&self, _request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
            let message = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ModelError::Api("script exhausted".into()))?;
            Ok(ModelResponse {
                message,
                usage: Usage::default(),
            })
        }
    }

    fn definition() -> AgentDefinition {
        AgentDefinition {
            name: "currency_agent".into(),
            description: "test".into(),
            instruction: "currency only".into(),
            model: "gemini-2.5-flash".into(),
            tool_sources: Vec::new(),
        }
    }

    #[tokio::test]
    async fn plain_reply_ends_the_run() {
        let backend = ScriptedBackend::new(vec![Message::assistant("1 USD is 0.92 EUR.")]);
        let agent = Agent::new(definition(), backend, EmptyToolHost);

        let mut transcript = vec![Message::user("What is 1 USD in EUR?")];
        let reply = agent.run(&mut transcript).await.unwrap();

        assert_eq!(reply, "1 USD is 0.92 EUR.");
        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn failed_tool_call_feeds_error_back() {
        // EmptyToolHost rejects every call; the loop must hand the failure to
        // the model and accept its follow-up answer.
        let tool_turn = Message {
            role: Role::Assistant,
            parts: vec![Part::ToolCall(ToolCall {
                id: "get_exchange_rate".into(),
                name: "get_exchange_rate".into(),
                input: Value::Null,
            })],
        };
        let backend = ScriptedBackend::new(vec![
            tool_turn,
            Message::assistant("I could not reach the rate service."),
        ]);
        let agent = Agent::new(definition(), backend, EmptyToolHost);

        let mut steps = Vec::new();
        let mut transcript = vec![Message::user("rate?")];
        let reply = agent
            .run_observed(&mut transcript, |step| steps.push(step))
            .await
            .unwrap();

        assert_eq!(reply, "I could not reach the rate service.");
        // user, assistant tool call, tool results, assistant reply
        assert_eq!(transcript.len(), 4);
        assert!(matches!(
            steps[1],
            RunStep::ToolResult { ok: false, .. }
        ));

        let results: Vec<_> = transcript[2]
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolResult(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_failure());
    }

    #[tokio::test]
    async fn turn_cap_is_an_error() {
        let tool_turn = |_: usize| Message {
            role: Role::Assistant,
            parts: vec![Part::ToolCall(ToolCall {
                id: "loop".into(),
                name: "loop".into(),
                input: Value::Null,
            })],
        };
        let backend = ScriptedBackend::new((0..MAX_TURNS + 1).map(tool_turn).collect());
        let agent = Agent::new(definition(), backend, EmptyToolHost);

        let mut transcript = vec![Message::user("go")];
        let err = agent.run(&mut transcript).await.unwrap_err();
        assert!(matches!(err, Error::TurnLimit(_)));
    }
}
