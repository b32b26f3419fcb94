use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::conversation::ConversationState;
use crate::errors::{AgentError, AgentResult};
use crate::events::{AgentEvent, GraphNode};
use crate::models::message::{Message, ToolRequest};
use crate::prompt_template::{reasoning_prompt, system_prompt};
use crate::providers::base::{ModelInfo, Provider, ProviderEvent};
use crate::tools::ToolRegistry;

pub const GENERATION_NODE: &str = "generation_task";
pub const REASONING_NODE: &str = "reasoning_task";
pub const TOOLS_NODE: &str = "tools";

pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// Which model path answers a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Generation,
    Reasoning,
}

/// Transition taken after a Generate step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ExecuteTools,
    Done,
}

/// Pure routing decision on the assistant message just produced
pub fn route(message: &Message) -> Route {
    if message.tool_requests().is_empty() {
        Route::Done
    } else {
        Route::ExecuteTools
    }
}

/// Where a profile's system prompt comes from
#[derive(Debug, Clone)]
enum PromptSource {
    Builtin,
    /// Rendered on every reply so the date and tool list stay current
    Template(PathBuf),
}

/// A model bound to the tools it may call
struct Profile {
    node: &'static str,
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    system_prompt: PromptSource,
}

impl Profile {
    fn system_prompt(&self, state: &ConversationState) -> AgentResult<String> {
        let rendered = match &self.system_prompt {
            PromptSource::Template(path) => system_prompt(Some(path.as_path()), &self.tools.tools()),
            PromptSource::Builtin if self.node == REASONING_NODE => {
                reasoning_prompt(&state.reasoning_tasks)
            }
            PromptSource::Builtin => system_prompt(None, &self.tools.tools()),
        };
        rendered.map_err(|e| AgentError::Internal(e.to_string()))
    }
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Agent integrates a foundational LLM with the tools it needs to answer.
///
/// One reply alternates between asking the model and executing the tool calls it
/// requests, until the model answers without tool calls.
pub struct Agent {
    generation: Profile,
    reasoning: Option<Profile>,
    max_rounds: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider and tools
    pub fn new(provider: Arc<dyn Provider>, tools: ToolRegistry) -> Self {
        Self {
            generation: Profile {
                node: GENERATION_NODE,
                provider,
                tools,
                system_prompt: PromptSource::Builtin,
            },
            reasoning: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Render the system prompt from a template file at the start of every reply
    pub fn with_system_prompt_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.generation.system_prompt = PromptSource::Template(path.into());
        self
    }

    /// Enable the higher-effort reasoning path
    pub fn with_reasoning(mut self, provider: Arc<dyn Provider>, tools: ToolRegistry) -> Self {
        self.reasoning = Some(Profile {
            node: REASONING_NODE,
            provider,
            tools,
            system_prompt: PromptSource::Builtin,
        });
        self
    }

    /// Bound the number of tool rounds in one reply
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn model_info(&self) -> ModelInfo {
        self.generation.provider.model_info()
    }

    fn profile(&self, mode: AgentMode) -> &Profile {
        match (mode, &self.reasoning) {
            (AgentMode::Reasoning, Some(reasoning)) => reasoning,
            (AgentMode::Reasoning, None) => {
                tracing::warn!("reasoning path requested but not configured, using generation");
                &self.generation
            }
            (AgentMode::Generation, _) => &self.generation,
        }
    }

    /// Execute one tool request, turning every failure into an error payload
    async fn execute(&self, tools: &ToolRegistry, request: &ToolRequest) -> AgentResult<Value> {
        let call = request.tool_call.clone()?;
        let name = call.name.clone();
        let result = tools.dispatch(call).await;
        if let Err(e) = &result {
            tracing::warn!(tool = %name, call_id = %request.id, error = %e, "tool call failed");
        }
        result
    }

    /// Run the graph over `state`, yielding raw events as they happen.
    ///
    /// The stream ends after the final assistant message, or with the first error
    /// that is not a tool failure. Dropping the stream cancels in-flight model and tool calls.
    pub fn reply(
        &self,
        state: ConversationState,
        mode: AgentMode,
    ) -> BoxStream<'_, AgentResult<AgentEvent>> {
        let profile = self.profile(mode);

        Box::pin(try_stream! {
            let mut state = state;
            let system = profile.system_prompt(&state)?;
            let declarations = profile.tools.tools();
            let mut step = 0;
            let mut rounds = 0;

            loop {
                // Generate
                step += 1;
                let run_id = new_run_id();
                let model = profile.provider.model_info();
                yield AgentEvent::ModelStart {
                    run_id: run_id.clone(),
                    node: GraphNode::new(profile.node, step),
                    model: model.clone(),
                };

                let mut events = profile
                    .provider
                    .stream(&system, state.messages(), &declarations)
                    .await
                    .map_err(AgentError::from_provider)?;

                let mut completed = None;
                while let Some(event) = events.next().await {
                    match event.map_err(AgentError::from_provider)? {
                        ProviderEvent::Delta(delta) => {
                            yield AgentEvent::ModelDelta { run_id: run_id.clone(), delta };
                        }
                        ProviderEvent::Done(message, usage) => completed = Some((message, usage)),
                    }
                }
                let (message, usage) = completed.ok_or_else(|| {
                    AgentError::Upstream("model stream ended without a final message".to_string())
                })?;

                // Route
                let next = route(&message);
                let finish_reason = match next {
                    Route::ExecuteTools => "tool_calls",
                    Route::Done => "stop",
                };
                let response_metadata = json!({
                    "model_name": model.name,
                    "finish_reason": finish_reason,
                    "usage": usage,
                });
                yield AgentEvent::ModelEnd {
                    run_id,
                    message: message.clone(),
                    usage,
                    response_metadata,
                };
                state.push(message);

                if next == Route::Done {
                    break;
                }
                if rounds == self.max_rounds {
                    Err::<(), _>(AgentError::MaxRoundsExceeded(self.max_rounds))?;
                }
                rounds += 1;

                // ExecuteTools
                step += 1;
                tracing::debug!(node = TOOLS_NODE, step, "executing tool calls");
                let requests: Vec<ToolRequest> =
                    state.pending_tool_requests().into_iter().cloned().collect();

                let mut run_ids = Vec::with_capacity(requests.len());
                for request in &requests {
                    let run_id = new_run_id();
                    if let Ok(call) = &request.tool_call {
                        yield AgentEvent::ToolStart {
                            run_id: run_id.clone(),
                            call_id: request.id.clone(),
                            name: call.name.clone(),
                            input: call.arguments.clone(),
                        };
                    }
                    run_ids.push(run_id);
                }

                // Run every call concurrently but keep results in request order
                let outputs = futures::future::join_all(
                    requests.iter().map(|request| self.execute(&profile.tools, request)),
                )
                .await;

                let mut results = Vec::with_capacity(requests.len());
                for ((request, run_id), output) in requests.iter().zip(run_ids).zip(outputs) {
                    if let Ok(call) = &request.tool_call {
                        yield AgentEvent::ToolEnd {
                            run_id,
                            call_id: request.id.clone(),
                            name: call.name.clone(),
                            output: output.clone(),
                        };
                    }
                    results.push(Message::tool().with_tool_response(request.id.clone(), output));
                }
                state.append_tool_results(results)?;
            }
        })
    }
}
