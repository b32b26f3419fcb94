//! Maps the agent graph's raw events onto wire frames.
use async_stream::stream;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};

use crate::context::RequestContext;
use crate::errors::{AgentError, AgentResult};
use crate::events::AgentEvent;
use crate::protocol::{Frame, Part};

/// Error payload carried by a tool-end frame when the tool failed
fn tool_output(output: AgentResult<Value>) -> Value {
    match output {
        Ok(value) => value,
        Err(e) => json!({"error": e.to_string(), "error_type": e.kind()}),
    }
}

/// Stateful mapping from raw events to frames for one request
pub struct EventTranslator {
    context: RequestContext,
}

impl EventTranslator {
    pub fn new(context: RequestContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Frames that open every stream
    pub fn opening(&self) -> Vec<Frame> {
        vec![
            Frame::connect(self.context.request_id.clone()),
            Frame::moderation(self.context.request_id.clone(), None),
        ]
    }

    /// Map one raw event, accumulating accounting along the way.
    ///
    /// Returns `None` for deltas with nothing to render or count.
    pub fn translate(&mut self, event: AgentEvent) -> Option<Frame> {
        match event {
            AgentEvent::ModelStart { run_id, node, model } => Some(Frame::ChunkStart {
                run_id,
                graph_node: node,
                model,
            }),
            AgentEvent::ModelDelta { run_id, delta } => {
                if delta.is_empty() {
                    return None;
                }
                self.context.add_usage(&delta.usage);
                self.context.add_text(&delta.text);
                Some(Frame::Chunk {
                    run_id,
                    parts: vec![Part::Text { text: delta.text }],
                    tool_calls: delta.tool_calls,
                    response_metadata: json!({}),
                    usage_metadata: delta.usage,
                })
            }
            AgentEvent::ModelEnd {
                run_id,
                response_metadata,
                ..
            } => Some(Frame::ChunkEnd {
                run_id,
                response_metadata,
            }),
            AgentEvent::ToolStart {
                run_id,
                call_id,
                name,
                input,
            } => {
                self.context.add_tool(name.clone());
                Some(Frame::ToolStart {
                    run_id,
                    tool_id: call_id,
                    tool_name: name,
                    input,
                })
            }
            AgentEvent::ToolEnd {
                run_id,
                call_id,
                name,
                output,
            } => Some(Frame::ToolEnd {
                run_id,
                tool_id: call_id,
                tool_name: name,
                output: tool_output(output),
            }),
        }
    }

    /// Terminal frame for a failed run
    pub fn fail(&self, error: &AgentError) -> Frame {
        Frame::Error {
            error: error.to_string(),
            error_type: error.kind().to_string(),
        }
    }

    /// Terminal frame for a completed run
    pub fn finish(self) -> Frame {
        let total_time = self.context.elapsed();
        let context = self.context;
        Frame::Summary {
            request_id: context.request_id,
            status: "completed".to_string(),
            total_time,
            input_tokens: context.input_tokens,
            output_tokens: context.output_tokens,
            tools: context.tools.into_iter().collect(),
            response: context.response,
            files: context.files,
        }
    }
}

/// Turn a raw event stream into the complete frame sequence of one response.
///
/// The output always opens with connect and moderation frames and always closes
/// with exactly one terminal frame (summary or error) followed by the sentinel.
pub fn translate<'a>(
    events: BoxStream<'a, AgentResult<AgentEvent>>,
    context: RequestContext,
) -> BoxStream<'a, Frame> {
    Box::pin(stream! {
        let mut events = events;
        let mut translator = EventTranslator::new(context);
        for frame in translator.opening() {
            yield frame;
        }

        let mut failure = None;
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    tracing::debug!(run_id = event.run_id(), "agent event");
                    if let Some(frame) = translator.translate(event) {
                        yield frame;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        // Stop the graph before the terminal frame goes out
        drop(events);

        let request_id = translator.context().request_id.clone();
        match failure {
            Some(e) => {
                tracing::error!(%request_id, error = %e, "generation failed");
                yield translator.fail(&e);
            }
            None => {
                let summary = translator.finish();
                if let Frame::Summary { input_tokens, output_tokens, total_time, .. } = &summary {
                    tracing::info!(%request_id, input_tokens, output_tokens, total_time, "generation completed");
                }
                yield summary;
            }
        }
        yield Frame::Done;
    })
}
