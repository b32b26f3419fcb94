//! Raw notifications emitted by the agent graph while it runs.
//!
//! These are internal: the translator maps them onto the client-facing frames.
use serde::Serialize;
use serde_json::Value;

use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::providers::base::{MessageDelta, ModelInfo, Usage};

/// The graph node that produced an event and the step counter at entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub node: String,
    pub step: usize,
}

impl GraphNode {
    pub fn new<S: Into<String>>(node: S, step: usize) -> Self {
        Self {
            node: node.into(),
            step,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    ModelStart {
        run_id: String,
        node: GraphNode,
        model: ModelInfo,
    },
    ModelDelta {
        run_id: String,
        delta: MessageDelta,
    },
    ModelEnd {
        run_id: String,
        message: Message,
        usage: Usage,
        response_metadata: Value,
    },
    ToolStart {
        run_id: String,
        call_id: String,
        name: String,
        input: Value,
    },
    ToolEnd {
        run_id: String,
        call_id: String,
        name: String,
        output: AgentResult<Value>,
    },
}

impl AgentEvent {
    pub fn run_id(&self) -> &str {
        match self {
            AgentEvent::ModelStart { run_id, .. }
            | AgentEvent::ModelDelta { run_id, .. }
            | AgentEvent::ModelEnd { run_id, .. }
            | AgentEvent::ToolStart { run_id, .. }
            | AgentEvent::ToolEnd { run_id, .. } => run_id,
        }
    }
}
