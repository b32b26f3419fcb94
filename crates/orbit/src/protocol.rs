//! The outbound wire protocol: typed frames and their Server-Sent-Events encoding.
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::attachments::FileDescriptor;
use crate::events::GraphNode;
use crate::providers::base::{ModelInfo, ToolCallFragment, Usage};

/// Literal payload of the end-of-stream sentinel
pub const DONE_SENTINEL: &str = "[DONE]";

/// One content part of a chunk frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "request_start")]
    Connect {
        request_id: String,
        status: String,
        pong: f64,
    },
    #[serde(rename = "content_moderation")]
    Moderation {
        request_id: String,
        moderate: Option<Value>,
    },
    #[serde(rename = "chat_model_start")]
    ChunkStart {
        run_id: String,
        graph_node: GraphNode,
        model: ModelInfo,
    },
    #[serde(rename = "chat_model_stream")]
    Chunk {
        run_id: String,
        parts: Vec<Part>,
        tool_calls: Vec<ToolCallFragment>,
        response_metadata: Value,
        usage_metadata: Usage,
    },
    #[serde(rename = "chat_model_end")]
    ChunkEnd {
        run_id: String,
        response_metadata: Value,
    },
    #[serde(rename = "tool_start")]
    ToolStart {
        run_id: String,
        tool_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename = "tool_end")]
    ToolEnd {
        run_id: String,
        tool_id: String,
        tool_name: String,
        output: Value,
    },
    #[serde(rename = "error")]
    Error { error: String, error_type: String },
    #[serde(rename = "generation_end")]
    Summary {
        request_id: String,
        status: String,
        total_time: f64,
        input_tokens: i64,
        output_tokens: i64,
        tools: Vec<String>,
        response: String,
        files: Vec<FileDescriptor>,
    },
    /// End-of-stream sentinel; encoded as a bare `[DONE]`
    #[serde(skip)]
    Done,
}

impl Frame {
    pub fn connect<S: Into<String>>(request_id: S) -> Self {
        Frame::Connect {
            request_id: request_id.into(),
            status: "running".to_string(),
            pong: Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    pub fn moderation<S: Into<String>>(request_id: S, moderate: Option<Value>) -> Self {
        Frame::Moderation {
            request_id: request_id.into(),
            moderate,
        }
    }

    /// Stable frame kind, as it appears in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Connect { .. } => "request_start",
            Frame::Moderation { .. } => "content_moderation",
            Frame::ChunkStart { .. } => "chat_model_start",
            Frame::Chunk { .. } => "chat_model_stream",
            Frame::ChunkEnd { .. } => "chat_model_end",
            Frame::ToolStart { .. } => "tool_start",
            Frame::ToolEnd { .. } => "tool_end",
            Frame::Error { .. } => "error",
            Frame::Summary { .. } => "generation_end",
            Frame::Done => "done",
        }
    }

    /// Whether this frame belongs to a model run and is sent as a `delta` event
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            Frame::ChunkStart { .. } | Frame::Chunk { .. } | Frame::ChunkEnd { .. }
        )
    }

    /// Encode as one SSE block terminated by a blank line
    pub fn to_sse(&self) -> String {
        if let Frame::Done = self {
            return format!("data: {}\n\n", DONE_SENTINEL);
        }
        let data = serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, kind = self.kind(), "failed to encode frame");
            serde_json::json!({
                "type": "error",
                "error": format!("failed to encode {} frame", self.kind()),
                "error_type": "internal",
            })
            .to_string()
        });
        if self.is_delta() {
            format!("event: delta\ndata: {}\n\n", data)
        } else {
            format!("data: {}\n\n", data)
        }
    }
}
