use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Exceeded the limit of {0} tool rounds without a final answer")]
    MaxRoundsExceeded(usize),

    #[error("Context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("Model backend failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Stable classification reported to clients in error frames
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ToolNotFound(_) => "tool_not_found",
            AgentError::InvalidParameters(_) => "invalid_parameters",
            AgentError::ExecutionError(_) => "tool_execution",
            AgentError::ProtocolViolation(_) => "protocol_violation",
            AgentError::MaxRoundsExceeded(_) => "max_rounds_exceeded",
            AgentError::ContextLengthExceeded(_) => "context_length_exceeded",
            AgentError::Upstream(_) => "upstream",
            AgentError::Internal(_) => "internal",
        }
    }

    /// Classify a failure coming out of a provider call.
    pub fn from_provider(err: anyhow::Error) -> Self {
        match err.downcast_ref::<crate::providers::utils::ContextLengthExceededError>() {
            Some(exceeded) => AgentError::ContextLengthExceeded(exceeded.message().to_string()),
            None => AgentError::Upstream(format!("{:#}", err)),
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Failure to turn an inbound attachment into bytes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttachmentError {
    #[error("Attachment {name} does not start with the expected prefix {expected}")]
    MissingPrefix { name: String, expected: String },

    #[error("Attachment {name} is not valid base64: {reason}")]
    Decode { name: String, reason: String },
}
