//! The tool registry and the built-in tools the agent can call
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};

pub mod code_sandbox;
pub mod image_generation;
pub mod registry;
pub mod satellites;
pub mod web_search;

pub use registry::{ToolHandler, ToolRegistry};

fn required_str<'a>(arguments: &'a Value, key: &str) -> AgentResult<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing string parameter '{}'", key)))
}

fn required_f64(arguments: &Value, key: &str) -> AgentResult<f64> {
    arguments
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing numeric parameter '{}'", key)))
}

fn required_u64(arguments: &Value, key: &str) -> AgentResult<u64> {
    arguments
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing integer parameter '{}'", key)))
}

fn execution_error(e: impl std::fmt::Display) -> AgentError {
    AgentError::ExecutionError(e.to_string())
}
