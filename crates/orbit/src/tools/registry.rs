use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

/// A single capability the model can invoke by name
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Declaration sent to the model: name, description and input schema
    fn tool(&self) -> &Tool;

    /// Run the tool with the arguments the model supplied
    async fn call(&self, arguments: Value) -> AgentResult<Value>;
}

/// Fixed mapping from tool name to its declaration and implementation
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; names must be unique within a registry
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> AgentResult<()> {
        let name = &handler.tool().name;
        if self.get(name).is_some() {
            return Err(AgentError::Internal(format!(
                "Tool {} is already registered",
                name
            )));
        }
        self.handlers.push(handler);
        Ok(())
    }

    pub fn with_tool(mut self, handler: Arc<dyn ToolHandler>) -> AgentResult<Self> {
        self.register(handler)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.iter().find(|h| h.tool().name == name)
    }

    /// Declarations in registration order
    pub fn tools(&self) -> Vec<Tool> {
        self.handlers.iter().map(|h| h.tool().clone()).collect()
    }

    /// A registry restricted to the named tools, skipping names it does not hold
    pub fn subset(&self, names: &[&str]) -> Self {
        Self {
            handlers: self
                .handlers
                .iter()
                .filter(|h| names.contains(&h.tool().name.as_str()))
                .cloned()
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.tool().name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch a single tool call to the tool of that name
    pub async fn dispatch(&self, call: ToolCall) -> AgentResult<Value> {
        let handler = self
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        handler.call(call.arguments).await
    }
}
