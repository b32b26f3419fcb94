use std::collections::HashSet;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, ToolRequest};
use crate::models::role::Role;

/// The unit of work for one request: the message history replayed to the model each round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    messages: Vec<Message>,
    /// Free-text sub-goals for the reasoning path. Advisory only.
    pub reasoning_tasks: Vec<String>,
}

impl ConversationState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            reasoning_tasks: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Tool requests of the latest message when it is an assistant turn
    pub fn pending_tool_requests(&self) -> Vec<&ToolRequest> {
        match self.messages.last() {
            Some(message) if message.role == Role::Assistant => message.tool_requests(),
            _ => Vec::new(),
        }
    }

    /// Append tool-result messages for the latest assistant turn.
    ///
    /// Every result must answer exactly one pending call of that turn. Nothing is
    /// appended when any result fails the check.
    pub fn append_tool_results(&mut self, results: Vec<Message>) -> AgentResult<()> {
        let pending: HashSet<String> = self
            .pending_tool_requests()
            .into_iter()
            .map(|request| request.id.clone())
            .collect();

        let mut answered = HashSet::new();
        for result in &results {
            if result.role != Role::Tool {
                return Err(AgentError::ProtocolViolation(format!(
                    "expected a tool-result message, got {:?}",
                    result.role
                )));
            }
            for content in &result.content {
                let Some(response) = content.as_tool_response() else {
                    continue;
                };
                if !pending.contains(&response.id) {
                    return Err(AgentError::ProtocolViolation(format!(
                        "tool result {} has no matching pending call",
                        response.id
                    )));
                }
                if !answered.insert(response.id.clone()) {
                    return Err(AgentError::ProtocolViolation(format!(
                        "tool call {} answered more than once",
                        response.id
                    )));
                }
            }
        }

        self.messages.extend(results);
        Ok(())
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
