use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::{Message, MessageContent};
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none() && self.total_tokens.is_none()
    }
}

/// Identity of the model behind a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl ModelInfo {
    pub fn chat<P: Into<String>, N: Into<String>>(provider: P, name: N) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
            kind: "chat".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// A partial tool call as it arrives while the model is still streaming
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One streaming increment of an assistant message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    pub text: String,
    pub tool_calls: Vec<ToolCallFragment>,
    pub usage: Usage,
}

impl MessageDelta {
    /// Whether the delta carries nothing a client could render or account for
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty() && self.usage.is_empty()
    }

    /// Express a whole message as a single delta
    pub fn from_message(message: &Message, usage: Usage) -> Self {
        let tool_calls = message
            .content
            .iter()
            .filter_map(MessageContent::as_tool_request)
            .enumerate()
            .map(|(index, request)| {
                let call = request.tool_call.as_ref().ok();
                ToolCallFragment {
                    index,
                    id: Some(request.id.clone()),
                    name: call.map(|c| c.name.clone()),
                    arguments: call.map(|c| c.arguments.to_string()),
                }
            })
            .collect();

        Self {
            text: message.text(),
            tool_calls,
            usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Delta(MessageDelta),
    /// The aggregated message, always the last event of a stream
    Done(Message, Usage),
}

pub type ProviderStream = BoxStream<'static, Result<ProviderEvent>>;

/// Base trait for AI providers (OpenAI-compatible backends, mocks, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    fn model_info(&self) -> ModelInfo;

    /// Generate the next message
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)>;

    /// Generate the next message as a sequence of deltas followed by the aggregate.
    ///
    /// The default implementation delivers the whole completion as one delta.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream> {
        let (message, usage) = self.complete(system, messages, tools).await?;
        let delta = MessageDelta::from_message(&message, usage.clone());
        Ok(Box::pin(futures::stream::iter(vec![
            Ok(ProviderEvent::Delta(delta)),
            Ok(ProviderEvent::Done(message, usage)),
        ])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolCall;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(30));
        assert!(Usage::default().is_empty());
    }

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        let serialized = serde_json::to_string(&usage)?;
        let json_value: serde_json::Value = serde_json::from_str(&serialized)?;
        assert_eq!(json_value["input_tokens"], json!(10));
        assert_eq!(json_value["output_tokens"], json!(20));
        assert_eq!(json_value["total_tokens"], json!(30));
        Ok(())
    }

    #[test]
    fn test_delta_from_message() {
        let message = Message::assistant()
            .with_text("Searching")
            .with_tool_request("call_1", Ok(ToolCall::new("web_search", json!({"query": "X"}))));
        let delta = MessageDelta::from_message(&message, Usage::default());

        assert_eq!(delta.text, "Searching");
        assert_eq!(delta.tool_calls.len(), 1);
        assert_eq!(delta.tool_calls[0].name.as_deref(), Some("web_search"));
        assert_eq!(
            delta.tool_calls[0].arguments.as_deref(),
            Some(r#"{"query":"X"}"#)
        );
        assert!(!delta.is_empty());
        assert!(MessageDelta::default().is_empty());
    }
}
