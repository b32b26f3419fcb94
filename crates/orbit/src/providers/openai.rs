use anyhow::{anyhow, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::base::{
    MessageDelta, ModelInfo, Provider, ProviderEvent, ProviderStream, ToolCallFragment, Usage,
};
use super::configs::{OllamaProviderConfig, OpenAiProviderConfig};
use super::sse::parse_sse;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
    tool_request_from_parts, tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// Provider for any backend speaking the OpenAI chat completions API
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
    label: &'static str,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            config,
            label: "openai",
        })
    }

    /// Ollama serves the same API without authentication
    pub fn ollama(config: OllamaProviderConfig) -> Result<Self> {
        let mut provider = Self::new(OpenAiProviderConfig {
            host: config.host,
            api_key: String::new(),
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })?;
        provider.label = "ollama";
        Ok(provider)
    }

    fn get_usage(data: &Value) -> Result<Usage> {
        let usage = data
            .get("usage")
            .ok_or_else(|| anyhow!("No usage data in response"))?;
        Ok(usage_from_value(usage))
    }

    fn build_payload(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<Value> {
        let system_message = json!({
            "role": "system",
            "content": system
        });

        let tools_spec = if !tools.is_empty() {
            tools_to_openai_spec(tools)?
        } else {
            vec![]
        };

        // create messages array with system message first
        let mut messages_array = vec![system_message];
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array
        });

        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        Ok(payload)
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let mut request = self.client.post(&url).json(payload);
        if !self.config.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.config.api_key));
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(err) = body.get("error").and_then(check_openai_context_length_error) {
                    return Err(err.into());
                }
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }
}

fn usage_from_value(usage: &Value) -> Usage {
    let input_tokens = usage
        .get("prompt_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let output_tokens = usage
        .get("completion_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let total_tokens = usage
        .get("total_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

fn api_error(error: &Value) -> anyhow::Error {
    match check_openai_context_length_error(error) {
        Some(err) => err.into(),
        None => anyhow!("OpenAI API error: {}", error),
    }
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates streamed chunks into the final assistant message
#[derive(Default)]
struct StreamAssembler {
    text: String,
    calls: BTreeMap<usize, PartialCall>,
    usage: Usage,
}

impl StreamAssembler {
    fn push(&mut self, chunk: &Value) -> MessageDelta {
        let mut delta = MessageDelta::default();

        if let Some(choice) = chunk["choices"].get(0) {
            let update = &choice["delta"];
            if let Some(text) = update["content"].as_str() {
                self.text.push_str(text);
                delta.text = text.to_string();
            }
            for call in update["tool_calls"].as_array().into_iter().flatten() {
                let fragment = ToolCallFragment {
                    index: call["index"].as_u64().unwrap_or(0) as usize,
                    id: call["id"].as_str().map(String::from),
                    name: call["function"]["name"].as_str().map(String::from),
                    arguments: call["function"]["arguments"].as_str().map(String::from),
                };
                let partial = self.calls.entry(fragment.index).or_default();
                if let Some(id) = &fragment.id {
                    partial.id = id.clone();
                }
                if let Some(name) = &fragment.name {
                    partial.name.push_str(name);
                }
                if let Some(arguments) = &fragment.arguments {
                    partial.arguments.push_str(arguments);
                }
                delta.tool_calls.push(fragment);
            }
        }

        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            let usage = usage_from_value(usage);
            self.usage = usage.clone();
            delta.usage = usage;
        }

        delta
    }

    fn finish(self) -> (Message, Usage) {
        let mut message = Message::assistant();
        if !self.text.is_empty() {
            message = message.with_text(self.text);
        }
        for (_, call) in self.calls {
            message = message.with_content(tool_request_from_parts(
                call.id,
                &call.name,
                &call.arguments,
            ));
        }
        (message, self.usage)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            ..ModelInfo::chat(self.label, self.config.model.clone())
        }
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools)?;
        let response: Value = self.send(&payload).await?.json().await?;

        if let Some(error) = response.get("error") {
            return Err(api_error(error));
        }

        let message = openai_response_to_message(response.clone())?;
        let usage = Self::get_usage(&response)?;

        Ok((message, usage))
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream> {
        let mut payload = self.build_payload(system, messages, tools)?;
        payload["stream"] = json!(true);
        payload["stream_options"] = json!({"include_usage": true});

        let response = self.send(&payload).await?;
        let mut events = Box::pin(parse_sse(response.bytes_stream()));

        Ok(Box::pin(try_stream! {
            let mut assembler = StreamAssembler::default();
            while let Some(event) = events.next().await {
                let event = event?;
                if event.data == "[DONE]" {
                    break;
                }
                let chunk: Value = serde_json::from_str(&event.data)?;
                if let Some(error) = chunk.get("error") {
                    Err::<(), _>(api_error(error))?;
                }
                let delta = assembler.push(&chunk);
                if !delta.is_empty() {
                    yield ProviderEvent::Delta(delta);
                }
            }
            let (message, usage) = assembler.finish();
            yield ProviderEvent::Done(message, usage);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use crate::models::message::MessageContent;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiProviderConfig {
            host: server.uri(),
            api_key: "test_api_key".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: Some(0.6),
            max_tokens: None,
        })
        .unwrap()
    }

    async fn _setup_mock_server(response: ResponseTemplate) -> (MockServer, OpenAiProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! How can I assist you today?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 15,
                "total_tokens": 27
            }
        });

        let (_server, provider) =
            _setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let messages = vec![Message::user().with_text("Hello?")];
        let (message, usage) = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await?;

        assert_eq!(message.text(), "Hello! How can I assist you today?");
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(15));
        assert_eq!(usage.total_tokens, Some(27));

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-tool",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "get_tle",
                            "arguments": "{\"norad_id\":25544}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 15,
                "total_tokens": 35
            }
        });

        let (_server, provider) =
            _setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let messages = vec![Message::user().with_text("Where is the ISS?")];
        let tool = Tool::new(
            "get_tle",
            "Fetch the latest TLE for a satellite",
            json!({
                "type": "object",
                "properties": {"norad_id": {"type": "integer"}},
                "required": ["norad_id"]
            }),
        );

        let (message, usage) = provider
            .complete("You are a helpful assistant.", &messages, &[tool])
            .await?;

        if let MessageContent::ToolRequest(tool_request) = &message.content[0] {
            let tool_call = tool_request.tool_call.as_ref().unwrap();
            assert_eq!(tool_request.id, "call_123");
            assert_eq!(tool_call.name, "get_tle");
            assert_eq!(tool_call.arguments, json!({"norad_id": 25544}));
        } else {
            panic!("Expected ToolCall content");
        }
        assert_eq!(usage.total_tokens, Some(35));

        Ok(())
    }

    #[tokio::test]
    async fn test_stream_assembles_text_tool_calls_and_usage() -> Result<()> {
        let body = [
            json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "Let me "}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "search."}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "web_search", "arguments": "{\"query\""}}]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": ":\"X\"}"}}]}}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 7, "completion_tokens": 5, "total_tokens": 12}}),
        ]
        .iter()
        .map(|chunk| format!("data: {}\n\n", chunk))
        .collect::<String>()
            + "data: [DONE]\n\n";

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;
        let provider = provider_for(&mock_server);

        let events: Vec<ProviderEvent> = provider
            .stream("system", &[Message::user().with_text("X?")], &[])
            .await?
            .try_collect()
            .await?;

        // the empty role-only chunk is dropped
        let deltas: Vec<&MessageDelta> = events
            .iter()
            .filter_map(|e| match e {
                ProviderEvent::Delta(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(deltas.len(), 5);
        assert_eq!(deltas[0].text, "Let me ");
        assert_eq!(deltas[4].usage.input_tokens, Some(7));

        match events.last() {
            Some(ProviderEvent::Done(message, usage)) => {
                assert_eq!(message.text(), "Let me search.");
                let request = message.tool_requests()[0];
                assert_eq!(request.id, "call_1");
                assert_eq!(
                    request.tool_call.as_ref().unwrap().arguments,
                    json!({"query": "X"})
                );
                assert_eq!(usage.total_tokens, Some(12));
            }
            other => panic!("Expected Done, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_context_length_error_is_classified() -> Result<()> {
        let (_server, provider) = _setup_mock_server(ResponseTemplate::new(400).set_body_json(
            json!({"error": {"code": "context_length_exceeded", "message": "too many tokens"}}),
        ))
        .await;

        let err = provider
            .complete("system", &[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();

        assert_eq!(
            AgentError::from_provider(err),
            AgentError::ContextLengthExceeded("too many tokens".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error() -> Result<()> {
        let (_server, provider) = _setup_mock_server(ResponseTemplate::new(503)).await;

        let result = provider
            .stream("system", &[Message::user().with_text("hi")], &[])
            .await;

        assert!(result.is_err());
        Ok(())
    }
}
