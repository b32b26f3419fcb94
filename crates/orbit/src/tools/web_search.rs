use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::registry::ToolHandler;
use super::{execution_error, required_str};
use crate::errors::AgentResult;
use crate::models::tool::Tool;

pub const TAVILY_HOST: &str = "https://api.tavily.com";

/// Web search backed by the Tavily search API
pub struct WebSearch {
    tool: Tool,
    client: Client,
    host: String,
    api_key: String,
    max_results: u32,
}

impl WebSearch {
    pub fn new(api_key: String, max_results: u32) -> Self {
        let tool = Tool::new(
            "web_search",
            "Search the web for current information. Returns the most relevant pages \
            with their title, url and an extract of their content.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query."
                    }
                }
            }),
        );

        Self {
            tool,
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            host: TAVILY_HOST.to_string(),
            api_key,
            max_results,
        }
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }
}

#[async_trait]
impl ToolHandler for WebSearch {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let query = required_str(&arguments, "query")?;
        tracing::debug!(query, max_results = self.max_results, "web search");

        let response = self
            .client
            .post(format!("{}/search", self.host.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await
            .map_err(execution_error)?;

        if !response.status().is_success() {
            return Err(execution_error(format!(
                "search request failed with status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(execution_error)?;
        let results: Vec<Value> = body["results"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|r| {
                json!({
                    "title": r["title"],
                    "url": r["url"],
                    "content": r["content"],
                })
            })
            .collect();

        Ok(json!({ "query": query, "results": results }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_results_are_trimmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer tvly-key"))
            .and(body_partial_json(json!({"query": "rust", "max_results": 7})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "rust",
                "results": [{
                    "title": "Rust",
                    "url": "https://www.rust-lang.org",
                    "content": "A language empowering everyone",
                    "score": 0.98,
                    "raw_content": null
                }]
            })))
            .mount(&server)
            .await;

        let search = WebSearch::new("tvly-key".to_string(), 7).with_host(server.uri());
        let output = search.call(json!({"query": "rust"})).await.unwrap();

        assert_eq!(output["results"][0]["url"], "https://www.rust-lang.org");
        assert!(output["results"][0].get("score").is_none());
    }

    #[tokio::test]
    async fn test_missing_query() {
        let search = WebSearch::new("tvly-key".to_string(), 7);
        let err = search.call(json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }
}
