use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::registry::ToolHandler;
use super::{execution_error, required_str};
use crate::errors::AgentResult;
use crate::models::tool::Tool;

pub const MODELSLAB_HOST: &str = "https://modelslab.com";

const NEGATIVE_PROMPT: &str = "(worst quality:2), (low quality:2), (normal quality:2), \
    (jpeg artifacts), (blurry), (duplicate), (out of frame), (extra limbs), (bad anatomy), \
    (disfigured), (deformed), (glitch), (oversaturated), (bad hands), watermark, text, logo, \
    signature, grainy, tiling, censored, nsfw, ugly, noisy image, bad lighting";

/// Text-to-image generation through the Modelslab API
pub struct ImageGeneration {
    tool: Tool,
    client: Client,
    host: String,
    api_key: String,
}

impl ImageGeneration {
    pub fn new(api_key: String) -> Self {
        Self {
            tool: Tool::new(
                "generate_image",
                "Generates an image from a text prompt and returns its URL. \
                Describe the image in English only. \
                To show the image in the answer use the syntax ![Image title](image_url).",
                json!({
                    "type": "object",
                    "required": ["prompt"],
                    "properties": {
                        "prompt": {
                            "type": "string",
                            "description": "Description of the desired image."
                        }
                    }
                }),
            ),
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            host: MODELSLAB_HOST.to_string(),
            api_key,
        }
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }
}

#[async_trait]
impl ToolHandler for ImageGeneration {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let prompt = required_str(&arguments, "prompt")?;

        let response = self
            .client
            .post(format!(
                "{}/api/v6/images/text2img",
                self.host.trim_end_matches('/')
            ))
            .json(&json!({
                "key": self.api_key,
                "prompt": prompt,
                "model_id": "fluxdev",
                "samples": "1",
                "negative_prompt": NEGATIVE_PROMPT,
                "width": "768",
                "height": "1024",
                "guidance_scale": "7.5",
                "num_inference_steps": "20",
                "safety_checker": false,
                "enhance_prompt": false,
                "base64": "no",
                "seed": "0",
            }))
            .send()
            .await
            .map_err(execution_error)?;

        if !response.status().is_success() {
            return Err(execution_error(format!(
                "Image generation failed with status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(execution_error)?;
        match body["status"].as_str() {
            Some("processing") | Some("success") | Some("completed") => {}
            _ => {
                let reason = body["message"].as_str().unwrap_or("Unknown error");
                return Err(execution_error(format!("Error generating image: {}", reason)));
            }
        }

        ["output", "future_links"]
            .iter()
            .filter_map(|key| body[*key].get(0).and_then(|v| v.as_str()))
            .next()
            .map(|url| json!({ "url": url }))
            .ok_or_else(|| execution_error("No image URL found in response."))
    }
}
