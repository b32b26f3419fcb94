// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Ollama(OllamaProviderConfig),
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAi(config) => &config.model,
            ProviderConfig::Ollama(config) => &config.model,
        }
    }

    /// The same backend and credentials, pointed at a different model
    pub fn with_model(
        &self,
        model: String,
        temperature: Option<f32>,
        max_tokens: Option<i32>,
    ) -> ProviderConfig {
        match self {
            ProviderConfig::OpenAi(config) => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host: config.host.clone(),
                api_key: config.api_key.clone(),
                model,
                temperature,
                max_tokens,
            }),
            ProviderConfig::Ollama(config) => ProviderConfig::Ollama(OllamaProviderConfig {
                host: config.host.clone(),
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct OllamaProviderConfig {
    pub host: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

pub const OLLAMA_HOST: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "qwen2.5";
