use super::{base::Provider, configs::ProviderConfig, openai::OpenAiProvider};
use anyhow::Result;
use std::sync::Arc;

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Ollama(ollama_config) => {
            Ok(Arc::new(OpenAiProvider::ollama(ollama_config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::{OllamaProviderConfig, OLLAMA_HOST};

    #[test]
    fn test_ollama_reports_its_own_provider_name() -> Result<()> {
        let provider = get_provider(ProviderConfig::Ollama(OllamaProviderConfig {
            host: OLLAMA_HOST.to_string(),
            model: "llama3".to_string(),
            temperature: None,
            max_tokens: None,
        }))?;

        let info = provider.model_info();
        assert_eq!(info.provider, "ollama");
        assert_eq!(info.name, "llama3");
        Ok(())
    }
}
