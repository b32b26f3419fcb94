use anyhow::{Context, Result};
use orbit::agent::Agent;
use orbit::handler::RequestHandler;
use orbit::prompt_template::system_prompt;
use orbit::providers::factory::get_provider;
use orbit::storage::FsObjectStore;
use orbit::tools::code_sandbox::CodeSandbox;
use orbit::tools::image_generation::ImageGeneration;
use orbit::tools::satellites::{SatellitePosition, TleLookup};
use orbit::tools::web_search::WebSearch;
use orbit::tools::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

use crate::configuration::{Settings, ToolSettings};

/// Search results requested per query on each path
const GENERATION_SEARCH_RESULTS: u32 = 7;
const REASONING_SEARCH_RESULTS: u32 = 16;

/// Tools available on the reasoning path
const REASONING_TOOLS: &[&str] = &["web_search", "code_interpreter"];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub handler: RequestHandler,
}

impl AppState {
    pub fn new(handler: RequestHandler) -> Self {
        Self { handler }
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        let provider_config = settings.provider.into_config();
        let provider = get_provider(provider_config.clone())?;

        let tools = build_tools(&settings.tools, GENERATION_SEARCH_RESULTS)?;
        tracing::info!(tools = ?tools.names(), model = provider_config.model(), "generation path ready");

        let mut agent = Agent::new(provider, tools.clone()).with_max_rounds(settings.agent.max_rounds);

        if let Some(path) = &settings.agent.system_prompt {
            // fail at startup on a bad template; replies render it again
            system_prompt(Some(path.as_path()), &tools.tools())
                .with_context(|| format!("rendering system prompt {}", path.display()))?;
            agent = agent.with_system_prompt_file(path);
        }

        if let Some(reasoning) = settings.reasoning {
            let config = provider_config.with_model(
                reasoning.model,
                reasoning.temperature,
                reasoning.max_tokens,
            );
            let tools = build_tools(&settings.tools, REASONING_SEARCH_RESULTS)?.subset(REASONING_TOOLS);
            tracing::info!(tools = ?tools.names(), model = config.model(), "reasoning path ready");
            agent = agent.with_reasoning(get_provider(config)?, tools);
        }

        let store = FsObjectStore::new(settings.storage.root);
        Ok(Self::new(RequestHandler::new(
            Arc::new(agent),
            Arc::new(store),
        )))
    }
}

/// Register the built-in tools; a tool whose API key is not configured is left out
pub fn build_tools(settings: &ToolSettings, search_results: u32) -> Result<ToolRegistry> {
    let mut tools = ToolRegistry::new();

    if let Some(key) = &settings.tavily_api_key {
        tools.register(Arc::new(WebSearch::new(key.clone(), search_results)))?;
    }
    tools.register(Arc::new(TleLookup::new()))?;
    if let Some(key) = &settings.n2yo_api_key {
        tools.register(Arc::new(SatellitePosition::new(key.clone())))?;
    }
    tools.register(Arc::new(CodeSandbox::new(
        &settings.sandbox_command,
        Duration::from_secs(settings.sandbox_timeout_secs),
    )?))?;
    if let Some(key) = &settings.modelslab_api_key {
        tools.register(Arc::new(ImageGeneration::new(key.clone())))?;
    }

    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{
        AgentSettings, ProviderSettings, ReasoningSettings, ServerSettings, StorageSettings,
    };
    use std::io::Write;

    fn base_settings(root: &std::path::Path) -> Settings {
        Settings {
            server: ServerSettings::default(),
            provider: ProviderSettings::OpenAi {
                host: "http://localhost:1".to_string(),
                api_key: "test-key".to_string(),
                model: "gpt-4o".to_string(),
                temperature: None,
                max_tokens: None,
            },
            reasoning: None,
            agent: AgentSettings::default(),
            storage: StorageSettings {
                root: root.to_path_buf(),
            },
            tools: ToolSettings::default(),
        }
    }

    #[test]
    fn test_state_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings(dir.path());
        settings.reasoning = Some(ReasoningSettings {
            model: "o3-mini".to_string(),
            temperature: None,
            max_tokens: Some(4096),
        });

        let state = AppState::from_settings(settings).unwrap();
        let info = state.handler.agent().model_info();
        assert_eq!(info.provider, "openai");
        assert_eq!(info.name, "gpt-4o");
    }

    #[test]
    fn test_custom_system_prompt_template() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("system.md");
        let mut file = std::fs::File::create(&template).unwrap();
        writeln!(file, "Tools: {{% for tool in tools %}}{{{{ tool.name }}}} {{% endfor %}}").unwrap();

        let mut settings = base_settings(dir.path());
        settings.agent.system_prompt = Some(template);
        assert!(AppState::from_settings(settings).is_ok());

        let mut settings = base_settings(dir.path());
        settings.agent.system_prompt = Some(dir.path().join("missing.md"));
        assert!(AppState::from_settings(settings).is_err());
    }

    #[test]
    fn test_tools_without_keys() {
        let tools = build_tools(&ToolSettings::default(), GENERATION_SEARCH_RESULTS).unwrap();
        assert_eq!(tools.names(), vec!["get_tle", "code_interpreter"]);
    }

    #[test]
    fn test_tools_with_keys() {
        let settings = ToolSettings {
            tavily_api_key: Some("tvly".to_string()),
            n2yo_api_key: Some("n2yo".to_string()),
            modelslab_api_key: Some("ml".to_string()),
            ..ToolSettings::default()
        };
        let tools = build_tools(&settings, REASONING_SEARCH_RESULTS).unwrap();
        assert_eq!(
            tools.names(),
            vec![
                "web_search",
                "get_tle",
                "get_satellite_position",
                "code_interpreter",
                "generate_image"
            ]
        );
        assert_eq!(
            tools.subset(REASONING_TOOLS).names(),
            vec!["web_search", "code_interpreter"]
        );
    }

    #[test]
    fn test_empty_sandbox_command_is_rejected() {
        let settings = ToolSettings {
            sandbox_command: "  ".to_string(),
            ..ToolSettings::default()
        };
        assert!(build_tools(&settings, GENERATION_SEARCH_RESULTS).is_err());
    }
}
