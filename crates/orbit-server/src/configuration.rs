use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use orbit::agent::DEFAULT_MAX_ROUNDS;
use orbit::providers::configs::{
    OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig, OLLAMA_HOST, OLLAMA_MODEL,
};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Ollama {
                host,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

/// Model for the reasoning path; it shares the main provider's backend
#[derive(Debug, Deserialize)]
pub struct ReasoningSettings {
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default)]
    pub system_prompt: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolSettings {
    #[serde(default)]
    pub tavily_api_key: Option<String>,
    #[serde(default)]
    pub n2yo_api_key: Option<String>,
    #[serde(default)]
    pub modelslab_api_key: Option<String>,
    #[serde(default = "default_sandbox_command")]
    pub sandbox_command: String,
    #[serde(default = "default_sandbox_timeout_secs")]
    pub sandbox_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            n2yo_api_key: None,
            modelslab_api_key: None,
            sandbox_command: default_sandbox_command(),
            sandbox_timeout_secs: default_sandbox_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub reasoning: Option<ReasoningSettings>,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub tools: ToolSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("ORBIT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                if let Some(env_var) = missing_field_env_var(&err.to_string()) {
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// Map "missing field `x`" (optionally "... for key `section`") to the variable to set
fn missing_field_env_var(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    let key = match rest
        .strip_prefix(" for key `")
        .and_then(|section| section.split_once('`'))
    {
        Some((section, _)) if !section.is_empty() => format!("{}.{}", section, field),
        _ => field.to_string(),
    };
    Some(to_env_var(&key))
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_ollama_host() -> String {
    OLLAMA_HOST.to_string()
}

fn default_ollama_model() -> String {
    OLLAMA_MODEL.to_string()
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./objects")
}

fn default_sandbox_command() -> String {
    "python3".to_string()
}

fn default_sandbox_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("ORBIT_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("ORBIT_PROVIDER__TYPE", "openai");
        env::set_var("ORBIT_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.agent.max_rounds, DEFAULT_MAX_ROUNDS);
        assert!(settings.agent.system_prompt.is_none());
        assert_eq!(settings.storage.root, PathBuf::from("./objects"));
        assert_eq!(settings.tools.sandbox_command, "python3");
        assert_eq!(settings.tools.sandbox_timeout_secs, 60);
        assert!(settings.tools.tavily_api_key.is_none());
        assert!(settings.reasoning.is_none());

        if let ProviderSettings::OpenAi {
            host,
            api_key,
            model,
            temperature,
            max_tokens,
        } = settings.provider
        {
            assert_eq!(host, "https://api.openai.com");
            assert_eq!(api_key, "test-key");
            assert_eq!(model, "gpt-4o");
            assert_eq!(temperature, None);
            assert_eq!(max_tokens, None);
        } else {
            panic!("Expected OpenAI provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_ollama_settings() {
        clean_env();
        env::set_var("ORBIT_PROVIDER__TYPE", "ollama");
        env::set_var("ORBIT_PROVIDER__MODEL", "llama3");
        env::set_var("ORBIT_PROVIDER__TEMPERATURE", "0.7");
        env::set_var("ORBIT_PROVIDER__MAX_TOKENS", "2000");

        let settings = Settings::new().unwrap();
        if let ProviderSettings::Ollama {
            host,
            model,
            temperature,
            max_tokens,
        } = settings.provider
        {
            assert_eq!(host, OLLAMA_HOST);
            assert_eq!(model, "llama3");
            assert_eq!(temperature, Some(0.7));
            assert_eq!(max_tokens, Some(2000));
        } else {
            panic!("Expected Ollama provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("ORBIT_SERVER__PORT", "9090");
        env::set_var("ORBIT_PROVIDER__TYPE", "openai");
        env::set_var("ORBIT_PROVIDER__API_KEY", "test-key");
        env::set_var("ORBIT_PROVIDER__HOST", "https://custom.openai.com");
        env::set_var("ORBIT_REASONING__MODEL", "o3-mini");
        env::set_var("ORBIT_AGENT__MAX_ROUNDS", "4");
        env::set_var("ORBIT_STORAGE__ROOT", "/tmp/orbit-objects");
        env::set_var("ORBIT_TOOLS__TAVILY_API_KEY", "tvly-key");
        env::set_var("ORBIT_TOOLS__SANDBOX_TIMEOUT_SECS", "5");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.agent.max_rounds, 4);
        assert_eq!(settings.storage.root, PathBuf::from("/tmp/orbit-objects"));
        assert_eq!(settings.tools.tavily_api_key.as_deref(), Some("tvly-key"));
        assert_eq!(settings.tools.sandbox_timeout_secs, 5);
        assert_eq!(
            settings.reasoning.as_ref().map(|r| r.model.as_str()),
            Some("o3-mini")
        );

        let config = settings.provider.into_config();
        assert_eq!(config.model(), "gpt-4o");
        if let ProviderConfig::OpenAi(openai) = config {
            assert_eq!(openai.host, "https://custom.openai.com");
        } else {
            panic!("Expected OpenAI provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_provider_is_reported_as_env_var() {
        clean_env();

        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert!(env_var.starts_with("ORBIT_PROVIDER"));
            }
            other => panic!("Expected missing env var error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_env_var() {
        assert_eq!(
            missing_field_env_var("missing field `provider`"),
            Some("ORBIT_PROVIDER".to_string())
        );
        assert_eq!(
            missing_field_env_var("missing field `api_key` for key `provider`"),
            Some("ORBIT_PROVIDER__API_KEY".to_string())
        );
        assert_eq!(missing_field_env_var("invalid type"), None);
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
