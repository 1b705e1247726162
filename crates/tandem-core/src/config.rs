//! Configuration management
//!
//! Settings are loaded with the following precedence:
//! 1. Environment variables
//! 2. `tandem.toml` configuration file
//! 3. Default values
//!
//! Inside the configuration file, `${VAR_NAME}` expands to the value of the
//! corresponding environment variable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;

/// LLM Provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Claude API
    #[default]
    Claude,
    /// OpenAI-compatible API (GLM, etc.)
    OpenAi,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key
    pub api_key: String,

    /// Default model
    #[serde(default = "default_model")]
    pub model: String,

    /// API provider
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,

    /// Default token budget per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            provider: LlmProvider::Claude,
            base_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u64 {
    8192
}

/// Delegation and agent-pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Maximum number of pooled delegate agents
    #[serde(default = "default_pool_size")]
    pub pool_max_size: usize,

    /// Maximum nesting depth for delegations
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Responses shorter than this are treated as unusable and trigger the
    /// history fallback scan
    #[serde(default = "default_min_response_len")]
    pub min_response_len: usize,

    /// Per-delegation-tool model overrides, keyed by the tool's
    /// `model_config_key` (e.g. `explore = "claude-haiku-..."`)
    #[serde(default)]
    pub model_overrides: HashMap<String, String>,

    /// Maximum agent-loop iterations per delegated task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            pool_max_size: default_pool_size(),
            max_depth: default_max_depth(),
            min_response_len: default_min_response_len(),
            model_overrides: HashMap::new(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_pool_size() -> usize {
    8
}

fn default_max_depth() -> u32 {
    3
}

fn default_min_response_len() -> usize {
    80
}

fn default_max_iterations() -> usize {
    25
}

/// Main configuration for tandem
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Delegation configuration
    #[serde(default)]
    pub delegation: DelegationConfig,
}

impl Config {
    /// Expand `${VAR_NAME}` references against the process environment.
    ///
    /// Unknown variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // consume '{'

                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(chars.next().unwrap());
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file.
    ///
    /// `${VAR_NAME}` references in the file are expanded from the
    /// environment; explicit environment variables take precedence over
    /// file values afterwards.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let toml_content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded = Self::expand_env_vars(&toml_content);

        let mut config: Config = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from the default locations.
    ///
    /// Tries `./tandem.toml` first; falls back to environment variables only.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        if Path::new("tandem.toml").exists() {
            return Self::from_toml_file("tandem.toml");
        }

        Self::from_env()
    }

    /// Build configuration from environment variables alone.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();

        if config.llm.api_key.is_empty() {
            return Err(Error::Config(
                "TANDEM_API_KEY is not set and no config file was found".to_string(),
            ));
        }

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("TANDEM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Ok(model) = std::env::var("TANDEM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("TANDEM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Ok(provider) = std::env::var("TANDEM_PROVIDER") {
            self.llm.provider = match provider.to_lowercase().as_str() {
                "openai" | "glm" | "zai" => LlmProvider::OpenAi,
                _ => LlmProvider::Claude,
            };
        }
        if let Ok(size) = std::env::var("TANDEM_POOL_SIZE") {
            if let Ok(size) = size.parse() {
                self.delegation.pool_max_size = size;
            }
        }
    }

    /// Resolve the model for a delegation tool, falling back to the default.
    pub fn model_for(&self, model_config_key: Option<&str>) -> String {
        model_config_key
            .and_then(|key| self.delegation.model_overrides.get(key))
            .cloned()
            .unwrap_or_else(|| self.llm.model.clone())
    }
}
