//! Configuration module for the governance service.
//!
//! Loads configuration from YAML files and environment variables.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::AgentSettings;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Initial agent settings, used until settings are saved to the store.
    pub agents: AgentSettings,
    pub governance: GovernanceConfig,
    pub llm: LlmConfig,
    pub fact_check: FactCheckConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL. When absent the in-memory store is used.
    pub url: Option<String>,
}

impl DatabaseConfig {
    /// The configured URL, ignoring blank values.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Pipeline constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Violations below this confidence never cause a block on their own.
    pub min_confidence_to_block: f64,
    /// Lower edge of the decision-severity band that triggers verification.
    /// The upper edge is the severity threshold.
    pub verification_band_min: f64,
    /// Ceiling for one fact-check call.
    pub verifier_timeout_ms: u64,
    /// Ceiling for one LLM completion.
    pub llm_timeout_ms: u64,
    /// Texts longer than this are skipped by every detector.
    pub max_text_chars: usize,
    /// Governed in place of the model output when the LLM call fails.
    pub llm_fallback_text: String,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            min_confidence_to_block: 0.5,
            verification_band_min: 4.0,
            verifier_timeout_ms: 3_000,
            llm_timeout_ms: 15_000,
            max_text_chars: 20_000,
            llm_fallback_text: "I'm unable to generate a response right now. Please try again later."
                .to_string(),
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_key: String,
    pub model: String,
    /// OpenRouter-compatible chat completions endpoint.
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            model: "openai/gpt-4o-mini".to_string(),
            base_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
        }
    }
}

/// Fact-check collaborator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FactCheckConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (GOVERNANCE__*)
    /// 2. config/local.yaml (if exists)
    /// 3. config/default.yaml (if exists)
    /// 4. Compiled-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("GOVERNANCE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config
            .agents
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}
