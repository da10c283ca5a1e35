use colloquy::{EngineConfig, PricingEntry, PricingTable, ProviderConfig};
use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pricing: Vec<PricingEntry>,

    // Secrets (from ENV only)
    #[serde(default)]
    pub openai_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint; the public OpenAI API when unset
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub max_messages: usize,
    pub max_messages_with_attachments: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub stop_marker: Option<String>,
    pub autosave_secs: u64,
    #[serde(default)]
    pub reasoning_budget_floor: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn section(prefix: &str) -> Environment {
    // LLM__MAX_TOKENS -> llm.max_tokens
    Environment::with_prefix(prefix)
        .prefix_separator("__")
        .separator("__")
        .keep_prefix(true)
        .try_parsing(true)
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables (LLM__, SESSION__, STORAGE__ prefixes, plus
    ///    LOG_LEVEL and LOG_FORMAT)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(section("LLM"))
            .add_source(section("SESSION"))
            .add_source(section("STORAGE"))
            .set_override_option("logging.level", std::env::var("LOG_LEVEL").ok())?
            .set_override_option("logging.format", std::env::var("LOG_FORMAT").ok())?;

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        // Secrets come from ENV only, never from TOML
        cfg.openai_api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ConfigError::Message("OPENAI_API_KEY environment variable is required".to_string())
        })?;

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::default()
            .with_default_model(&self.llm.model)
            .with_max_tokens(self.llm.max_tokens)
            .with_context_limits(
                self.session.max_messages,
                self.session.max_messages_with_attachments,
            )
            .with_autosave_interval(Duration::from_secs(self.session.autosave_secs));

        if let Some(temp) = self.llm.temperature {
            engine = engine.with_temperature(temp);
        }
        if let Some(prompt) = &self.session.system_prompt {
            engine = engine.with_system_prompt(prompt);
        }
        if let Some(marker) = &self.session.stop_marker {
            engine = engine.with_stop_marker(marker);
        }
        if let Some(floor) = self.session.reasoning_budget_floor {
            engine = engine.with_reasoning_budget_floor(floor);
        }
        engine
    }

    pub fn pricing_table(&self) -> PricingTable {
        PricingTable::from_entries(self.pricing.clone())
    }

    pub fn provider(&self) -> ProviderConfig {
        match &self.llm.base_url {
            Some(base_url) => ProviderConfig::openai_compatible(&self.openai_api_key, base_url),
            None => ProviderConfig::openai(&self.openai_api_key),
        }
    }
}
