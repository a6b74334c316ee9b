//! Configuration loading and management for recap.
//!
//! Loads settings from `recap.toml` with environment variable overrides for sensitive data.
//! Every field has a default, so a missing config file is not an error.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "recap.toml";
const SUMMARIES_FILE_NAME: &str = "summaries.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Backend used to produce summaries.
///
/// Unknown names resolve to [`Provider::Mock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    #[default]
    Ollama,
    OpenAi,
    Mock,
}

impl FromStr for Provider {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Provider::Ollama,
            "openai" => Provider::OpenAi,
            _ => Provider::Mock,
        })
    }
}

impl From<&str> for Provider {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(provider) => provider,
            Err(never) => match never {},
        }
    }
}

impl From<String> for Provider {
    fn from(s: String) -> Self {
        Provider::from(s.as_str())
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.to_string()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
            Provider::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// Summarizer settings, read fresh on every summarize call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// LLM provider: "ollama", "openai" or "mock"
    pub provider: Provider,
    /// Target number of sentences in a summary
    pub max_summary_length: u32,
    /// Model name passed to Ollama (ignored by the other providers)
    pub model: String,
    /// Summarize piped input without asking (consumed by the CLI)
    pub auto_summarize: bool,
}

impl SummarizerConfig {
    /// Sentence count to request, never below one
    pub fn sentence_count(&self) -> u32 {
        self.max_summary_length.max(1)
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            max_summary_length: 3,
            model: "llama2".to_string(),
            auto_summarize: false,
        }
    }
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub openai_key: Option<String>,
}

/// Where the HTTP backends live and how long to wait for them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub ollama_url: String,
    pub openai_url: String,
    /// Upper bound for a single request, in seconds
    pub request_timeout_secs: u64,
}

impl EndpointsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            openai_url: "https://api.openai.com".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the summaries file
    pub path: PathBuf,
}

impl StorageConfig {
    /// Full path of the persisted summaries document
    pub fn summaries_file(&self) -> PathBuf {
        self.path.join(SUMMARIES_FILE_NAME)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .map(|dir| dir.join("recap"))
            .unwrap_or_else(|| PathBuf::from("./data"));
        Self { path }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default location (recap.toml in cwd or home),
    /// falling back to defaults when no file exists
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::parse(&std::fs::read_to_string(&path)?)?,
            None => {
                tracing::debug!("no {} found, using defaults", CONFIG_FILE_NAME);
                Config::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override API keys and the provider from environment variables
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.api.openai_key = Some(key);
            }
        }
        if let Ok(provider) = std::env::var("RECAP_PROVIDER") {
            self.summarizer.provider = Provider::from(provider);
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        // Check current directory first
        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Some(local_config);
        }

        // Check home directory
        let home_config = dirs::home_dir()?
            .join(".config")
            .join("recap")
            .join(CONFIG_FILE_NAME);
        home_config.exists().then_some(home_config)
    }
}

/// Where configuration comes from, kept so it can be read again later
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Explicit config file; `None` searches the standard locations
    pub path: Option<PathBuf>,
    /// Provider forced on the command line, applied after the environment
    pub provider: Option<Provider>,
}

impl ConfigSource {
    pub fn new(path: Option<PathBuf>, provider: Option<Provider>) -> Self {
        Self { path, provider }
    }

    /// Read the configuration as it currently is on disk
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut config = match self.path.as_deref() {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        if let Some(provider) = self.provider {
            config.summarizer.provider = provider;
        }
        Ok(config)
    }
}
