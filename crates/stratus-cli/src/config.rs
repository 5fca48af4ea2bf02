//! CLI configuration.
//!
//! Loaded from `~/.config/stratus/config.toml` unless `--config` points
//! elsewhere. Every key is optional.
//!
//! ```toml
//! [model]
//! provider = "groq"
//! model = "llama3-70b-8192"
//! base_url = "https://api.groq.com/openai/v1"
//! api_key_env = "GROQ_API_KEY"
//! temperature = 0.7
//! max_tokens = 2000
//! timeout_seconds = 30
//!
//! [agent]
//! max_rounds = 10
//! model_timeout_seconds = 30
//! tool_timeout_seconds = 10
//! system_prompt = "You are a helpful assistant that provides helpful answers to user queries."
//! memory = "buffered"
//!
//! [weather]
//! base_url = "https://api.open-meteo.com"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use stratus::{DEFAULT_SYSTEM_PROMPT, MemoryMode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub model: ModelSettings,
    pub agent: AgentSettings,
    pub weather: WeatherSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSettings {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key; `GROQ_API_KEY`, `GROQ_API`
    /// and `OPENAI_API_KEY` are tried when unset.
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: "llama3-70b-8192".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: None,
            temperature: 0.7,
            max_tokens: 2000,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    pub max_rounds: u32,
    pub model_timeout_seconds: u64,
    pub tool_timeout_seconds: u64,
    pub system_prompt: String,
    pub memory: MemoryMode,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            model_timeout_seconds: 30,
            tool_timeout_seconds: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            memory: MemoryMode::Buffered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeatherSettings {
    pub base_url: String,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            base_url: stratus::weather::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl CliConfig {
    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::config_path() {
                Some(p) => p,
                None => {
                    log::debug!("No config directory on this platform, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// `~/.config/stratus/config.toml` on Linux, the platform equivalent
    /// elsewhere.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("stratus").join("config.toml"))
    }

    /// # Errors
    ///
    /// Returns an error describing the first out-of-range value.
    pub fn validate(&self) -> Result<()> {
        if self.model.model.trim().is_empty() {
            bail!("model.model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            bail!(
                "model.temperature must be between 0.0 and 2.0, got {}",
                self.model.temperature
            );
        }
        if self.model.max_tokens == 0 {
            bail!("model.max_tokens must be at least 1");
        }
        if self.agent.max_rounds == 0 {
            bail!("agent.max_rounds must be at least 1");
        }
        if self.agent.model_timeout_seconds == 0 || self.agent.tool_timeout_seconds == 0 {
            bail!("agent timeouts must be at least 1 second");
        }
        url::Url::parse(&self.model.base_url)
            .with_context(|| format!("model.base_url is not a URL: {}", self.model.base_url))?;
        url::Url::parse(&self.weather.base_url)
            .with_context(|| format!("weather.base_url is not a URL: {}", self.weather.base_url))?;
        Ok(())
    }

    /// Environment variables searched for the API key, in order.
    pub fn api_key_vars(&self) -> Vec<&str> {
        self.model.api_key_env.as_deref().map_or_else(
            || vec!["GROQ_API_KEY", "GROQ_API", "OPENAI_API_KEY"],
            |var| vec![var],
        )
    }
}
