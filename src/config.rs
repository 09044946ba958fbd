use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::provider::Provider;

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Environment variables checked for the API key, in order.
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// On-disk settings. Every field is optional; the file itself is optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_url: Option<String>,
    pub ollama_url: Option<String>,
}

/// API credential, resolved once at startup and handed to the controller.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    Present(String),
    #[default]
    Absent,
}

impl Credential {
    pub fn from_option(key: Option<String>) -> Self {
        match key {
            Some(k) if !k.trim().is_empty() => Credential::Present(k.trim().to_string()),
            _ => Credential::Absent,
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Credential::Present(key) => Some(key),
            Credential::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Credential::Present(_))
    }
}

// Never print the key itself.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Present(_) => f.write_str("Credential::Present(***)"),
            Credential::Absent => f.write_str("Credential::Absent"),
        }
    }
}

/// Fully resolved settings used to build the solver.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    pub model: String,
    pub credential: Credential,
    pub base_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Merge file settings with the environment and command-line overrides.
    /// Environment keys win over the file; explicit flags win over both.
    pub fn resolve(
        &self,
        provider_override: Option<Provider>,
        model_override: Option<String>,
        env_key: Option<String>,
    ) -> Settings {
        let provider = provider_override
            .or_else(|| self.provider.as_deref().and_then(Provider::parse))
            .unwrap_or(Provider::Gemini);

        let model = model_override
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| provider.default_model().to_string());

        let credential = Credential::from_option(env_key.or_else(|| self.gemini_api_key.clone()));

        let base_url = match provider {
            Provider::Gemini => self.gemini_url.clone().unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            Provider::Ollama => self.ollama_url.clone().unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
        };

        Settings {
            provider,
            model,
            credential,
            base_url,
        }
    }

    pub fn env_api_key() -> Option<String> {
        API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("math-tutor").join("config.json"))
    }
}
