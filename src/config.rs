//! Settings and credential resolution.
//!
//! Settings come from an optional TOML file (`AGENTS_CONFIG`, else
//! `./agents.toml`) with a few environment overrides on top. The credential is
//! only read from the environment (or the file) when [`Settings::resolve_model`]
//! is called.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_SETTINGS_FILE: &str = "agents.toml";

/// Endpoint, credential and model id used by every agent of a process.
#[derive(Clone, PartialEq)]
pub struct ModelHandle {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelHandle {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub run: RunSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Environment variable holding the credential.
    pub api_key_env: String,
    /// Fallback credential when the variable is unset.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// What the runner does when a tool call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolErrorPolicy {
    /// Send the error text back to the model and keep going.
    #[default]
    Report,
    /// End the turn with `AgentError::Tool`.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub max_turns: u32,
    pub tool_errors: ToolErrorPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_turns: 10,
            tool_errors: ToolErrorPolicy::Report,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level for this crate's logs (trace, debug, info, warn, error).
    pub level: String,
    /// Debug logs on stdout, interleaved with program output.
    pub verbose: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            verbose: false,
        }
    }
}

impl Settings {
    /// Loads settings from the default location and applies env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("AGENTS_CONFIG")
            .map(PathBuf::from)
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
                default.exists().then_some(default)
            });

        let mut settings = match path {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// `GEMINI_MODEL`, `GEMINI_BASE_URL` and `AGENTS_VERBOSE` win over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("GEMINI_MODEL").filter(|value| !value.trim().is_empty()) {
            self.model.model = model;
        }
        if let Some(base_url) = lookup("GEMINI_BASE_URL").filter(|value| !value.trim().is_empty())
        {
            self.model.base_url = base_url;
        }
        if let Some(verbose) = lookup("AGENTS_VERBOSE") {
            self.logging.verbose = matches!(
                verbose.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    pub fn resolve_model(&self) -> Result<ModelHandle, ConfigError> {
        self.resolve_model_with(|name| std::env::var(name).ok())
    }

    /// Builds the model handle, reading the credential through `lookup`.
    pub fn resolve_model_with<F>(&self, lookup: F) -> Result<ModelHandle, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&self.model.api_key_env)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.model.api_key.clone())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                var: self.model.api_key_env.clone(),
            })?;

        Ok(ModelHandle {
            base_url: self.model.base_url.clone(),
            api_key,
            model: self.model.model.clone(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model.model must not be empty".to_string()));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "model.base_url must not be empty".to_string(),
            ));
        }
        if self.run.max_turns == 0 {
            return Err(ConfigError::Invalid(
                "run.max_turns must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
