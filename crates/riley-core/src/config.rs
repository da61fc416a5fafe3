use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ai::DEFAULT_API_BASE;
use crate::error::ChatError;

pub const DEFAULT_MODEL: &str = "ft:gpt-3.5-turbo-1106:personal:capstone-exp-3:9vgnLOrh";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_INDEX_DIR: &str = "main/data/index.vecstore";

pub const DEFAULT_SYSTEM_PROMPT: &str = "Craft a series of questions that customers might ask \
about what fruits and vegetables to add to their diet to achieve the optimal nutrition. The \
optimal nutrition includes at least 1 item from the Red column, Yellow & Orange column, White, \
Tan & Brown column, Green column and Blue & Purple column of the same row of the data file. \
Check if the user input has at least one item from each of these columns and then provide the \
full row of values that are closest to the user input which must include the full recipe in the \
corresponding Recipes column.";

#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub context_window: usize,
    pub similarity_top_k: usize,
    pub embedding_model: String,
    pub index_dir: PathBuf,
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub system_prompt: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            context_window: 2048,
            similarity_top_k: 2,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 60,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("context_window", &self.context_window)
            .field("similarity_top_k", &self.similarity_top_k)
            .field("embedding_model", &self.embedding_model)
            .field("index_dir", &self.index_dir)
            .field("api_base", &self.api_base)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load `~/.config/riley/config.json` (defaults when absent), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Apply `OPENAI_API_KEY`, `RILEY_INDEX_DIR` and `RILEY_MODEL`.
    /// The environment wins over the file.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = set("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(dir) = set("RILEY_INDEX_DIR") {
            self.index_dir = PathBuf::from(dir);
        }
        if let Some(model) = set("RILEY_MODEL") {
            self.model = model;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.context_window == 0 {
            return Err(ChatError::Config("context_window must be positive".to_string()));
        }
        if self.similarity_top_k == 0 {
            return Err(ChatError::Config("similarity_top_k must be positive".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model must not be empty".to_string()));
        }
        Ok(())
    }

    /// The hosted-model API key. Missing or blank is fatal for the session.
    pub fn api_key(&self) -> Result<&str, ChatError> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ChatError::MissingApiKey)
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("riley"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    pub fn log_dir() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("logs"))
    }
}
