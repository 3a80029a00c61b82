use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::completion::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};

/// Environment variable consulted when no API key has been stored
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Where sessions, the API key and the log file live
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("wayfare"))
                .ok_or_else(|| anyhow!("Could not determine data directory")),
        }
    }

    /// API key supplied through the environment, if any
    pub fn env_api_key() -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("wayfare").join("config.json"))
    }
}
