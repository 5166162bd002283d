use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::directory::DEFAULT_HOST;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub host: Option<String>,
    pub default_model: Option<String>,
    /// Caller-side bound on a single inference call. `None` waits indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: Some(DEFAULT_HOST.to_string()),
            default_model: None,
            request_timeout_secs: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_default_model_to(config_path: &Path, model: &str) -> Result<()> {
        let mut config = Self::load_from(config_path).unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save_to(config_path)
    }

    /// Only the file is updated; environment overrides are never written back.
    pub fn save_host_to(config_path: &Path, host: &str) -> Result<()> {
        let mut config = Self::load_from(config_path).unwrap_or_else(|_| Self::new());
        config.host = Some(host.to_string());
        config.save_to(config_path)
    }

    /// `OLLAMA_HOST` and `TALKAMA_MODEL` take precedence over the file.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(
            std::env::var("OLLAMA_HOST").ok(),
            std::env::var("TALKAMA_MODEL").ok(),
        );
        self
    }

    fn apply_overrides(&mut self, host: Option<String>, model: Option<String>) {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.host = Some(host);
        }
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.default_model = Some(model);
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("talkama"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
