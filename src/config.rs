use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::extract::ExtractorKind;
use crate::fetch::StrategyKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Directory holding the built frontend; nothing is served when unset
    #[serde(default)]
    pub frontend_path: Option<String>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_fetch_strategies")]
    pub fetch_strategies: Vec<StrategyKind>,

    #[serde(default = "default_extractor")]
    pub extractor: ExtractorKind,

    #[serde(default = "default_extract_workers")]
    pub extract_workers: usize,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("readlater");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("readlater.db").to_string_lossy().to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_fetch_strategies() -> Vec<StrategyKind> {
    vec![StrategyKind::Spoof, StrategyKind::Plain, StrategyKind::Curl]
}

fn default_extractor() -> ExtractorKind {
    ExtractorKind::Pandoc
}

fn default_extract_workers() -> usize {
    4
}

fn default_llm_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_llm_max_tokens() -> u32 {
    8192
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            frontend_path: None,
            fetch_timeout_secs: default_fetch_timeout(),
            fetch_strategies: default_fetch_strategies(),
            extractor: default_extractor(),
            extract_workers: default_extract_workers(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("readlater")
            .join("config.toml")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.fetch_strategies.is_empty() {
            return Err(AppError::Config("fetch_strategies must not be empty".to_string()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(AppError::Config("fetch_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}
