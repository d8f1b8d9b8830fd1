use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// How user turns are screened for fallacies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallacyMode {
    /// Ask the model; without a backend nothing is reported.
    #[default]
    Delegated,
    Patterns,
    Off,
}

impl fmt::Display for FallacyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FallacyMode::Delegated => "delegated",
            FallacyMode::Patterns => "patterns",
            FallacyMode::Off => "off",
        })
    }
}

impl FromStr for FallacyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delegated" => Ok(FallacyMode::Delegated),
            "patterns" => Ok(FallacyMode::Patterns),
            "off" => Ok(FallacyMode::Off),
            other => Err(format!("fallacy mode must be delegated, patterns or off, got '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub openrouter_api_key: String,
    /// Model the opponent speaks with.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model for scoring and fallacy detection; empty means `model`.
    #[serde(default)]
    pub analysis_model: String,
    #[serde(default)]
    pub fallacy_mode: FallacyMode,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key: String::new(),
            model: default_model(),
            analysis_model: String::new(),
            fallacy_mode: FallacyMode::default(),
            request_timeout_secs: default_timeout_secs(),
            base_url: None,
        }
    }
}

impl AppConfig {
    pub fn has_api_key(&self) -> bool {
        !self.openrouter_api_key.trim().is_empty()
    }

    pub fn analysis_model(&self) -> &str {
        if self.analysis_model.is_empty() {
            &self.model
        } else {
            &self.analysis_model
        }
    }

    /// `sk-o...x9Yz` style preview; short keys are fully masked.
    pub fn api_key_preview(&self) -> String {
        let key = &self.openrouter_api_key;
        let chars: Vec<char> = key.chars().collect();
        if chars.len() > 8 {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        } else if !key.is_empty() {
            "****".to_string()
        } else {
            String::new()
        }
    }
}

pub fn get_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.json")
}

/// Read the config file; a missing or unreadable file yields defaults. The
/// environment supplies the API key when the file has none.
pub fn load_config(data_dir: &Path) -> AppConfig {
    let mut config = load_config_file(data_dir);
    if !config.has_api_key() {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.openrouter_api_key = key.trim().to_string();
        }
    }
    config
}

fn load_config_file(data_dir: &Path) -> AppConfig {
    let path = get_config_path(data_dir);
    match fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "config file is corrupt, using defaults");
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

pub fn save_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    if config.request_timeout_secs == 0 {
        return Err(AppError::Config("request_timeout_secs must be at least 1".to_string()));
    }
    let path = get_config_path(data_dir);
    fs::create_dir_all(data_dir)?;
    let content = serde_json::to_string_pretty(config)?;
    fs::write(&path, content)?;
    Ok(())
}
